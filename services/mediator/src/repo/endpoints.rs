use sqlx::{PgPool, Row};
use tracing::debug;

/// A mailbox endpoint as the dispatch path sees it.
///
/// `fcm_device_id` lives on the owning agent row; the load joins it in so
/// callers get the full fallback picture in one query.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub uid: String,
    pub verkey: Option<String>,
    pub agent_id: Option<String>,
    pub pub_sub_address: Option<String>,
    pub fcm_device_id: Option<String>,
}

pub async fn load_endpoint(pool: &PgPool, uid: &str) -> Result<Option<EndpointRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT e.uid, e.verkey, e.agent_id, e.pub_sub_address, a.fcm_device_id
           FROM endpoints e
           LEFT JOIN agents a ON a.id = e.agent_id
           WHERE e.uid = $1"#,
    )
    .bind(uid)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| EndpointRecord {
        uid: r.get("uid"),
        verkey: r.get("verkey"),
        agent_id: r.get("agent_id"),
        pub_sub_address: r.get("pub_sub_address"),
        fcm_device_id: r.get("fcm_device_id"),
    }))
}

/// Partial upsert: fields passed as `None` keep whatever is already stored.
///
/// An FCM device id is persisted on the agent row (creating a bare agent if
/// needed) so it survives endpoint re-registration. It therefore requires
/// `agent_id` in the same call; without one there is no row to attach it to
/// and the value is dropped.
pub async fn ensure_endpoint_exists(
    pool: &PgPool,
    uid: &str,
    verkey: Option<&str>,
    agent_id: Option<&str>,
    pub_sub_address: Option<&str>,
    fcm_device_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO endpoints (uid, verkey, agent_id, pub_sub_address)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (uid) DO UPDATE SET
               verkey = COALESCE(EXCLUDED.verkey, endpoints.verkey),
               agent_id = COALESCE(EXCLUDED.agent_id, endpoints.agent_id),
               pub_sub_address = COALESCE(EXCLUDED.pub_sub_address, endpoints.pub_sub_address)"#,
    )
    .bind(uid)
    .bind(verkey)
    .bind(agent_id)
    .bind(pub_sub_address)
    .execute(pool)
    .await?;

    match (agent_id, fcm_device_id) {
        (Some(agent_id), Some(device_id)) => {
            sqlx::query(
                r#"INSERT INTO agents (id, fcm_device_id) VALUES ($1, $2)
                   ON CONFLICT (id) DO UPDATE SET fcm_device_id = EXCLUDED.fcm_device_id"#,
            )
            .bind(agent_id)
            .bind(device_id)
            .execute(pool)
            .await?;
        }
        (None, Some(_)) => {
            debug!(endpoint_uid = %uid, "fcm device id dropped: no agent id to attach it to");
        }
        _ => {}
    }
    Ok(())
}

/// Rewrite only the pub/sub binding; used by the broker-rotation pass.
pub async fn set_pub_sub_address(
    pool: &PgPool,
    uid: &str,
    address: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE endpoints SET pub_sub_address = $2 WHERE uid = $1")
        .bind(uid)
        .bind(address)
        .execute(pool)
        .await?;
    Ok(())
}

/// Routing keys in wrap order (outermost hop last).
pub async fn list_routing_keys(pool: &PgPool, uid: &str) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT key FROM routing_keys WHERE endpoint_uid = $1 ORDER BY ordinal, id",
    )
    .bind(uid)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("key")).collect())
}

pub async fn add_routing_key(pool: &PgPool, uid: &str, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO routing_keys (endpoint_uid, key, ordinal)
           SELECT $1, $2, COALESCE(MAX(ordinal) + 1, 0)
           FROM routing_keys WHERE endpoint_uid = $1"#,
    )
    .bind(uid)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(())
}
