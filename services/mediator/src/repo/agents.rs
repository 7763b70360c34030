use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub id: String,
    /// Null for bare agent rows created through endpoint registration.
    pub did: Option<String>,
    pub verkey: Option<String>,
    pub metadata: Option<Value>,
    pub fcm_device_id: Option<String>,
}

fn map_row(r: sqlx::postgres::PgRow) -> AgentRecord {
    AgentRecord {
        id: r.get("id"),
        did: r.get("did"),
        verkey: r.get("verkey"),
        metadata: r.get("metadata"),
        fcm_device_id: r.get("fcm_device_id"),
    }
}

pub async fn load_agent(pool: &PgPool, did: &str) -> Result<Option<AgentRecord>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, did, verkey, metadata, fcm_device_id FROM agents WHERE did = $1",
    )
    .bind(did)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(map_row))
}

pub async fn load_agent_via_verkey(
    pool: &PgPool,
    verkey: &str,
) -> Result<Option<AgentRecord>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, did, verkey, metadata, fcm_device_id FROM agents WHERE verkey = $1",
    )
    .bind(verkey)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(map_row))
}

/// Partial upsert keyed by DID. The verkey always follows the caller; metadata
/// and the FCM device id keep their stored values when passed as `None`.
pub async fn ensure_agent_exists(
    pool: &PgPool,
    did: &str,
    verkey: &str,
    metadata: Option<&Value>,
    fcm_device_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO agents (id, did, verkey, metadata, fcm_device_id)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (did) DO UPDATE SET
               verkey = EXCLUDED.verkey,
               metadata = COALESCE(EXCLUDED.metadata, agents.metadata),
               fcm_device_id = COALESCE(EXCLUDED.fcm_device_id, agents.fcm_device_id)"#,
    )
    .bind(Uuid::new_v4().simple().to_string())
    .bind(did)
    .bind(verkey)
    .bind(metadata)
    .bind(fcm_device_id)
    .execute(pool)
    .await?;
    Ok(())
}
