//! Postgres access for the mediator's persisted state: the endpoints,
//! routing_keys, and agents tables that back resolution and rebinding.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Build the shared pool. Sizing comes from `Settings` so deployments with
/// many concurrent camped listeners can widen it without a rebuild.
pub async fn create_pool(database_url: &str, max_connections: u32) -> PgPool {
    info!(max_connections, "connecting to Postgres");
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .expect("failed to connect to Postgres")
}

/// Apply the endpoint/agent schema migrations embedded at build time.
pub async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("failed to run mediator schema migrations");
    info!("endpoint schema migrations applied");
}
