use std::env;

use mediator::{db, AppState, Settings};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let settings = Settings::from_env();

    let pool = db::create_pool(&settings.database_url, settings.db_max_connections).await;
    db::run_migrations(&pool).await;

    let bind_addr = settings.bind_addr.clone();
    info!(brokers = %settings.brokers.join(","), "broker pool configured");
    let state = AppState::new(pool, settings);
    let router = mediator::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "mediator listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("mediator shut down gracefully");
}

/// Resolves on SIGINT or SIGTERM so axum stops accepting, in-flight pushes
/// drain, and the channel caches drop with the process owners intact.
async fn shutdown_signal() {
    use tokio::signal;

    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!(signal = "SIGINT", "shutdown requested"),
        _ = terminate => info!(signal = "SIGTERM", "shutdown requested"),
    }
}
