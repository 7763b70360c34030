pub mod broker;
pub mod channels;
pub mod db;
pub mod directory;
pub mod dispatch;
pub mod fcm;
pub mod forward;
pub mod http;
pub mod pull;
pub mod repo;
pub mod settings;
pub mod state;
pub mod ws;

pub use settings::Settings;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let settings = &state.settings;
    Router::new()
        .route(
            &format!("/{}/:endpoint_uid", settings.endpoints_prefix),
            post(http::inbound::endpoint_post),
        )
        .route(
            &format!("/{}", settings.long_polling_prefix),
            get(http::sse::long_polling),
        )
        .route(&format!("/{}", settings.ws_prefix), get(ws::ws_camp_handler))
        .route(
            &format!("/{}/events", settings.ws_prefix),
            get(ws::ws_events_handler),
        )
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
