//! Long-polling delivery: one SSE event per inbound push request.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::http::response::{internal_error, not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PollingParams {
    pub endpoint: Option<String>,
}

pub async fn long_polling(
    State(state): State<AppState>,
    Query(params): Query<PollingParams>,
) -> Response {
    let Some(endpoint_uid) = params.endpoint else {
        return not_found("empty endpoint id");
    };
    let address = match state.listener_address(&endpoint_uid).await {
        Ok(Some(address)) => address,
        Ok(None) => return not_found("unknown endpoint"),
        Err(e) => return internal_error(e),
    };
    let listener = match state.pull.listen(address) {
        Ok(listener) => listener,
        Err(e) => return internal_error(e),
    };
    info!(endpoint_uid = %endpoint_uid, address = %listener.address(), "long-polling listener attached");

    let stream = async_stream::stream! {
        // Move the listener into the generator; it lives as long as the
        // client keeps the stream open.
        let listener = listener;
        loop {
            match listener.next().await {
                Some(request) => {
                    let data = request.message().to_string();
                    yield Ok::<Event, Infallible>(Event::default().event("message").data(data));
                    // Emitted == delivered; confirm to the publisher.
                    if !request.ack().await {
                        warn!(request_id = %request.id(), "ack publish failed");
                    }
                }
                None => break,
            }
        }
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}
