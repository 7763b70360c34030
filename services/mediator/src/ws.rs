//! WebSocket surfaces: the camped listener transport and the raw stream tap.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use mediator_protocol::{BrokerAddr, BROKER_SCHEME};

use crate::broker::{BrokerChannel, ReadOutcome};
use crate::http::response::not_found;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CampParams {
    pub endpoint: Option<String>,
}

/// Camp on an endpoint: every inbound push request for it is emitted as one
/// frame, and a sent frame is acknowledged to the publisher.
pub async fn ws_camp_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<CampParams>,
    State(state): State<AppState>,
) -> Response {
    // Onboarding over bare sockets is not served here.
    let Some(endpoint_uid) = params.endpoint else {
        return not_found("empty endpoint id");
    };
    ws.on_upgrade(move |socket| handle_camp_socket(socket, state, endpoint_uid))
        .into_response()
}

async fn handle_camp_socket(mut socket: WebSocket, state: AppState, endpoint_uid: String) {
    let address = match state.listener_address(&endpoint_uid).await {
        Ok(Some(address)) => address,
        Ok(None) => {
            warn!(endpoint_uid = %endpoint_uid, "camp refused: unknown endpoint");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            warn!(endpoint_uid = %endpoint_uid, error = %e, "camp refused: no address binding");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let listener = match state.pull.listen(address) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(endpoint_uid = %endpoint_uid, error = %e, "listener setup failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(endpoint_uid = %endpoint_uid, address = %listener.address(), "listener camped on websocket");

    loop {
        tokio::select! {
            request = listener.next() => {
                match request {
                    Some(request) => {
                        let frame = request.message().to_string();
                        if socket.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                        // Frame sent == delivered.
                        if !request.ack().await {
                            warn!(request_id = %request.id(), "ack publish failed");
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Campers only listen; inbound frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    listener.close().await;
    info!(endpoint_uid = %endpoint_uid, "camped listener detached");
}

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub stream: Option<String>,
}

/// Raw tap over a named pub/sub stream: each data frame is emitted verbatim.
pub async fn ws_events_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<EventsParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(stream) = params.stream else {
        return not_found("empty stream id");
    };
    ws.on_upgrade(move |socket| handle_events_socket(socket, state, stream))
        .into_response()
}

async fn handle_events_socket(mut socket: WebSocket, state: AppState, stream: String) {
    // Accept a full address or a bare channel name on the first broker.
    let addr = if stream.contains("://") {
        BrokerAddr::parse(&stream)
    } else {
        match state.settings.brokers.first() {
            Some(host) => Ok(BrokerAddr::new(format!("{BROKER_SCHEME}{host}"), stream.clone())),
            None => {
                warn!("no brokers configured for raw stream listener");
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    };
    let addr = match addr {
        Ok(addr) => addr,
        Err(e) => {
            warn!(stream = %stream, error = %e, "unusable stream address");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    let channel = match BrokerChannel::open(addr) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(stream = %stream, error = %e, "stream channel setup failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(address = %channel.address(), "raw stream listener attached");

    loop {
        tokio::select! {
            outcome = channel.read(None) => {
                match outcome {
                    Ok(ReadOutcome::Data(body)) => {
                        if socket.send(Message::Text(body.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Ok(ReadOutcome::Closed) | Err(_) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
