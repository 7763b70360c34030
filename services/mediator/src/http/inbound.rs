//! Inbound envelope POST: the entry point of every relayed message.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{error, info, warn};

use mediator_protocol::{BrokerAddr, ACCEPTED_CONTENT_TYPES};

use crate::broker::BrokerError;
use crate::dispatch::DispatchError;
use crate::http::response::{
    bad_request, gone, internal_error, misdirected, not_found, unsupported_media_type,
};
use crate::repo;
use crate::state::AppState;

pub async fn endpoint_post(
    State(state): State<AppState>,
    Path(endpoint_uid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_owned())
        .unwrap_or_default();
    if !ACCEPTED_CONTENT_TYPES.contains(&content_type.as_str()) {
        return unsupported_media_type(format!(
            "expected content types: {}",
            ACCEPTED_CONTENT_TYPES.join(", ")
        ));
    }

    let endpoint = match repo::endpoints::load_endpoint(&state.pool, &endpoint_uid).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => return not_found("unknown endpoint"),
        Err(e) => return internal_error(e),
    };
    let routing_keys = match state.directory.routing_keys(&endpoint_uid).await {
        Ok(keys) => keys,
        Err(e) => return internal_error(e),
    };

    // Routing keys re-wrap the payload into a forward envelope keyed to the
    // endpoint verkey before it touches the fabric.
    let payload = if routing_keys.is_empty() {
        body.to_vec()
    } else {
        let Some(verkey) = endpoint.verkey.as_deref() else {
            return internal_error("endpoint has routing keys but no verkey");
        };
        match state.wrapper.wrap(&body, verkey, &routing_keys) {
            Ok(wrapped) => wrapped,
            Err(e) => return bad_request(e.to_string()),
        }
    };
    let message: Value = match serde_json::from_slice(&payload) {
        Ok(message) => message,
        Err(e) => return bad_request(format!("body is not valid JSON: {e}")),
    };

    let delivered = match state
        .dispatcher
        .push(&endpoint_uid, &message, state.settings.push_ttl)
        .await
    {
        Ok(delivered) => delivered,
        Err(DispatchError::Broker(BrokerError::Connection(reason))) => {
            warn!(endpoint_uid = %endpoint_uid, reason = %reason, "broker transport failed, rotating");
            rotate_endpoint_broker(&state, &endpoint_uid, endpoint.pub_sub_address.as_deref())
                .await;
            false
        }
        Err(DispatchError::Broker(e)) => return internal_error(e),
        Err(DispatchError::Db(e)) => return internal_error(e),
    };
    if delivered {
        return StatusCode::ACCEPTED.into_response();
    }

    // No camped listener confirmed delivery; fall back to mobile push.
    match endpoint.fcm_device_id.as_deref() {
        Some(device_id) => {
            if !state.fcm.enabled() {
                return misdirected("firebase cloud messaging is not configured on server side");
            }
            match state.fcm.send(device_id, &message).await {
                Ok(true) => {
                    info!(endpoint_uid = %endpoint_uid, "delivered via push fallback");
                    StatusCode::ACCEPTED.into_response()
                }
                Ok(false) => gone("recipient is registered but is not active with firebase"),
                Err(e) => {
                    error!(endpoint_uid = %endpoint_uid, error = %e, "push fallback failed");
                    gone("recipient is registered but is not active with firebase")
                }
            }
        }
        None => gone("recipient is registered but is not active"),
    }
}

/// Local recovery pass after a broker transport failure: probe for another
/// broker (biased away from the failing one) and rehome the endpoint there,
/// preserving the channel-name suffix. Errors are logged and muted — the
/// request is answered as non-delivery either way and the next POST hits the
/// new binding.
async fn rotate_endpoint_broker(state: &AppState, endpoint_uid: &str, current: Option<&str>) {
    let Some(current) = current else {
        return;
    };
    let addr = match BrokerAddr::parse(current) {
        Ok(addr) => addr,
        Err(e) => {
            warn!(endpoint_uid = %endpoint_uid, error = %e, "stored address is malformed, skipping rotation");
            return;
        }
    };
    match state.registry.select(Some(&addr.server)).await {
        Ok(new_server) => {
            let new_addr = addr.with_server(&new_server);
            match state.directory.rebind(endpoint_uid, &new_addr).await {
                Ok(()) => {
                    info!(
                        endpoint_uid = %endpoint_uid,
                        from = %addr.server,
                        to = %new_server,
                        "endpoint rehomed to reachable broker"
                    );
                }
                Err(e) => {
                    error!(endpoint_uid = %endpoint_uid, error = %e, "failed to persist rehomed address");
                }
            }
        }
        Err(e) => {
            error!(endpoint_uid = %endpoint_uid, error = %e, "broker reselection failed");
        }
    }
}
