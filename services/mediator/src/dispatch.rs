//! The push side of the dispatch fabric.
//!
//! `push` resolves the endpoint's channel pair, publishes a correlated
//! request on the forward channel, and waits on the reverse channel for the
//! matching ACK inside the caller's TTL. Timeouts and zero-subscriber
//! publishes come back as plain non-delivery; transport failures invalidate
//! the endpoint and channel caches and surface to the HTTP layer, which runs
//! the broker-rotation pass.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use mediator_protocol::{BrokerAddr, PushRequest, ACK_MSG_TYPE};

use crate::broker::{BrokerError, ReadOutcome};
use crate::channels::{ChannelCache, ChannelPair};
use crate::directory::EndpointDirectory;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("endpoint lookup failed: {0}")]
    Db(#[from] sqlx::Error),
}

pub struct PushDispatcher {
    directory: Arc<EndpointDirectory>,
    channels: ChannelCache,
}

impl PushDispatcher {
    pub fn new(directory: Arc<EndpointDirectory>, channels: ChannelCache) -> Self {
        Self {
            directory,
            channels,
        }
    }

    /// Deliver `message` to the endpoint's camped listener.
    ///
    /// Returns `Ok(true)` when the listener acknowledged within `ttl`,
    /// `Ok(false)` on non-delivery (no listener, no ACK in time, or listener
    /// closed). Broker transport failures propagate so the caller can rotate
    /// brokers; the operation itself is attempted once.
    pub async fn push(
        &self,
        endpoint_uid: &str,
        message: &Value,
        ttl: Duration,
    ) -> Result<bool, DispatchError> {
        let expire_at = unix_now() + ttl.as_secs_f64();
        match self.dispatch(endpoint_uid, message, expire_at).await {
            Err(DispatchError::Broker(BrokerError::Timeout)) => Ok(false),
            other => other,
        }
    }

    async fn dispatch(
        &self,
        endpoint_uid: &str,
        message: &Value,
        expire_at: f64,
    ) -> Result<bool, DispatchError> {
        // Second pass bypasses the endpoint cache; it only runs when the
        // first resolution came up empty.
        for ignore_cache in [false, true] {
            let Some(address) = self.directory.resolve(endpoint_uid, ignore_cache).await? else {
                continue;
            };
            let pair = match self.channels.pair_for(&address).await {
                Ok(pair) => pair,
                Err(e) => {
                    self.drop_endpoint_state(endpoint_uid, &address).await;
                    return Err(e.into());
                }
            };
            return self
                .publish_and_await_ack(endpoint_uid, &address, &pair, message, expire_at)
                .await;
        }
        Ok(false)
    }

    async fn publish_and_await_ack(
        &self,
        endpoint_uid: &str,
        address: &BrokerAddr,
        pair: &ChannelPair,
        message: &Value,
        expire_at: f64,
    ) -> Result<bool, DispatchError> {
        let request = PushRequest::new(pair.reverse.address(), expire_at, message.clone());
        let request_value = serde_json::to_value(&request)
            .map_err(|e| BrokerError::Connection(format!("request encode: {e}")))?;

        let delivered = self
            .guard(endpoint_uid, address, pair.forward.publish(&request_value))
            .await?;
        if delivered == 0 {
            debug!(endpoint_uid = %endpoint_uid, channel = %pair.forward.address(), "no camped listener");
            return Ok(false);
        }
        debug!(
            request_id = %request.id,
            forward = %pair.forward.address(),
            reverse = %pair.reverse.address(),
            subscribers = delivered,
            "push request published"
        );

        loop {
            let remaining = expire_at - unix_now();
            if remaining <= 0.0 {
                return Ok(false);
            }
            let outcome = self
                .guard(
                    endpoint_uid,
                    address,
                    pair.reverse.read(Some(Duration::from_secs_f64(remaining))),
                )
                .await?;
            match outcome {
                ReadOutcome::Data(response) => {
                    let is_ack =
                        response.get("@type").and_then(Value::as_str) == Some(ACK_MSG_TYPE);
                    let id_matches =
                        response.get("@id").and_then(Value::as_str) == Some(request.id.as_str());
                    if is_ack && id_matches {
                        return Ok(response.get("status").and_then(Value::as_bool) == Some(true));
                    }
                    // A stale or foreign ACK must not end the wait.
                    warn!(
                        expected = %request.id,
                        received = ?response.get("@id"),
                        "ack id mismatch, keep waiting"
                    );
                }
                ReadOutcome::Closed => return Ok(false),
            }
        }
    }

    /// Run a broker operation; on a transport failure drop the endpoint's
    /// cached resolution and channel pair before propagating.
    async fn guard<T>(
        &self,
        endpoint_uid: &str,
        address: &BrokerAddr,
        op: impl std::future::Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, DispatchError> {
        match op.await {
            Ok(value) => Ok(value),
            Err(e) => {
                if matches!(e, BrokerError::Connection(_)) {
                    self.drop_endpoint_state(endpoint_uid, address).await;
                }
                Err(e.into())
            }
        }
    }

    async fn drop_endpoint_state(&self, endpoint_uid: &str, address: &BrokerAddr) {
        self.directory.invalidate(endpoint_uid).await;
        self.channels.invalidate(&address.to_string()).await;
    }
}

/// Wall-clock unix seconds with sub-second resolution.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
