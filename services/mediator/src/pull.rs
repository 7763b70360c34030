//! The pull side: per-endpoint subscribers feeding camped transports.
//!
//! A [`PullListener`] is a lazy sequence of inbound [`PullRequest`]s —
//! infinite until `close()` or a transport error, not restartable after
//! close. Each request carries a bound `ack()` that publishes the matching
//! acknowledgement on the reverse channel named in the request.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};

use mediator_protocol::{Ack, BrokerAddr, PushRequest, PUSH_MSG_TYPE};

use crate::broker::{BrokerChannel, BrokerError, ReadOutcome};

/// Reverse channels kept warm between ACKs; deliberately tiny.
const REVERSE_CACHE_CAPACITY: u64 = 5;

/// Factory for listeners, owning the process-wide reverse-channel cache.
pub struct PullHub {
    reverse_channels: Cache<String, Arc<BrokerChannel>>,
}

impl PullHub {
    pub fn new(reverse_ttl: Duration) -> Self {
        Self {
            reverse_channels: Cache::builder()
                .max_capacity(REVERSE_CACHE_CAPACITY)
                .time_to_live(reverse_ttl)
                .build(),
        }
    }

    /// Bind a listener to one endpoint address. Subscription is lazy: it
    /// happens on the first `next()` call.
    pub fn listen(&self, addr: BrokerAddr) -> Result<PullListener, BrokerError> {
        Ok(PullListener {
            channel: Arc::new(BrokerChannel::open(addr)?),
            reverse_channels: self.reverse_channels.clone(),
        })
    }
}

pub struct PullListener {
    channel: Arc<BrokerChannel>,
    reverse_channels: Cache<String, Arc<BrokerChannel>>,
}

impl PullListener {
    pub fn address(&self) -> String {
        self.channel.address()
    }

    /// Block until the next push request arrives.
    ///
    /// Frames of other types (e.g. ACKs sharing the topic) are skipped.
    /// Returns `None` once the close sentinel arrives or the transport fails.
    pub async fn next(&self) -> Option<PullRequest> {
        loop {
            match self.channel.read(None).await {
                Ok(ReadOutcome::Data(body)) => {
                    if body.get("@type").and_then(Value::as_str) != Some(PUSH_MSG_TYPE) {
                        continue;
                    }
                    match serde_json::from_value::<PushRequest>(body) {
                        Ok(request) => {
                            return Some(PullRequest {
                                request,
                                reverse_channels: self.reverse_channels.clone(),
                            })
                        }
                        Err(e) => {
                            warn!(channel = %self.channel.address(), error = %e, "malformed push request skipped");
                        }
                    }
                }
                Ok(ReadOutcome::Closed) => return None,
                Err(e) => {
                    debug!(channel = %self.channel.address(), error = %e, "listener read failed");
                    return None;
                }
            }
        }
    }

    /// Publish the in-band close sentinel so concurrent readers unwind.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            debug!(channel = %self.channel.address(), error = %e, "close sentinel publish failed");
        }
    }
}

/// One inbound push request with its acknowledgement bound to the carried
/// reverse channel.
pub struct PullRequest {
    request: PushRequest,
    reverse_channels: Cache<String, Arc<BrokerChannel>>,
}

impl PullRequest {
    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn message(&self) -> &Value {
        &self.request.message
    }

    pub fn expire_at(&self) -> f64 {
        self.request.expire_at
    }

    pub fn reverse_channel(&self) -> &str {
        &self.request.reverse_channel
    }

    /// Confirm delivery to the publisher.
    ///
    /// Returns false when the ACK could not be published or nobody is
    /// subscribed to the reverse channel anymore; a failed publish also
    /// evicts the cached channel.
    pub async fn ack(&self) -> bool {
        let address = self.request.reverse_channel.clone();
        let addr = match BrokerAddr::parse(&address) {
            Ok(addr) => addr,
            Err(e) => {
                warn!(request_id = %self.request.id, error = %e, "unusable reverse channel address");
                return false;
            }
        };
        let channel = match self
            .reverse_channels
            .try_get_with(address.clone(), async move {
                BrokerChannel::open(addr).map(Arc::new)
            })
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!(request_id = %self.request.id, error = %e, "reverse channel unavailable");
                return false;
            }
        };

        let ack = match serde_json::to_value(Ack::accepted(&self.request.id)) {
            Ok(value) => value,
            Err(_) => return false,
        };
        match channel.publish(&ack).await {
            Ok(delivered) => delivered > 0,
            Err(e) => {
                warn!(request_id = %self.request.id, error = %e, "ack publish failed");
                self.reverse_channels.invalidate(&address).await;
                false
            }
        }
    }
}
