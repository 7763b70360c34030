//! Short-TTL cache of (forward, reverse) channel pairs keyed by address.
//!
//! Holders keep their own `Arc` references, so an entry evicted or
//! invalidated mid-flight stays usable for the operation that already holds
//! it while later lookups construct a fresh pair.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sha2::{Digest, Sha256};

use mediator_protocol::BrokerAddr;

use crate::broker::{BrokerChannel, BrokerError, BrokerRegistry};

/// Forward/reverse channels for one endpoint address. In the default profile
/// both point at the same underlying channel.
#[derive(Clone)]
pub struct ChannelPair {
    pub forward: Arc<BrokerChannel>,
    pub reverse: Arc<BrokerChannel>,
}

#[derive(Clone)]
pub struct ChannelCache {
    inner: Cache<String, ChannelPair>,
    registry: Arc<BrokerRegistry>,
    shared_reverse: bool,
}

impl ChannelCache {
    pub fn new(
        registry: Arc<BrokerRegistry>,
        capacity: u64,
        ttl: Duration,
        shared_reverse: bool,
    ) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            registry,
            shared_reverse,
        }
    }

    /// Look up the pair for `addr`, constructing it atomically on a miss.
    pub async fn pair_for(&self, addr: &BrokerAddr) -> Result<ChannelPair, BrokerError> {
        self.inner
            .try_get_with(addr.to_string(), self.build_pair(addr))
            .await
            .map_err(|e: Arc<BrokerError>| (*e).clone())
    }

    /// Drop the entry for `address`; in-flight holders keep their references.
    pub async fn invalidate(&self, address: &str) {
        self.inner.invalidate(address).await;
    }

    async fn build_pair(&self, addr: &BrokerAddr) -> Result<ChannelPair, BrokerError> {
        let forward = Arc::new(BrokerChannel::open(addr.clone())?);
        let reverse = if self.shared_reverse {
            Arc::clone(&forward)
        } else {
            // Dedicated reverse topic: derived name on a freshly probed broker.
            let name = hex::encode(Sha256::digest(addr.to_string().as_bytes()));
            let server = self.registry.select(None).await?;
            let reverse_addr = BrokerAddr::new(server, name);
            Arc::new(BrokerChannel::open(reverse_addr)?)
        };
        Ok(ChannelPair { forward, reverse })
    }
}
