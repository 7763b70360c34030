//! Authoritative endpoint-uid → pub/sub-address resolution.
//!
//! A bounded write-through cache sits in front of the endpoints table.
//! Entries live until explicitly invalidated (rebind, transport failure, or a
//! forced-refresh resolve); reads tolerate staleness.

use moka::future::Cache;
use sqlx::PgPool;
use tracing::info;

use mediator_protocol::BrokerAddr;

use crate::repo;

const CACHE_CAPACITY: u64 = 1000;

pub struct EndpointDirectory {
    pool: PgPool,
    cache: Cache<String, String>,
}

impl EndpointDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
        }
    }

    /// Resolve the endpoint's current pub/sub address.
    ///
    /// `ignore_cache` drops the cached entry first and forces a read of the
    /// persistent row; a present, non-null address refreshes the cache.
    pub async fn resolve(
        &self,
        uid: &str,
        ignore_cache: bool,
    ) -> Result<Option<BrokerAddr>, sqlx::Error> {
        if ignore_cache {
            self.cache.invalidate(uid).await;
        } else if let Some(cached) = self.cache.get(uid).await {
            return Ok(BrokerAddr::parse(&cached).ok());
        }

        let Some(endpoint) = repo::endpoints::load_endpoint(&self.pool, uid).await? else {
            return Ok(None);
        };
        let Some(address) = endpoint.pub_sub_address else {
            return Ok(None);
        };
        self.cache.insert(uid.to_owned(), address.clone()).await;
        Ok(BrokerAddr::parse(&address).ok())
    }

    /// Persist a new pub/sub binding and drop the stale cache entry.
    pub async fn rebind(&self, uid: &str, address: &BrokerAddr) -> Result<(), sqlx::Error> {
        repo::endpoints::set_pub_sub_address(&self.pool, uid, &address.to_string()).await?;
        self.cache.invalidate(uid).await;
        info!(endpoint_uid = %uid, address = %address, "endpoint rebound");
        Ok(())
    }

    /// Ordered routing keys for forward-envelope wrapping.
    pub async fn routing_keys(&self, uid: &str) -> Result<Vec<String>, sqlx::Error> {
        repo::endpoints::list_routing_keys(&self.pool, uid).await
    }

    pub async fn invalidate(&self, uid: &str) {
        self.cache.invalidate(uid).await;
    }
}
