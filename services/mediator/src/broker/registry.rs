//! Pool of configured brokers with liveness-gated random selection.

use rand::seq::SliceRandom;
use tracing::debug;

use mediator_protocol::BROKER_SCHEME;

use super::{BrokerChannel, BrokerError};

pub struct BrokerRegistry {
    servers: Vec<String>,
}

impl BrokerRegistry {
    /// `servers` are bare hostnames (optionally `host:port`), no scheme.
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }

    /// Pick a live broker at random, biased away from `unwanted`: the
    /// unwanted broker moves to the tail and is only returned when it is the
    /// sole survivor. Every candidate is probed; the first one that answers
    /// wins.
    pub async fn select(&self, unwanted: Option<&str>) -> Result<String, BrokerError> {
        let mut candidates = self.servers.clone();
        candidates.shuffle(&mut rand::thread_rng());
        let candidates = order_candidates(candidates, unwanted);

        for host in &candidates {
            let url = format!("{BROKER_SCHEME}{host}");
            if BrokerChannel::probe(&url).await {
                return Ok(url);
            }
            debug!(broker = %host, "broker probe failed");
        }
        Err(BrokerError::NoneReachable(self.servers.join(",")))
    }
}

/// Shift the unwanted host (scheme stripped) to the tail of the shuffled list.
fn order_candidates(shuffled: Vec<String>, unwanted: Option<&str>) -> Vec<String> {
    let Some(unwanted) = unwanted else {
        return shuffled;
    };
    let unwanted = unwanted.strip_prefix(BROKER_SCHEME).unwrap_or(unwanted);
    if !shuffled.iter().any(|host| host.as_str() == unwanted) {
        return shuffled;
    }
    let (tail, mut head): (Vec<String>, Vec<String>) = shuffled
        .into_iter()
        .partition(|host| host.as_str() == unwanted);
    head.extend(tail);
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn unwanted_host_moves_to_tail() {
        let ordered = order_candidates(hosts(&["redis1", "redis2", "redis3"]), Some("redis1"));
        assert_eq!(ordered, hosts(&["redis2", "redis3", "redis1"]));
    }

    #[test]
    fn unwanted_accepts_full_address_form() {
        let ordered = order_candidates(hosts(&["redis2", "redis1"]), Some("redis://redis2"));
        assert_eq!(ordered, hosts(&["redis1", "redis2"]));
    }

    #[test]
    fn unknown_unwanted_leaves_order_unchanged() {
        let ordered = order_candidates(hosts(&["redis1", "redis2"]), Some("elsewhere"));
        assert_eq!(ordered, hosts(&["redis1", "redis2"]));
    }

    #[test]
    fn sole_survivor_is_still_offered() {
        let ordered = order_candidates(hosts(&["redis1"]), Some("redis1"));
        assert_eq!(ordered, hosts(&["redis1"]));
    }

    #[tokio::test]
    async fn select_fails_when_no_broker_is_configured() {
        let registry = BrokerRegistry::new(vec![]);
        let err = registry.select(None).await.unwrap_err();
        assert!(matches!(err, BrokerError::NoneReachable(_)));
    }
}
