//! Mediator configuration, resolved once from the environment at startup.
//!
//! # Required
//! - `DATABASE_URL`
//!
//! # Optional (with defaults)
//! - `BIND_ADDR` (`0.0.0.0:8080`)
//! - `BROKERS` — comma-separated broker hosts (`redis1,redis2`)
//! - `FCM_API_KEY`, `FCM_SENDER_ID` — push fallback disabled when unset
//! - `ENDPOINTS_PATH_PREFIX` (`e`), `WS_PATH_PREFIX` (`ws`),
//!   `LONG_POLLING_PATH_PREFIX` (`polling`)
//! - `CHANNEL_CACHE_CAPACITY` (1000), `CHANNEL_CACHE_TTL_SECS` (60)
//! - `PUSH_TTL_SECS` (5)
//! - `DB_MAX_CONNECTIONS` (10)
//! - `SHARED_REVERSE_CHANNEL` (`true`) — reverse channel equals forward

use std::env;
use std::time::Duration;

use mediator_protocol::BROKER_SCHEME;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    /// Broker hostnames without the scheme, e.g. `redis1` or `10.0.0.5:6379`.
    pub brokers: Vec<String>,
    pub fcm_api_key: Option<String>,
    pub fcm_sender_id: Option<String>,
    pub endpoints_prefix: String,
    pub ws_prefix: String,
    pub long_polling_prefix: String,
    pub channel_cache_capacity: u64,
    pub channel_cache_ttl: Duration,
    /// How long an inbound POST waits for the camped listener's ACK.
    pub push_ttl: Duration,
    pub db_max_connections: u32,
    pub shared_reverse_channel: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            database_url,
            brokers: parse_brokers(&env::var("BROKERS").unwrap_or_else(|_| "redis1,redis2".to_owned())),
            fcm_api_key: env::var("FCM_API_KEY").ok().filter(|v| !v.is_empty()),
            fcm_sender_id: env::var("FCM_SENDER_ID").ok().filter(|v| !v.is_empty()),
            endpoints_prefix: env::var("ENDPOINTS_PATH_PREFIX").unwrap_or_else(|_| "e".to_owned()),
            ws_prefix: env::var("WS_PATH_PREFIX").unwrap_or_else(|_| "ws".to_owned()),
            long_polling_prefix: env::var("LONG_POLLING_PATH_PREFIX")
                .unwrap_or_else(|_| "polling".to_owned()),
            channel_cache_capacity: parse_or("CHANNEL_CACHE_CAPACITY", 1000),
            channel_cache_ttl: Duration::from_secs(parse_or("CHANNEL_CACHE_TTL_SECS", 60)),
            push_ttl: Duration::from_secs(parse_or("PUSH_TTL_SECS", 5)),
            db_max_connections: u32::try_from(parse_or("DB_MAX_CONNECTIONS", 10)).unwrap_or(10),
            shared_reverse_channel: env::var("SHARED_REVERSE_CHANNEL")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

fn parse_or(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Accepts bare hostnames or full `redis://host` entries; stores bare hosts.
fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.strip_prefix(BROKER_SCHEME).unwrap_or(item).to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brokers_parse_from_comma_separated_list() {
        assert_eq!(
            parse_brokers("redis1, redis2,redis3"),
            vec!["redis1", "redis2", "redis3"]
        );
    }

    #[test]
    fn brokers_parse_strips_scheme_and_empty_entries() {
        assert_eq!(
            parse_brokers("redis://redis1,,redis2,"),
            vec!["redis1", "redis2"]
        );
    }
}
