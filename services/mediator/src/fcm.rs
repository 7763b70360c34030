//! Mobile-push fallback sink.
//!
//! Device ids with the broker scheme are treated as a pub/sub address and the
//! message is published there (the mock path used by tests and local rigs);
//! anything else is sent as a high-priority FCM data message through one
//! pooled HTTP client shared by the whole process.

use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use mediator_protocol::{BrokerAddr, BROKER_SCHEME};

use crate::broker::{BrokerChannel, BrokerError};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";
const MAX_IDLE_CONNECTIONS: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum FcmError {
    #[error("firebase api key is not configured")]
    Disabled,
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("fcm request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct FcmBridge {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl FcmBridge {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()
            .expect("failed to build FCM HTTP client");
        Self { api_key, http }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Deliver `message` to the device. Returns whether the provider (or the
    /// mock channel's subscriber count) reported success.
    pub async fn send(&self, device_id: &str, message: &Value) -> Result<bool, FcmError> {
        if device_id.starts_with(BROKER_SCHEME) {
            let addr = BrokerAddr::parse(device_id)
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
            let channel = BrokerChannel::open(addr)?;
            let delivered = channel.publish(message).await?;
            return Ok(delivered > 0);
        }

        let api_key = self.api_key.as_deref().ok_or(FcmError::Disabled)?;
        let body = json!({
            "to": device_id,
            "data": message,
            "priority": "high",
            "message_id": Uuid::new_v4().simple().to_string(),
        });
        let response = self
            .http
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={api_key}"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "fcm send rejected");
            return Ok(false);
        }
        let result: Value = response.json().await?;
        Ok(result.get("success").and_then(Value::as_i64).unwrap_or(0) > 0)
    }
}
