// mediator-protocol: wire envelopes and broker addressing for the mediator.
//
// The push/ack envelopes use literal `@id` / `@type` JSON keys; those field
// names are frozen — camped agents on other stacks parse them byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Message type URIs and accepted content types
// ---------------------------------------------------------------------------

/// `@type` of a dispatch request published on a forward channel.
pub const PUSH_MSG_TYPE: &str = "https://didcomm.org/indilynx/1.0/push";

/// `@type` of the acknowledgement published back on the reverse channel.
pub const ACK_MSG_TYPE: &str = "https://didcomm.org/indilynx/1.0/ack";

/// `@type` of a DIDComm forward message produced when routing keys are set.
pub const FORWARD_MSG_TYPE: &str = "https://didcomm.org/routing/1.0/forward";

/// Content types accepted on the inbound endpoint POST.
pub const ACCEPTED_CONTENT_TYPES: [&str; 4] = [
    "application/ssi-agent-wire",
    "application/json",
    "application/didcomm-envelope-enc",
    "application/didcomm-encrypted+json",
];

/// URL scheme prefix of broker pub/sub addresses.
pub const BROKER_SCHEME: &str = "redis://";

// ---------------------------------------------------------------------------
// Broker addressing
// ---------------------------------------------------------------------------

/// A scoped pub/sub address: `redis://<host>/<channel-name>`.
///
/// The channel name is the path tail after the last `/`; everything before it
/// is the broker server URL the connection is opened against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddr {
    /// Broker server URL without the channel, e.g. `redis://redis1`.
    pub server: String,
    /// Channel (topic) name, e.g. `b2f5c3e4...`.
    pub channel: String,
}

#[derive(Debug, thiserror::Error)]
#[error("malformed broker address: {0}")]
pub struct AddrParseError(pub String);

impl BrokerAddr {
    pub fn new(server: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            channel: channel.into(),
        }
    }

    /// Parse `scheme://host/name`; the name must be non-empty.
    pub fn parse(address: &str) -> Result<Self, AddrParseError> {
        let scheme_end = address
            .find("://")
            .ok_or_else(|| AddrParseError(address.to_owned()))?;
        let rest = &address[scheme_end + 3..];
        let slash = rest
            .rfind('/')
            .ok_or_else(|| AddrParseError(address.to_owned()))?;
        let channel = &rest[slash + 1..];
        if channel.is_empty() || rest[..slash].is_empty() {
            return Err(AddrParseError(address.to_owned()));
        }
        Ok(Self {
            server: address[..scheme_end + 3 + slash].to_owned(),
            channel: channel.to_owned(),
        })
    }

    /// Same channel name, rehomed onto another broker server.
    ///
    /// Used on rotation: the channel-name suffix must survive so a camped
    /// listener can find its mailbox again after failover.
    pub fn with_server(&self, server: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_owned(),
            channel: self.channel.clone(),
        }
    }
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server, self.channel)
    }
}

impl std::str::FromStr for BrokerAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// In-band broker frame
// ---------------------------------------------------------------------------

/// Frame published on a broker channel.
///
/// `kind == "data"` carries a payload; `kind == "close"` is the cooperative
/// EOF sentinel that tells subscribers to unwind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub kind: String,
    #[serde(default)]
    pub body: Value,
}

pub const FRAME_KIND_DATA: &str = "data";
pub const FRAME_KIND_CLOSE: &str = "close";

impl ChannelFrame {
    pub fn data(body: Value) -> Self {
        Self {
            kind: FRAME_KIND_DATA.to_owned(),
            body,
        }
    }

    pub fn close() -> Self {
        Self {
            kind: FRAME_KIND_CLOSE.to_owned(),
            body: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Push / ack envelopes
// ---------------------------------------------------------------------------

/// Dispatch request published on the forward channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub typ: String,
    /// Address the listener publishes the matching [`Ack`] to.
    pub reverse_channel: String,
    /// Absolute expiry, unix seconds. Readers derive remaining-time deadlines.
    pub expire_at: f64,
    pub message: Value,
}

impl PushRequest {
    /// Build a request with a fresh `@id`.
    pub fn new(reverse_channel: impl Into<String>, expire_at: f64, message: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            typ: PUSH_MSG_TYPE.to_owned(),
            reverse_channel: reverse_channel.into(),
            expire_at,
            message,
        }
    }
}

/// Acknowledgement published on the reverse channel; `@id` matches the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub typ: String,
    pub status: bool,
}

impl Ack {
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            typ: ACK_MSG_TYPE.to_owned(),
            status: true,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP error envelope
// ---------------------------------------------------------------------------

/// JSON body of every non-2xx HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_request_serializes_frozen_field_names() {
        let request = PushRequest::new("redis://redis1/rev", 1700000000.5, json!({"k": 1}));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["@id"], json!(request.id));
        assert_eq!(value["@type"], json!(PUSH_MSG_TYPE));
        assert_eq!(value["reverse_channel"], json!("redis://redis1/rev"));
        assert_eq!(value["expire_at"], json!(1700000000.5));
        assert_eq!(value["message"], json!({"k": 1}));
        // No extra or renamed keys.
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn ack_round_trips_with_matching_id() {
        let ack = Ack::accepted("abc123");
        let text = serde_json::to_string(&ack).unwrap();
        let parsed: Ack = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.id, "abc123");
        assert_eq!(parsed.typ, ACK_MSG_TYPE);
        assert!(parsed.status);
        assert!(text.contains("\"@id\""));
        assert!(text.contains("\"@type\""));
    }

    #[test]
    fn fresh_push_requests_have_unique_ids() {
        let a = PushRequest::new("redis://r/x", 0.0, Value::Null);
        let b = PushRequest::new("redis://r/x", 0.0, Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn broker_addr_parses_server_and_channel() {
        let addr = BrokerAddr::parse("redis://redis1/abcdef").unwrap();
        assert_eq!(addr.server, "redis://redis1");
        assert_eq!(addr.channel, "abcdef");
        assert_eq!(addr.to_string(), "redis://redis1/abcdef");
    }

    #[test]
    fn broker_addr_channel_is_path_tail() {
        let addr = BrokerAddr::parse("redis://host:6379/nested/tail").unwrap();
        assert_eq!(addr.server, "redis://host:6379/nested");
        assert_eq!(addr.channel, "tail");
    }

    #[test]
    fn broker_addr_rejects_missing_scheme_or_channel() {
        assert!(BrokerAddr::parse("redis1/abc").is_err());
        assert!(BrokerAddr::parse("redis://redis1").is_err());
        assert!(BrokerAddr::parse("redis://redis1/").is_err());
    }

    #[test]
    fn with_server_preserves_channel_suffix() {
        let addr = BrokerAddr::parse("redis://unreachable/mailbox1").unwrap();
        let moved = addr.with_server("redis://redis2");
        assert_eq!(moved.to_string(), "redis://redis2/mailbox1");
    }

    #[test]
    fn close_frame_has_null_body() {
        let text = serde_json::to_string(&ChannelFrame::close()).unwrap();
        assert_eq!(text, r#"{"kind":"close","body":null}"#);
    }

    #[test]
    fn data_frame_round_trips_payload() {
        let frame = ChannelFrame::data(json!({"@type": PUSH_MSG_TYPE}));
        let parsed: ChannelFrame =
            serde_json::from_str(&serde_json::to_string(&frame).unwrap()).unwrap();
        assert_eq!(parsed.kind, FRAME_KIND_DATA);
        assert_eq!(parsed.body["@type"], json!(PUSH_MSG_TYPE));
    }
}
