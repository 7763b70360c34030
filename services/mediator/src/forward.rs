//! Forward-envelope wrapping at the crypto seam.
//!
//! When an endpoint carries routing keys, the inbound payload is re-wrapped
//! as a DIDComm forward message addressed to the endpoint's verkey before it
//! is published. The wrapping primitive is an external contract: the
//! dispatcher calls [`ForwardWrapper::wrap`] and relays the byte output
//! verbatim.

use serde_json::{json, Value};

use mediator_protocol::FORWARD_MSG_TYPE;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("payload is not JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

pub trait ForwardWrapper: Send + Sync {
    /// Wrap `payload` for delivery to `to_verkey` through `routing_keys`.
    ///
    /// Must be the identity when `routing_keys` is empty.
    fn wrap(
        &self,
        payload: &[u8],
        to_verkey: &str,
        routing_keys: &[String],
    ) -> Result<Vec<u8>, ForwardError>;
}

/// Plaintext forward envelopes.
///
/// Builds the canonical `{"@type": forward, "to": ..., "msg": ...}` message
/// for each hop without the anoncrypt layer; deployments with real key
/// material swap in an encrypting implementation behind the same trait.
pub struct JsonForwardWrapper;

impl ForwardWrapper for JsonForwardWrapper {
    fn wrap(
        &self,
        payload: &[u8],
        to_verkey: &str,
        routing_keys: &[String],
    ) -> Result<Vec<u8>, ForwardError> {
        if routing_keys.is_empty() {
            return Ok(payload.to_vec());
        }
        let msg: Value = serde_json::from_slice(payload)?;
        // Innermost hop targets the recipient verkey; each further routing
        // key wraps the previous envelope for the hop before it.
        let mut envelope = forward_msg(to_verkey, msg);
        for hop in &routing_keys[..routing_keys.len() - 1] {
            envelope = forward_msg(hop, envelope);
        }
        Ok(serde_json::to_vec(&envelope)?)
    }
}

fn forward_msg(to: &str, msg: Value) -> Value {
    json!({
        "@type": FORWARD_MSG_TYPE,
        "to": to,
        "msg": msg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_routing_keys_is_identity() {
        let payload = br#"{"protected": "abc"}"#;
        let wrapped = JsonForwardWrapper
            .wrap(payload, "VERKEY", &[])
            .unwrap();
        assert_eq!(wrapped, payload);
    }

    #[test]
    fn single_routing_key_targets_recipient_verkey() {
        let payload = br#"{"key1": "value", "key2": 123}"#;
        let wrapped = JsonForwardWrapper
            .wrap(payload, "VERKEY", &["ROUTE-1".to_owned()])
            .unwrap();
        let envelope: Value = serde_json::from_slice(&wrapped).unwrap();
        assert_eq!(envelope["@type"], FORWARD_MSG_TYPE);
        assert_eq!(envelope["to"], "VERKEY");
        assert_eq!(
            envelope["msg"],
            serde_json::from_slice::<Value>(payload).unwrap()
        );
    }

    #[test]
    fn multiple_routing_keys_nest_outward() {
        let payload = br#"{"k": 1}"#;
        let keys = vec!["ROUTE-1".to_owned(), "ROUTE-2".to_owned()];
        let wrapped = JsonForwardWrapper.wrap(payload, "VERKEY", &keys).unwrap();
        let outer: Value = serde_json::from_slice(&wrapped).unwrap();
        // Outermost envelope is for the first hop key.
        assert_eq!(outer["to"], "ROUTE-1");
        let inner = &outer["msg"];
        assert_eq!(inner["@type"], FORWARD_MSG_TYPE);
        assert_eq!(inner["to"], "VERKEY");
        assert_eq!(inner["msg"], serde_json::from_slice::<Value>(payload).unwrap());
    }

    #[test]
    fn non_json_payload_with_routing_keys_is_rejected() {
        let err = JsonForwardWrapper
            .wrap(b"\xff\xfe", "VERKEY", &["ROUTE-1".to_owned()])
            .unwrap_err();
        assert!(matches!(err, ForwardError::Payload(_)));
    }
}
