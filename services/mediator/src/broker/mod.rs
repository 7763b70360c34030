pub mod channel;
pub mod registry;

pub use channel::{BrokerChannel, ReadOutcome};
pub use registry::BrokerRegistry;

/// Failure kinds of the pub/sub fabric.
///
/// `Connection` is recoverable through broker rotation; `Timeout` is reported
/// to callers as plain non-delivery; `NoneReachable` is fatal for the request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("read/write deadline elapsed")]
    Timeout,
    #[error("no broker among [{0}] is reachable")]
    NoneReachable(String),
}
