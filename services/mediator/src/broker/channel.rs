//! A scoped pub/sub channel on one broker.
//!
//! Wraps one named topic with lazy connection setup, framed publish with a
//! delivered-subscriber count, deadline-bounded reads, and an in-band close
//! sentinel. Any transport error tears the channel down before it propagates,
//! so a later call starts from a clean DISCONNECTED state.

use std::time::Duration;

use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mediator_protocol::{BrokerAddr, ChannelFrame, FRAME_KIND_CLOSE, FRAME_KIND_DATA};

use super::BrokerError;

/// Connection establishment and liveness-probe time limit.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of a successful [`BrokerChannel::read`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// A data frame arrived; carries the frame body.
    Data(Value),
    /// The peer published the close sentinel; the channel has been torn down.
    Closed,
}

/// One named topic on one broker.
///
/// Publishing and subscribing use separate connections (the subscriber
/// connection is dedicated to the pub/sub protocol), so an ACK can be
/// published on a channel while another task is parked in `read`.
pub struct BrokerChannel {
    addr: BrokerAddr,
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    sub: Mutex<Option<redis::aio::PubSub>>,
}

enum ReadLoop {
    Data(Value),
    Closed,
    Failed(String),
}

impl BrokerChannel {
    /// Prepare a channel for `addr`. No I/O happens until first use.
    pub fn open(addr: BrokerAddr) -> Result<Self, BrokerError> {
        let client = redis::Client::open(addr.server.as_str())
            .map_err(|e| BrokerError::Connection(format!("{}: {e}", addr.server)))?;
        Ok(Self {
            addr,
            client,
            conn: Mutex::new(None),
            sub: Mutex::new(None),
        })
    }

    /// Full `scheme://host/name` address of this channel.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn addr(&self) -> &BrokerAddr {
        &self.addr
    }

    /// Publish a data frame; returns the number of subscribers the broker
    /// delivered it to (0 means nobody is camped on the topic).
    pub async fn publish(&self, body: &Value) -> Result<u64, BrokerError> {
        self.publish_frame(&ChannelFrame::data(body.clone())).await
    }

    /// Publish the cooperative EOF sentinel so concurrent readers unwind.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.publish_frame(&ChannelFrame::close()).await.map(|_| ())
    }

    /// Wait for the next inbound frame, subscribing lazily.
    ///
    /// `deadline` of `None` waits indefinitely. Errors with
    /// [`BrokerError::Timeout`] when the deadline elapses (subscription kept),
    /// or [`BrokerError::Connection`] after self-terminating on a transport
    /// failure.
    pub async fn read(&self, deadline: Option<Duration>) -> Result<ReadOutcome, BrokerError> {
        let mut guard = self.sub.lock().await;
        if guard.is_none() {
            match self.subscribe().await {
                Ok(pubsub) => *guard = Some(pubsub),
                Err(e) => {
                    drop(guard);
                    self.terminate();
                    return Err(e);
                }
            }
        }

        let result = {
            let Some(pubsub) = guard.as_mut() else {
                return Err(BrokerError::Connection("subscription lost".to_owned()));
            };
            let mut stream = std::pin::pin!(pubsub.on_message());
            loop {
                let item = match deadline {
                    Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                        Ok(item) => item,
                        // Deadline is not a transport failure: keep the
                        // subscription for the next read.
                        Err(_) => return Err(BrokerError::Timeout),
                    },
                    None => stream.next().await,
                };
                let Some(msg) = item else {
                    break ReadLoop::Failed("subscription stream ended".to_owned());
                };
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => break ReadLoop::Failed(e.to_string()),
                };
                match serde_json::from_str::<ChannelFrame>(&payload) {
                    Ok(frame) if frame.kind == FRAME_KIND_DATA => break ReadLoop::Data(frame.body),
                    Ok(frame) if frame.kind == FRAME_KIND_CLOSE => break ReadLoop::Closed,
                    Ok(frame) => {
                        debug!(channel = %self.addr.channel, kind = %frame.kind, "ignoring unknown frame kind");
                    }
                    Err(e) => {
                        warn!(channel = %self.addr.channel, error = %e, "skipping undecodable frame");
                    }
                }
            }
        };

        match result {
            ReadLoop::Data(body) => Ok(ReadOutcome::Data(body)),
            ReadLoop::Closed => {
                *guard = None;
                drop(guard);
                self.terminate();
                Ok(ReadOutcome::Closed)
            }
            ReadLoop::Failed(reason) => {
                *guard = None;
                drop(guard);
                self.terminate();
                Err(BrokerError::Connection(format!("{}: {reason}", self.addr)))
            }
        }
    }

    /// Liveness probe: connect and round-trip a PING within [`CONNECT_TIMEOUT`].
    pub async fn probe(server: &str) -> bool {
        let attempt = async {
            let client = redis::Client::open(server).ok()?;
            let mut conn = client.get_multiplexed_async_connection().await.ok()?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await.ok()?;
            Some(pong)
        };
        match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
            Ok(Some(pong)) => pong.eq_ignore_ascii_case("pong"),
            _ => false,
        }
    }

    async fn publish_frame(&self, frame: &ChannelFrame) -> Result<u64, BrokerError> {
        let payload = serde_json::to_string(frame)
            .map_err(|e| BrokerError::Connection(format!("frame encode: {e}")))?;

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            match self.connect().await {
                Ok(conn) => *guard = Some(conn),
                Err(e) => {
                    drop(guard);
                    self.terminate();
                    return Err(e);
                }
            }
        }
        let Some(conn) = guard.as_mut() else {
            return Err(BrokerError::Connection("connection lost".to_owned()));
        };
        let delivered: Result<i64, redis::RedisError> = redis::cmd("PUBLISH")
            .arg(&self.addr.channel)
            .arg(&payload)
            .query_async(conn)
            .await;
        match delivered {
            Ok(count) => Ok(u64::try_from(count).unwrap_or(0)),
            Err(e) => {
                *guard = None;
                drop(guard);
                self.terminate();
                Err(BrokerError::Connection(format!(
                    "publish to {}: {e}",
                    self.addr
                )))
            }
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, BrokerError> {
        match tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_multiplexed_async_connection())
            .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(BrokerError::Connection(format!("{}: {e}", self.addr.server))),
            Err(_) => Err(BrokerError::Connection(format!(
                "{}: connect timed out",
                self.addr.server
            ))),
        }
    }

    async fn subscribe(&self) -> Result<redis::aio::PubSub, BrokerError> {
        let mut pubsub =
            match tokio::time::timeout(CONNECT_TIMEOUT, self.client.get_async_pubsub()).await {
                Ok(Ok(pubsub)) => pubsub,
                Ok(Err(e)) => {
                    return Err(BrokerError::Connection(format!("{}: {e}", self.addr.server)))
                }
                Err(_) => {
                    return Err(BrokerError::Connection(format!(
                        "{}: connect timed out",
                        self.addr.server
                    )))
                }
            };
        if let Err(e) = pubsub.subscribe(&self.addr.channel).await {
            return Err(BrokerError::Connection(format!(
                "subscribe to {}: {e}",
                self.addr
            )));
        }
        Ok(pubsub)
    }

    /// Best-effort release of both connections so the next use starts from
    /// DISCONNECTED. Sides currently held by another task are skipped: a
    /// parked reader surfaces the failure through its own read, a publisher
    /// mid-connect already holds a fresh connection attempt.
    fn terminate(&self) {
        if let Ok(mut conn) = self.conn.try_lock() {
            *conn = None;
        }
        if let Ok(mut sub) = self.sub.try_lock() {
            *sub = None;
        }
    }
}
