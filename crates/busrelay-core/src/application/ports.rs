//! Ports: the traits the relay needs from the outside world.
//!
//! The relay depends only on these traits.  Infrastructure implementations
//! (Redis, WebSocket) live in `busrelay-server`; the in-memory bus and the
//! mock connection in this crate implement them for tests and single-node
//! deployments.
//!
//! # Cancel safety
//!
//! The relay abandons pending calls to [`Subscription::next_message`],
//! [`FrameReader::read_frame`] and [`FrameWriter::write_frame`] when a session
//! is torn down (they are raced against a cancellation token in
//! `tokio::select!`).  Implementations must therefore be cancel-safe: dropping
//! the future before it completes must not corrupt the underlying stream.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::frame::Frame;
use crate::domain::topic::Topic;

// ── Bus ───────────────────────────────────────────────────────────────────────

/// Errors reported by a bus client or subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The broker cannot be reached at all.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// An open subscription's message stream broke.
    #[error("subscription stream failed: {0}")]
    Stream(String),
}

/// A message delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// Long-lived, shared handle to the pub/sub broker.
///
/// One instance serves every session of the process, so implementations must
/// be usable concurrently through a shared reference.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publishes `payload` to `topic`.
    async fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<(), BusError>;

    /// Opens a new subscription to `topic`.
    async fn subscribe(&self, topic: &Topic) -> Result<Box<dyn Subscription>, BusError>;
}

/// An open subscription: a stream of messages on one topic.
#[async_trait]
pub trait Subscription: Send {
    fn topic(&self) -> &Topic;

    /// Waits for the next message.
    ///
    /// Returns `None` once the subscription is closed or the bus connection is
    /// gone; `Some(Err(_))` for a stream-level failure.
    async fn next_message(&mut self) -> Option<Result<BusMessage, BusError>>;

    /// Releases the subscription.  Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), BusError>;
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Errors reported by a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peer closed the connection (close frame or end of stream).
    #[error("connection closed")]
    Closed,

    /// No frame arrived within the configured idle timeout.
    #[error("no frame received for {0:?}")]
    IdleTimeout(Duration),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The receiving half of a client connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Waits for the next data frame from the client.
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError>;
}

/// The sending half of a client connection.
#[async_trait]
pub trait FrameWriter: Send {
    /// Sends one frame to the client.
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError>;

    /// Closes the connection.  Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

/// A live, bidirectional client connection produced by an acceptor.
///
/// The relay splits it so the two pumps can read and write at the same time
/// without sharing a lock.
pub trait Connection: Send + 'static {
    type Reader: FrameReader + 'static;
    type Writer: FrameWriter + 'static;

    fn into_split(self) -> (Self::Reader, Self::Writer);
}
