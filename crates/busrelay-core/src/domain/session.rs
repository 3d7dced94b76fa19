//! Relay session identity and lifecycle.
//!
//! A session pairs one client connection with one bus subscription for its
//! whole lifetime.  Its state only ever moves forward:
//!
//! ```text
//! Created ──▶ Subscribed ──▶ Running ──▶ Closing ──▶ Closed
//!    │                                                 ▲
//!    └────────────── subscription failed ──────────────┘
//! ```
//!
//! `Closed` is terminal: advancing a closed session to `Closed` again is
//! accepted as a no-op, every other transition out of it is refused.

use std::fmt;

use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier of one relay session, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first UUID group is plenty to tell concurrent sessions apart in logs.
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The connection is established; no subscription yet.
    Created,
    /// The bus subscription is open; pumps not yet started.
    Subscribed,
    /// Both pumps are alive.
    Running,
    /// A pump has stopped; the other is being stopped and resources released.
    Closing,
    /// Subscription and connection are released.  Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` if a session in `self` may move to `next`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Subscribed)
                | (Created, Closed)
                | (Subscribed, Running)
                | (Running, Closing)
                | (Closing, Closed)
                | (Closed, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Subscribed => "subscribed",
            SessionState::Running => "running",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
///
/// Recorded by whichever side failed first; later failures during teardown
/// do not overwrite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The bus subscription could not be opened; no pump ever ran.
    SubscribeFailed(String),
    /// The client closed the connection.
    ClientClosed,
    /// Reading from the connection failed (protocol error, idle timeout, ...).
    ReadFailed(String),
    /// Publishing a client frame to the bus failed.
    PublishFailed(String),
    /// Writing a bus message to the connection failed.
    WriteFailed(String),
    /// The subscription's message stream ended.
    SubscriptionClosed,
    /// The subscription's message stream reported an error.
    BusFailed(String),
    /// The server is shutting down.
    Shutdown,
}

impl EndReason {
    /// `true` for the reasons that count as a normal end of session.
    pub fn is_graceful(&self) -> bool {
        matches!(self, EndReason::ClientClosed | EndReason::Shutdown)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::SubscribeFailed(e) => write!(f, "subscription failed: {e}"),
            EndReason::ClientClosed => f.write_str("client closed the connection"),
            EndReason::ReadFailed(e) => write!(f, "connection read failed: {e}"),
            EndReason::PublishFailed(e) => write!(f, "publish failed: {e}"),
            EndReason::WriteFailed(e) => write!(f, "connection write failed: {e}"),
            EndReason::SubscriptionClosed => f.write_str("subscription stream ended"),
            EndReason::BusFailed(e) => write!(f, "subscription stream failed: {e}"),
            EndReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Summary of a finished session, returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub id: SessionId,
    /// Always [`SessionState::Closed`] once the relay has returned.
    pub state: SessionState,
    pub end: EndReason,
    /// Client frames published to the bus.
    pub published: u64,
    /// Bus messages written to the client.
    pub delivered: u64,
}

/// Forward-only state tracker for one session.
#[derive(Debug)]
pub struct SessionLifecycle {
    id: SessionId,
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Created,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// Returns `false` (and logs) when the transition is refused; the state is
    /// left unchanged.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(
                "session {}: refused state transition {} -> {}",
                self.id, self.state, next
            );
            return false;
        }
        if self.state != next {
            debug!("session {}: {} -> {}", self.id, self.state, next);
            self.state = next;
        }
        true
    }
}
