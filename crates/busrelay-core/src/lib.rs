//! # busrelay-core
//!
//! The per-connection relay that bridges a persistent client connection and a
//! shared publish/subscribe bus.
//!
//! Every message a client sends is published to a topic on the bus; every
//! message the bus delivers on that topic is written back to the client.  Run
//! one relay session per connection on every server process and the bus fans a
//! single client's message out to all connected clients, wherever they are.
//!
//! # Architecture overview
//!
//! ```text
//! client ──frame──▶ FrameReader ──▶ [outbound pump] ──publish──▶ BusClient
//!                                                                    │
//!                                                                 broker
//!                                                                    │
//! client ◀──frame── FrameWriter ◀── [inbound pump] ◀──message── Subscription
//! ```
//!
//! - **`domain`** – Pure types: [`Topic`], [`Frame`], session lifecycle
//!   ([`SessionState`], [`EndReason`], [`SessionReport`]).
//!
//! - **`application`** – The port traits the relay depends on
//!   ([`BusClient`], [`Subscription`], [`Connection`]) and the [`Relay`] itself,
//!   which drives the two pumps and guarantees a single, complete teardown.
//!
//! - **`infrastructure`** – Implementations that need no sockets: the
//!   process-local [`MemoryBus`] and a channel-backed mock connection for tests.
//!
//! Socket-facing adapters (WebSocket, Redis) live in `busrelay-server`.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ports::{
    BusClient, BusError, BusMessage, Connection, ConnectionError, FrameReader, FrameWriter,
    Subscription,
};
pub use application::read_timeout::{ReadTimeout, TimeoutReader};
pub use application::relay::Relay;
pub use domain::frame::{Frame, FrameKind};
pub use domain::session::{EndReason, SessionId, SessionReport, SessionState};
pub use domain::topic::{Topic, TopicError};
pub use infrastructure::memory_bus::MemoryBus;
