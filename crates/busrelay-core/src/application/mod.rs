//! Application layer for busrelay.
//!
//! The application layer knows *what* a relay session does; it reaches the
//! outside world only through the traits in [`ports`].
//!
//! # Responsibilities
//!
//! - Defining the bus and connection ports (`BusClient`, `Subscription`,
//!   `Connection`, `FrameReader`, `FrameWriter`) and their error types
//! - Running a relay session: two pumps plus a single teardown path
//! - Layering an optional idle timeout on connection reads
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or talking to Redis (that is infrastructure)
//! - Accepting connections or the WebSocket handshake (`busrelay-server`)

pub mod ports;
pub mod read_timeout;
pub mod relay;

pub use ports::{
    BusClient, BusError, BusMessage, Connection, ConnectionError, FrameReader, FrameWriter,
    Subscription,
};
pub use read_timeout::{ReadTimeout, TimeoutReader};
pub use relay::Relay;
