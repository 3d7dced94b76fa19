//! Infrastructure that needs no network access.
//!
//! - [`memory_bus`] – a process-local broker implementing [`BusClient`]
//! - [`mock_conn`] – a channel-backed [`Connection`] for tests
//!
//! [`BusClient`]: crate::application::ports::BusClient
//! [`Connection`]: crate::application::ports::Connection

pub mod memory_bus;
pub mod mock_conn;

pub use memory_bus::{MemoryBus, MemorySubscription};
pub use mock_conn::{mock_connection, MockClient, MockConnection};
