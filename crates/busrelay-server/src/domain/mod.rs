//! Domain layer for busrelay-server.
//!
//! Plain configuration types with no I/O.  The infrastructure layer fills
//! them in from the config file, the environment and the command line.

pub mod config;

pub use config::{BusBackend, BusConfig, ServerConfig};
