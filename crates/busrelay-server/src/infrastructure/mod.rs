//! Infrastructure layer for busrelay-server.
//!
//! Everything that touches the outside world lives here: the TOML file, the
//! Redis broker, and the WebSocket listener.
//!
//! # What does NOT belong here?
//!
//! - The relay itself (that is `busrelay_core::Relay`)
//! - Configuration types (that is the domain layer)

pub mod config_file;
pub mod redis_bus;
pub mod ws_conn;
pub mod ws_server;

use std::sync::Arc;

use anyhow::Context;
use busrelay_core::{BusClient, MemoryBus};
use tracing::warn;

use crate::domain::config::{BusBackend, BusConfig};

pub use config_file::{load_config, ConfigError, FileConfig};
pub use redis_bus::RedisBus;
pub use ws_conn::WsConnection;
pub use ws_server::{run_server, serve};

/// Creates the bus client selected by `config.backend`.
///
/// # Errors
///
/// Returns an error if the Redis backend is selected and the broker cannot be
/// reached.
pub async fn connect_bus(config: &BusConfig) -> anyhow::Result<Arc<dyn BusClient>> {
    match config.backend {
        BusBackend::Redis => {
            let bus = RedisBus::connect(config)
                .await
                .with_context(|| format!("failed to connect to redis at {}", config.redis_address))?;
            Ok(Arc::new(bus))
        }
        BusBackend::Memory => {
            warn!("using the in-memory bus; messages are shared by this process only");
            Ok(Arc::new(MemoryBus::new(config.memory_capacity)))
        }
    }
}
