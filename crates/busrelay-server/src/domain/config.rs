//! Server configuration types.
//!
//! [`ServerConfig`] is the validated, ready-to-use form of every runtime
//! setting.  It is produced by
//! [`FileConfig::into_server_config`](crate::infrastructure::config_file::FileConfig::into_server_config)
//! after the TOML file, environment variables and CLI flags have been merged,
//! and is then shared (behind an `Arc`) by every connection task.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use busrelay_core::Topic;
use serde::{Deserialize, Serialize};

/// Topic relayed when none is configured.
pub const DEFAULT_TOPIC: &str = "websocketChannel";
/// HTTP path on which WebSocket upgrades are accepted.
pub const DEFAULT_ENDPOINT_PATH: &str = "/socket";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIS_ADDRESS: &str = "127.0.0.1:6379";
/// Grace period for open sessions when the server shuts down.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which pub/sub implementation carries messages between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis PUBLISH / SUBSCRIBE; shares messages across server processes.
    #[default]
    Redis,
    /// In-process broadcast; a single server process only.
    Memory,
}

impl FromStr for BusBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(BusBackend::Redis),
            "memory" => Ok(BusBackend::Memory),
            other => Err(format!(
                "unknown bus backend '{other}' (expected 'redis' or 'memory')"
            )),
        }
    }
}

impl fmt::Display for BusBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusBackend::Redis => f.write_str("redis"),
            BusBackend::Memory => f.write_str("memory"),
        }
    }
}

/// Settings for the bus client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub backend: BusBackend,
    /// `host:port` of the Redis server.
    pub redis_address: String,
    /// Empty means no `AUTH`.
    pub redis_password: String,
    /// Redis logical database index.
    pub redis_db: i64,
    /// Per-topic buffer of the memory backend, in messages.
    pub memory_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redis,
            redis_address: DEFAULT_REDIS_ADDRESS.to_string(),
            redis_password: String::new(),
            redis_db: 0,
            memory_capacity: busrelay_core::infrastructure::memory_bus::DEFAULT_CAPACITY,
        }
    }
}

/// All runtime configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// The only HTTP path upgraded to a WebSocket; other paths get a 404.
    pub endpoint_path: String,

    /// The topic every session publishes to and subscribes on.
    pub topic: Topic,

    /// Close a session when its client sends nothing for this long.
    /// `None` keeps quiet clients connected indefinitely.
    pub read_timeout: Option<Duration>,

    /// How long shutdown waits for open sessions before aborting them.
    pub shutdown_timeout: Duration,

    pub bus: BusConfig,
}
