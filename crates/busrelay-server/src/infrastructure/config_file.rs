//! TOML configuration file.
//!
//! The file is optional.  Without `--config`, the server looks for
//! `busrelay.toml` in the working directory and falls back to built-in
//! defaults when it is absent.  Every key may be omitted:
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:8080"
//! path = "/socket"
//! read_timeout_secs = 0        # 0 = never time out idle clients
//! shutdown_timeout_secs = 5
//!
//! [bus]
//! backend = "redis"            # or "memory"
//! topic = "websocketChannel"
//! redis_address = "127.0.0.1:6379"
//! redis_password = ""
//! redis_db = 0
//! memory_capacity = 1024
//! ```
//!
//! Values stay as raw strings/numbers here so that environment variables and
//! CLI flags can be layered on top before anything is validated; validation
//! happens once, in [`FileConfig::into_server_config`].

use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use busrelay_core::{Topic, TopicError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    BusBackend, BusConfig, ServerConfig, DEFAULT_ENDPOINT_PATH, DEFAULT_REDIS_ADDRESS,
    DEFAULT_SERVER_ADDRESS, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TOPIC,
};

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "busrelay.toml";

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid server address '{value}': {source}")]
    InvalidAddress {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    #[error("endpoint path must start with '/', got '{0}'")]
    InvalidPath(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub bus: BusSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub read_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// `[bus]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusSection {
    #[serde(default)]
    pub backend: BusBackend,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_redis_address")]
    pub redis_address: String,
    #[serde(default)]
    pub redis_password: String,
    #[serde(default)]
    pub redis_db: i64,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}
fn default_path() -> String {
    DEFAULT_ENDPOINT_PATH.to_string()
}
fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT.as_secs()
}
fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_redis_address() -> String {
    DEFAULT_REDIS_ADDRESS.to_string()
}
fn default_memory_capacity() -> usize {
    busrelay_core::infrastructure::memory_bus::DEFAULT_CAPACITY
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            path: default_path(),
            read_timeout_secs: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            topic: default_topic(),
            redis_address: default_redis_address(),
            redis_password: String::new(),
            redis_db: 0,
            memory_capacity: default_memory_capacity(),
        }
    }
}

// ── Loading & validation ──────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a value has the
/// wrong type.
pub fn parse_config(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads the configuration file.
///
/// With `Some(path)` the file must exist.  With `None`,
/// [`DEFAULT_CONFIG_FILE`] is read from the working directory if present and
/// defaults are returned otherwise.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(FileConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

impl FileConfig {
    /// Validates the merged settings and converts them into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`], [`ConfigError::InvalidTopic`]
    /// or [`ConfigError::InvalidPath`] for the first invalid value found.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let bind_addr: SocketAddr =
            self.server
                .address
                .parse()
                .map_err(|source| ConfigError::InvalidAddress {
                    value: self.server.address.clone(),
                    source,
                })?;

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.server.path));
        }

        let topic = Topic::new(self.bus.topic)?;

        let read_timeout = match self.server.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(ServerConfig {
            bind_addr,
            endpoint_path: self.server.path,
            topic,
            read_timeout,
            shutdown_timeout: Duration::from_secs(self.server.shutdown_timeout_secs),
            bus: BusConfig {
                backend: self.bus.backend,
                redis_address: self.bus.redis_address,
                redis_password: self.bus.redis_password,
                redis_db: self.bus.redis_db,
                memory_capacity: self.bus.memory_capacity,
            },
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let cfg = parse_config("").unwrap();

        // Assert
        assert_eq!(cfg, FileConfig::default());
        assert_eq!(cfg.server.address, "0.0.0.0:8080");
        assert_eq!(cfg.server.path, "/socket");
        assert_eq!(cfg.bus.topic, "websocketChannel");
        assert_eq!(cfg.bus.backend, BusBackend::Redis);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let cfg = parse_config(
            r#"
            [bus]
            backend = "memory"
            topic = "chat"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bus.backend, BusBackend::Memory);
        assert_eq!(cfg.bus.topic, "chat");
        assert_eq!(cfg.bus.redis_address, "127.0.0.1:6379");
        assert_eq!(cfg.server.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_full_file_is_parsed() {
        let cfg = parse_config(
            r#"
            [server]
            address = "127.0.0.1:9000"
            path = "/ws"
            read_timeout_secs = 30
            shutdown_timeout_secs = 2

            [bus]
            backend = "redis"
            topic = "events"
            redis_address = "10.0.0.5:6380"
            redis_password = "s3cret"
            redis_db = 3
            memory_capacity = 64
            "#,
        )
        .unwrap();

        let server = cfg.into_server_config().unwrap();
        assert_eq!(server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(server.endpoint_path, "/ws");
        assert_eq!(server.topic.as_str(), "events");
        assert_eq!(server.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(server.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(server.bus.redis_address, "10.0.0.5:6380");
        assert_eq!(server.bus.redis_password, "s3cret");
        assert_eq!(server.bus.redis_db, 3);
        assert_eq!(server.bus.memory_capacity, 64);
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let result = parse_config("[bus]\nbackend = \"kafka\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_read_timeout_disables_it() {
        let server = FileConfig::default().into_server_config().unwrap();
        assert_eq!(server.read_timeout, None);
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let mut cfg = FileConfig::default();
        cfg.server.address = "not-an-address".to_string();

        let result = cfg.into_server_config();

        assert!(matches!(result, Err(ConfigError::InvalidAddress { .. })));
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let mut cfg = FileConfig::default();
        cfg.bus.topic = String::new();
        assert!(matches!(
            cfg.into_server_config(),
            Err(ConfigError::InvalidTopic(TopicError::Empty))
        ));
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let mut cfg = FileConfig::default();
        cfg.server.path = "socket".to_string();
        assert!(matches!(
            cfg.into_server_config(),
            Err(ConfigError::InvalidPath(p)) if p == "socket"
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(Some(Path::new("/definitely/not/here/busrelay.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_explicit_file_is_read() {
        // Arrange: write a config file into a unique temp location
        let path = std::env::temp_dir().join(format!(
            "busrelay-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[server]\naddress = \"127.0.0.1:7000\"\n").unwrap();

        // Act
        let result = load_config(Some(&path));
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(result.unwrap().server.address, "127.0.0.1:7000");
    }
}
