//! busrelay: WebSocket ↔ pub/sub relay server.
//!
//! Every WebSocket client connected to the endpoint gets its own relay
//! session.  Messages a client sends are published to the configured topic;
//! messages on the topic are written to every connected client, the sender
//! included.
//!
//! # Usage
//!
//! ```text
//! busrelay [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file [default: ./busrelay.toml if present]
//!   --address <ADDR>           Listen address [default: 0.0.0.0:8080]
//!   --path <PATH>              WebSocket endpoint path [default: /socket]
//!   --topic <NAME>             Pub/sub topic [default: websocketChannel]
//!   --backend <redis|memory>   Bus backend [default: redis]
//!   --redis-address <ADDR>     Redis host:port [default: 127.0.0.1:6379]
//!   --redis-password <PASS>    Redis password [default: none]
//!   --redis-db <N>             Redis database index [default: 0]
//!   --read-timeout <SECS>      Close clients idle this long, 0 = never
//!   --shutdown-timeout <SECS>  Grace period for sessions on shutdown
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults < config file < environment variables < CLI flags.
//!
//! | Variable                    | Flag                 |
//! |-----------------------------|----------------------|
//! | `BUSRELAY_CONFIG`           | `--config`           |
//! | `SERVER_ADDRESS`            | `--address`          |
//! | `BUSRELAY_PATH`             | `--path`             |
//! | `BUSRELAY_TOPIC`            | `--topic`            |
//! | `BUSRELAY_BACKEND`          | `--backend`          |
//! | `REDIS_ADDRESS`             | `--redis-address`    |
//! | `REDIS_PASSWORD`            | `--redis-password`   |
//! | `REDIS_DB`                  | `--redis-db`         |
//! | `BUSRELAY_READ_TIMEOUT`     | `--read-timeout`     |
//! | `BUSRELAY_SHUTDOWN_TIMEOUT` | `--shutdown-timeout` |

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use busrelay_server::domain::{BusBackend, ServerConfig};
use busrelay_server::infrastructure::{connect_bus, load_config, run_server, FileConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket ↔ pub/sub relay server.
///
/// Every flag is optional; an absent flag leaves the config file (or the
/// built-in default) in effect.
#[derive(Debug, Parser)]
#[command(
    name = "busrelay",
    about = "Relays WebSocket client messages through a pub/sub topic",
    version
)]
struct Cli {
    /// Path to a TOML config file.  Must exist when given.
    #[arg(long, env = "BUSRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address the WebSocket listener binds to (`host:port`).
    #[arg(long, env = "SERVER_ADDRESS")]
    address: Option<String>,

    /// HTTP path on which WebSocket upgrades are accepted.
    #[arg(long, env = "BUSRELAY_PATH")]
    path: Option<String>,

    /// Topic every session publishes to and subscribes on.
    #[arg(long, env = "BUSRELAY_TOPIC")]
    topic: Option<String>,

    /// Bus backend: `redis` or `memory` (single process only).
    #[arg(long, env = "BUSRELAY_BACKEND")]
    backend: Option<BusBackend>,

    /// Redis server address (`host:port`).
    #[arg(long, env = "REDIS_ADDRESS")]
    redis_address: Option<String>,

    /// Redis password.  Empty means no authentication.
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    /// Redis logical database index.
    #[arg(long, env = "REDIS_DB")]
    redis_db: Option<i64>,

    /// Close a client after this many seconds without a message; 0 disables.
    #[arg(long, env = "BUSRELAY_READ_TIMEOUT")]
    read_timeout: Option<u64>,

    /// Seconds to wait for open sessions on shutdown before aborting them.
    #[arg(long, env = "BUSRELAY_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,
}

impl Cli {
    /// Overlays the flags (and their environment variables) on `file`.
    fn apply(self, mut file: FileConfig) -> FileConfig {
        if let Some(v) = self.address {
            file.server.address = v;
        }
        if let Some(v) = self.path {
            file.server.path = v;
        }
        if let Some(v) = self.read_timeout {
            file.server.read_timeout_secs = v;
        }
        if let Some(v) = self.shutdown_timeout {
            file.server.shutdown_timeout_secs = v;
        }
        if let Some(v) = self.topic {
            file.bus.topic = v;
        }
        if let Some(v) = self.backend {
            file.bus.backend = v;
        }
        if let Some(v) = self.redis_address {
            file.bus.redis_address = v;
        }
        if let Some(v) = self.redis_password {
            file.bus.redis_password = v;
        }
        if let Some(v) = self.redis_db {
            file.bus.redis_db = v;
        }
        file
    }

    /// Loads the config file, applies the overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a merged
    /// value is invalid.
    fn into_server_config(mut self) -> anyhow::Result<ServerConfig> {
        let path = self.config.take();
        let file = load_config(path.as_deref()).context("failed to load configuration")?;
        self.apply(file)
            .into_server_config()
            .context("invalid configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "busrelay starting: listen={}, path={}, topic='{}', backend={}",
        config.bind_addr, config.endpoint_path, config.topic, config.bus.backend
    );

    let bus = connect_bus(&config.bus).await?;

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    //
    // Cancelling the root token stops the accept loop and, through child
    // tokens, every open session.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                signal_token.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, bus, shutdown).await?;

    info!("busrelay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
