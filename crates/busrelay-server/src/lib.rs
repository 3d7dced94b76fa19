//! busrelay-server library crate.
//!
//! Serves WebSocket clients and relays their messages through a pub/sub
//! topic: whatever one client sends is published to the topic, and every
//! message on the topic is written to every connected client.
//!
//! # Architecture
//!
//! ```text
//! WebSocket clients
//!         ↕
//! [busrelay-server]
//!   ├── domain/            ServerConfig, BusConfig, BusBackend
//!   └── infrastructure/
//!         ├── config_file/ TOML loading and validation
//!         ├── ws_server/   accept loop, path check, shutdown drain
//!         ├── ws_conn/     tokio-tungstenite adapter for the relay
//!         └── redis_bus/   Redis PUBLISH / SUBSCRIBE
//!         ↕
//! [busrelay-core]          Relay, ports, in-memory bus
//! ```

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Infrastructure layer: config file, Redis bus and WebSocket server.
pub mod infrastructure;
