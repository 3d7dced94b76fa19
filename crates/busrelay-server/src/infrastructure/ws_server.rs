//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading connections on the configured path to WebSocket sessions and
//!    answering every other path with `404 Not Found`.
//! 3. Running one [`Relay`] session per upgraded connection in its own task.
//! 4. On shutdown, stopping the accept loop and giving open sessions a grace
//!    period to tear down before aborting them.
//!
//! Every session task runs inside a `conn` tracing span carrying the peer
//! address, so relay log lines can be attributed to a client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use busrelay_core::{BusClient, ReadTimeout, Relay};

use crate::domain::config::ServerConfig;
use crate::infrastructure::ws_conn::WsConnection;

/// Pause after a failed `accept()` (e.g. too many open files) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: ServerConfig,
    bus: Arc<dyn BusClient>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    serve(listener, config, bus, shutdown).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Returns once `shutdown` has been cancelled and every session has ended
/// (or been aborted after `config.shutdown_timeout`).
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    bus: Arc<dyn BusClient>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "relaying ws://{local_addr}{} <-> topic '{}'",
        config.endpoint_path, config.topic
    );

    let config = Arc::new(config);
    let relay = Relay::new(bus, config.topic.clone());
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("accepted TCP connection from {peer}");
                    let span = info_span!("conn", %peer);
                    sessions.spawn(
                        handle_connection(
                            stream,
                            Arc::clone(&config),
                            relay.clone(),
                            shutdown.child_token(),
                        )
                        .instrument(span),
                    );
                }
                Err(e) => {
                    // Transient accept error; keep serving the open sessions.
                    error!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },

            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                log_join(joined);
            }
        }
    }

    // Stop accepting before draining.
    drop(listener);
    drain_sessions(&mut sessions, config.shutdown_timeout).await;
    info!("server stopped");
    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Upgrades one TCP connection and runs its relay session to completion.
async fn handle_connection(
    stream: TcpStream,
    config: Arc<ServerConfig>,
    relay: Relay,
    shutdown: CancellationToken,
) {
    let handshake = accept_hdr_async(stream, |req: &Request, resp: Response| {
        check_path(req, resp, &config.endpoint_path)
    });

    let ws = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        result = handshake => match result {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket upgrade failed: {e}");
                return;
            }
        },
    };
    info!("WebSocket session established");

    // The relay logs the session's end and counts inside this span.
    let conn = WsConnection::new(ws);
    match config.read_timeout {
        Some(idle) => relay.run_until(ReadTimeout::new(conn, idle), shutdown).await,
        None => relay.run_until(conn, shutdown).await,
    };
}

/// Handshake callback: only `path` may be upgraded.
fn check_path(req: &Request, resp: Response, path: &str) -> Result<Response, ErrorResponse> {
    if req.uri().path() == path {
        return Ok(resp);
    }
    debug!("rejecting upgrade on {}", req.uri().path());
    let mut not_found = ErrorResponse::new(Some("not found".to_string()));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    Err(not_found)
}

fn log_join(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("session task panicked: {e}"),
        Err(e) => debug!("session task cancelled: {e}"),
    }
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

/// Waits up to `grace` for open sessions to finish, then aborts the rest.
///
/// The sessions' tokens are children of the server's shutdown token, so they
/// are already tearing down when this is called.
async fn drain_sessions(sessions: &mut JoinSet<()>, grace: Duration) {
    if sessions.is_empty() {
        return;
    }
    info!("waiting up to {grace:?} for {} open session(s)", sessions.len());

    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = sessions.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            "{} session(s) still open after {grace:?}; aborting",
            sessions.len()
        );
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
