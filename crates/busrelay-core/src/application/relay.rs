//! The relay: one session per client connection.
//!
//! For each connection the relay opens exactly one subscription on its topic
//! and runs two pumps concurrently:
//!
//! ```text
//! inbound  (spawned task):  Subscription ──next_message──▶ FrameWriter
//! outbound (caller's task): FrameReader  ──read_frame───▶ BusClient::publish
//! ```
//!
//! # Teardown
//!
//! Both pumps share one [`Teardown`]: a cancellation token plus a
//! first-reason-wins slot.  Whichever pump fails first records why and cancels
//! the token; every blocking point in both pumps (subscription receive,
//! connection read, connection write) is raced against that token, so the
//! other pump stops promptly even when it is parked on a dead connection or a
//! silent subscription.  Only after *both* pumps have stopped does the relay
//! close the subscription and then the connection, each exactly once.
//!
//! If the future returned by [`Relay::run`] is dropped before it completes
//! (the caller's task was aborted), a drop guard cancels the token so the
//! spawned inbound pump still exits and releases what it owns.
//!
//! # Backpressure
//!
//! The inbound pump writes each message before receiving the next, so a slow
//! client slows its own subscription's consumption.  Nothing bounds message
//! size or buffers between the two sides.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::ports::{
    BusClient, Connection, ConnectionError, FrameReader, FrameWriter, Subscription,
};
use crate::domain::frame::Frame;
use crate::domain::session::{
    EndReason, SessionId, SessionLifecycle, SessionReport, SessionState,
};
use crate::domain::topic::Topic;

/// Characters of payload shown in per-message log lines.
const PREVIEW_CHARS: usize = 64;

/// Longest wait for a connection to close before it is dropped instead.
///
/// A client that stopped reading can keep a close (flush + close frame)
/// pending forever.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Relays messages between client connections and one bus topic.
///
/// The bus client is shared by every session; the relay holds no
/// per-session state, so one `Relay` can run any number of sessions
/// concurrently.
#[derive(Clone)]
pub struct Relay {
    bus: Arc<dyn BusClient>,
    topic: Topic,
}

impl Relay {
    pub fn new(bus: Arc<dyn BusClient>, topic: Topic) -> Self {
        Self { bus, topic }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Runs one session until either side ends it.
    ///
    /// Never fails: every error ends the session and is reported in the
    /// returned [`SessionReport`].
    pub async fn run<C: Connection>(&self, connection: C) -> SessionReport {
        self.run_until(connection, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but also ends the session (with
    /// [`EndReason::Shutdown`]) when `shutdown` is cancelled.
    pub async fn run_until<C: Connection>(
        &self,
        connection: C,
        shutdown: CancellationToken,
    ) -> SessionReport {
        let mut lifecycle = SessionLifecycle::new(SessionId::new());
        let id = lifecycle.id();
        let (reader, mut writer) = connection.into_split();

        // ── Created → Subscribed ──────────────────────────────────────────────
        let subscription = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("session {id}: shut down before subscribing");
                return end_unstarted(lifecycle, &mut writer, EndReason::Shutdown).await;
            }
            subscribed = self.bus.subscribe(&self.topic) => match subscribed {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!("session {id}: cannot subscribe to '{}': {e}", self.topic);
                    let end = EndReason::SubscribeFailed(e.to_string());
                    return end_unstarted(lifecycle, &mut writer, end).await;
                }
            },
        };
        lifecycle.advance(SessionState::Subscribed);
        info!("session {id}: subscribed to '{}'", self.topic);

        // ── Subscribed → Running ──────────────────────────────────────────────
        let teardown = Arc::new(Teardown::new(shutdown.child_token()));
        let _abort_guard = teardown.token.clone().drop_guard();
        lifecycle.advance(SessionState::Running);

        let inbound = tokio::spawn(inbound_pump(
            id,
            subscription,
            writer,
            Arc::clone(&teardown),
        ));
        let published = outbound_pump(id, reader, self.bus.as_ref(), &self.topic, &teardown).await;

        // ── Running → Closing ─────────────────────────────────────────────────
        teardown.token.cancel();
        lifecycle.advance(SessionState::Closing);

        let delivered = match inbound.await {
            Ok(mut stopped) => {
                close_subscription(id, stopped.subscription.as_mut()).await;
                close_writer(id, &mut stopped.writer).await;
                // `stopped` drops here, releasing the connection even if the
                // close timed out.
                stopped.delivered
            }
            Err(e) => {
                // The subscription and writer were dropped with the task,
                // which releases them.
                error!("session {id}: inbound pump did not finish cleanly: {e}");
                0
            }
        };

        // ── Closing → Closed ──────────────────────────────────────────────────
        lifecycle.advance(SessionState::Closed);
        let end = teardown.reason();
        if end.is_graceful() {
            info!("session {id}: closed ({end}); published={published} delivered={delivered}");
        } else {
            warn!("session {id}: closed ({end}); published={published} delivered={delivered}");
        }

        SessionReport {
            id,
            state: lifecycle.state(),
            end,
            published,
            delivered,
        }
    }
}

// ── Teardown coordination ─────────────────────────────────────────────────────

/// The single teardown path shared by both pumps of a session.
struct Teardown {
    token: CancellationToken,
    reason: OnceLock<EndReason>,
}

impl Teardown {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: OnceLock::new(),
        }
    }

    /// Records `reason` if no pump has failed yet, then cancels the session.
    ///
    /// Safe to call from both pumps at once; only the first reason is kept.
    fn trigger(&self, reason: EndReason) {
        if self.reason.set(reason).is_err() {
            debug!("teardown already in progress");
        }
        self.token.cancel();
    }

    /// The recorded reason; a session cancelled without one was shut down
    /// from outside.
    fn reason(&self) -> EndReason {
        self.reason.get().cloned().unwrap_or(EndReason::Shutdown)
    }
}

// ── Pumps ─────────────────────────────────────────────────────────────────────

/// Connection → bus.  Returns the number of frames published.
async fn outbound_pump<R: FrameReader>(
    id: SessionId,
    mut reader: R,
    bus: &dyn BusClient,
    topic: &Topic,
    teardown: &Teardown,
) -> u64 {
    let mut published = 0;

    loop {
        let read = tokio::select! {
            biased;
            _ = teardown.token.cancelled() => break,
            read = reader.read_frame() => read,
        };

        let frame = match read {
            Ok(frame) => frame,
            Err(ConnectionError::Closed) => {
                debug!("session {id}: client closed the connection");
                teardown.trigger(EndReason::ClientClosed);
                break;
            }
            Err(e) => {
                warn!("session {id}: read from client failed: {e}");
                teardown.trigger(EndReason::ReadFailed(e.to_string()));
                break;
            }
        };

        debug!(
            "session {id}: client → bus [{:?}, {} bytes] {}",
            frame.kind(),
            frame.len(),
            frame.preview(PREVIEW_CHARS)
        );

        if let Err(e) = bus.publish(topic, frame.payload()).await {
            warn!("session {id}: publish to '{topic}' failed: {e}");
            teardown.trigger(EndReason::PublishFailed(e.to_string()));
            break;
        }
        published += 1;
    }

    published
}

/// What the inbound pump hands back for teardown once it stops.
struct StoppedInbound<W> {
    subscription: Box<dyn Subscription>,
    writer: W,
    delivered: u64,
}

/// Bus → connection.
async fn inbound_pump<W: FrameWriter>(
    id: SessionId,
    mut subscription: Box<dyn Subscription>,
    mut writer: W,
    teardown: Arc<Teardown>,
) -> StoppedInbound<W> {
    let mut delivered = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = teardown.token.cancelled() => break,
            next = subscription.next_message() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!("session {id}: subscription failed: {e}");
                teardown.trigger(EndReason::BusFailed(e.to_string()));
                break;
            }
            None => {
                info!(
                    "session {id}: subscription to '{}' ended",
                    subscription.topic()
                );
                teardown.trigger(EndReason::SubscriptionClosed);
                break;
            }
        };

        let frame = Frame::from_bus_payload(message.payload);
        debug!(
            "session {id}: bus → client [{:?}, {} bytes] {}",
            frame.kind(),
            frame.len(),
            frame.preview(PREVIEW_CHARS)
        );

        let written = tokio::select! {
            biased;
            _ = teardown.token.cancelled() => break,
            written = writer.write_frame(frame) => written,
        };
        if let Err(e) = written {
            debug!("session {id}: write to client failed: {e}");
            teardown.trigger(EndReason::WriteFailed(e.to_string()));
            break;
        }
        delivered += 1;
    }

    StoppedInbound {
        subscription,
        writer,
        delivered,
    }
}

// ── Resource release ──────────────────────────────────────────────────────────

async fn close_subscription(id: SessionId, subscription: &mut dyn Subscription) {
    if let Err(e) = subscription.close().await {
        debug!("session {id}: closing subscription: {e}");
    }
}

/// Closes the connection, giving up after [`CLOSE_TIMEOUT`].  The caller
/// drops the writer afterwards, which releases the transport either way.
async fn close_writer<W: FrameWriter>(id: SessionId, writer: &mut W) {
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("session {id}: closing connection: {e}"),
        Err(_) => warn!(
            "session {id}: connection close timed out after {CLOSE_TIMEOUT:?}; dropping it"
        ),
    }
}

/// Ends a session that never started its pumps.
async fn end_unstarted<W: FrameWriter>(
    mut lifecycle: SessionLifecycle,
    writer: &mut W,
    end: EndReason,
) -> SessionReport {
    let id = lifecycle.id();
    close_writer(id, writer).await;
    lifecycle.advance(SessionState::Closed);
    SessionReport {
        id,
        state: lifecycle.state(),
        end,
        published: 0,
        delivered: 0,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
