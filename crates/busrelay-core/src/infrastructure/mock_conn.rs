//! Channel-backed mock connection for tests.
//!
//! [`mock_connection`] returns the server-side [`MockConnection`] (hand it to
//! the relay) and a [`MockClient`] that plays the remote peer: it sends
//! frames, injects failures, hangs up, and observes what the relay wrote and
//! how often it closed the connection.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::ports::{Connection, ConnectionError, FrameReader, FrameWriter};
use crate::domain::frame::Frame;

#[derive(Debug, Default)]
struct MockState {
    close_calls: AtomicUsize,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    stall_close: AtomicBool,
}

/// Creates a connected mock connection / mock client pair.
pub fn mock_connection() -> (MockConnection, MockClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();
    let state = Arc::new(MockState::default());

    let conn = MockConnection {
        reader: MockFrameReader { rx: from_client },
        writer: MockFrameWriter {
            tx: Some(to_client),
            state: Arc::clone(&state),
        },
    };
    let client = MockClient {
        tx: Some(to_server),
        rx: from_server,
        state,
    };
    (conn, client)
}

/// Server side of a mock connection.
pub struct MockConnection {
    reader: MockFrameReader,
    writer: MockFrameWriter,
}

impl Connection for MockConnection {
    type Reader = MockFrameReader;
    type Writer = MockFrameWriter;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        (self.reader, self.writer)
    }
}

pub struct MockFrameReader {
    rx: mpsc::UnboundedReceiver<Result<Frame, ConnectionError>>,
}

#[async_trait]
impl FrameReader for MockFrameReader {
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
        // All client senders gone means the client hung up.
        self.rx.recv().await.unwrap_or(Err(ConnectionError::Closed))
    }
}

pub struct MockFrameWriter {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    state: Arc<MockState>,
}

#[async_trait]
impl FrameWriter for MockFrameWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        if self.state.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("injected write failure".into()));
        }
        let tx = self.tx.as_ref().ok_or(ConnectionError::Closed)?;
        tx.send(frame).map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.tx = None;
        Ok(())
    }
}

/// The remote peer of a [`MockConnection`].
pub struct MockClient {
    tx: Option<mpsc::UnboundedSender<Result<Frame, ConnectionError>>>,
    rx: mpsc::UnboundedReceiver<Frame>,
    state: Arc<MockState>,
}

impl MockClient {
    pub fn send_text(&self, text: &str) {
        self.send(Ok(Frame::text(text)));
    }

    pub fn send_binary(&self, payload: &[u8]) {
        self.send(Ok(Frame::binary(payload)));
    }

    /// Makes the server's next read fail with `error`.
    pub fn send_error(&self, error: ConnectionError) {
        self.send(Err(error));
    }

    fn send(&self, item: Result<Frame, ConnectionError>) {
        if let Some(tx) = &self.tx {
            // The server may already have dropped its reader; that is fine.
            let _ = tx.send(item);
        }
    }

    /// Hangs up: once queued frames are drained, reads return `Closed`.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// All later server writes fail with a transport error.
    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// All later server writes block forever, like a peer that stopped reading.
    pub fn stall_writes(&self) {
        self.state.stall_writes.store(true, Ordering::SeqCst);
    }

    /// The server's `close()` never completes, like a socket that cannot
    /// flush its close frame.
    pub fn stall_close(&self) {
        self.state.stall_close.store(true, Ordering::SeqCst);
    }

    /// Waits for the next frame written by the server.
    ///
    /// Returns `None` once the server closed or dropped its writer and every
    /// written frame has been received.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Returns a frame written by the server, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Number of times the server called `close()` on its writer.
    pub fn close_count(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }
}
