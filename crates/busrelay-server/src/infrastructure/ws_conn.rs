//! WebSocket adapter for the relay's connection port.
//!
//! [`WsConnection`] wraps an upgraded `tokio_tungstenite` stream and splits it
//! into a [`WsFrameReader`] and a [`WsFrameWriter`], so the relay's two pumps
//! can read and write concurrently without a shared lock.
//!
//! # Frame mapping
//!
//! | WebSocket message   | Relay side                          |
//! |---------------------|-------------------------------------|
//! | Text / Binary       | [`Frame`] with the same kind/bytes  |
//! | Ping / Pong / raw   | skipped (tungstenite answers pings) |
//! | Close, end of stream| [`ConnectionError::Closed`]         |

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::trace;

use busrelay_core::{Connection, ConnectionError, Frame, FrameKind, FrameReader, FrameWriter};

/// An upgraded WebSocket connection.
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsFrameReader<S>;
    type Writer = WsFrameWriter<S>;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (
            WsFrameReader { stream },
            WsFrameWriter {
                sink,
                closed: false,
            },
        )
    }
}

/// Receiving half of a [`WsConnection`].
pub struct WsFrameReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> FrameReader for WsFrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(ConnectionError::Closed),
            };

            match message {
                WsMessage::Text(text) => return Ok(Frame::text(text)),
                WsMessage::Binary(data) => return Ok(Frame::binary(data)),
                WsMessage::Close(close) => {
                    trace!("close frame received: {close:?}");
                    return Err(ConnectionError::Closed);
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }
}

/// Sending half of a [`WsConnection`].
pub struct WsFrameWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
    closed: bool,
}

#[async_trait]
impl<S> FrameWriter for WsFrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        let message = match frame.kind() {
            FrameKind::Text => {
                let text = String::from_utf8(frame.into_payload()).map_err(|e| {
                    ConnectionError::Protocol(format!("text frame is not valid UTF-8: {e}"))
                })?;
                WsMessage::Text(text)
            }
            FrameKind::Binary => WsMessage::Binary(frame.into_payload()),
        };
        self.sink.send(message).await.map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(e) => match map_ws_error(e) {
                ConnectionError::Closed => Ok(()),
                other => Err(other),
            },
        }
    }
}

/// Maps tungstenite errors onto the relay's connection errors.
///
/// A peer that vanishes without a closing handshake (browser tab killed,
/// network drop) is reported as an ordinary close.
fn map_ws_error(e: WsError) -> ConnectionError {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            ConnectionError::Closed
        }
        WsError::Protocol(p) => ConnectionError::Protocol(p.to_string()),
        WsError::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => ConnectionError::Closed,
        other => ConnectionError::Transport(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
