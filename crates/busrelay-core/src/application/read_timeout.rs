//! Idle timeout layered on top of any connection's reads.
//!
//! The relay itself never times out a read: a quiet client is a healthy
//! client.  Deployments that want idle connections dropped wrap the
//! connection in [`ReadTimeout`] before handing it to the relay; an expired
//! read surfaces as [`ConnectionError::IdleTimeout`] and goes through the same
//! teardown path as any other read failure.

use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{Connection, ConnectionError, FrameReader};
use crate::domain::frame::Frame;

/// A [`FrameReader`] whose every read must complete within `idle`.
pub struct TimeoutReader<R> {
    inner: R,
    idle: Duration,
}

impl<R> TimeoutReader<R> {
    pub fn new(inner: R, idle: Duration) -> Self {
        Self { inner, idle }
    }
}

#[async_trait]
impl<R: FrameReader> FrameReader for TimeoutReader<R> {
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
        match tokio::time::timeout(self.idle, self.inner.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::IdleTimeout(self.idle)),
        }
    }
}

/// A [`Connection`] whose reader is wrapped in a [`TimeoutReader`].
pub struct ReadTimeout<C> {
    inner: C,
    idle: Duration,
}

impl<C: Connection> ReadTimeout<C> {
    pub fn new(inner: C, idle: Duration) -> Self {
        Self { inner, idle }
    }
}

impl<C: Connection> Connection for ReadTimeout<C> {
    type Reader = TimeoutReader<C::Reader>;
    type Writer = C::Writer;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        let (reader, writer) = self.inner.into_split();
        (TimeoutReader::new(reader, self.idle), writer)
    }
}
