//! Frames: the discrete message units exchanged with a client.
//!
//! A frame is a type tag plus payload bytes.  The relay never inspects or
//! rewrites the payload; the tag only tells the connection adapter which kind
//! of frame to put on the wire.
//!
//! # Text vs binary
//!
//! WebSocket text frames must carry valid UTF-8, so [`FrameKind::Text`] frames
//! can only be built from a `String`.  Messages arriving from the bus carry no
//! tag at all; [`Frame::from_bus_payload`] sends them as text when the bytes
//! are valid UTF-8 and as binary otherwise, which keeps every payload
//! deliverable byte-for-byte.

use std::borrow::Cow;

/// The type tag of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text payload.
    Text,
    /// Arbitrary bytes.
    Binary,
}

/// One message unit: a type tag plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: Vec<u8>,
}

impl Frame {
    /// Creates a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    /// Creates a binary frame.
    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }

    /// Builds the frame used to deliver a bus message to a client.
    ///
    /// Valid UTF-8 becomes a text frame, anything else a binary frame.  The
    /// payload bytes are moved in unchanged either way.
    pub fn from_bus_payload(payload: Vec<u8>) -> Self {
        match String::from_utf8(payload) {
            Ok(text) => Self::text(text),
            Err(e) => Self::binary(e.into_bytes()),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consumes the frame, returning its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Short, lossy rendering of the payload for log lines.
    ///
    /// Truncated to `max_chars` characters; invalid UTF-8 is replaced.
    pub fn preview(&self, max_chars: usize) -> Cow<'_, str> {
        let text = String::from_utf8_lossy(&self.payload);
        if text.chars().count() <= max_chars {
            return text;
        }
        let truncated: String = text.chars().take(max_chars).collect();
        Cow::Owned(format!("{truncated}…"))
    }
}
