//! Domain layer for busrelay.
//!
//! Pure types with no dependency on sockets, brokers or async runtimes:
//!
//! - [`Topic`] – the name of a bus channel
//! - [`Frame`] – one message unit exchanged with a client
//! - Session lifecycle: [`SessionId`], [`SessionState`], [`EndReason`],
//!   [`SessionReport`]

pub mod frame;
pub mod session;
pub mod topic;

pub use frame::{Frame, FrameKind};
pub use session::{EndReason, SessionId, SessionReport, SessionState};
pub use topic::{Topic, TopicError};
