//! Bus topic names.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error returned when a topic name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic name must not be empty")]
    Empty,
}

/// An immutable, non-empty channel name on the pub/sub bus.
///
/// A process normally relays a single well-known topic, but the relay always
/// receives it as a parameter.  Cloning is cheap (the name is shared).
///
/// ```rust
/// use busrelay_core::Topic;
///
/// let topic = Topic::new("websocketChannel").unwrap();
/// assert_eq!(topic.as_str(), "websocketChannel");
/// assert!(Topic::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Creates a topic from `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError::Empty`] if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, TopicError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TopicError::Empty);
        }
        Ok(Self(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
