//! Queue error model.

/// Queue operation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("invalid queue configuration: {0}")]
    Config(String),
    #[error("queue backend unavailable: {0}")]
    Backend(String),
    #[error("queue serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the caller may retry the operation as-is.
    ///
    /// Configuration errors are programmer errors and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
