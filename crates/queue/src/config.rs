//! Queue configuration.

use std::time::Duration;

use crate::error::QueueError;

/// How long a leased message stays invisible before it is redelivered.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Deliveries a message gets before the queue promotes it to the dead-letter
/// arena.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

/// How long an unacknowledged message is kept before it is dropped.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(4 * 24 * 60 * 60);

/// How long dead letters are kept for triage.
pub const DEFAULT_DEAD_LETTER_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Delivery policy for a payment queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub visibility_timeout: Duration,
    pub max_receive_count: u32,
    pub retention: Duration,
    pub dead_letter_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            retention: DEFAULT_RETENTION,
            dead_letter_retention: DEFAULT_DEAD_LETTER_RETENTION,
        }
    }
}

impl QueueConfig {
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_max_receive_count(mut self, count: u32) -> Self {
        self.max_receive_count = count;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_dead_letter_retention(mut self, retention: Duration) -> Self {
        self.dead_letter_retention = retention;
        self
    }

    /// Reject configurations that would make the queue drop or wedge messages.
    ///
    /// Called by queue constructors; a failure here is a startup error, not a
    /// runtime one.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.visibility_timeout.is_zero() {
            return Err(QueueError::config("visibility_timeout must be non-zero"));
        }
        if self.max_receive_count == 0 {
            return Err(QueueError::config("max_receive_count must be at least 1"));
        }
        if self.retention.is_zero() {
            return Err(QueueError::config("retention must be non-zero"));
        }
        if self.dead_letter_retention.is_zero() {
            return Err(QueueError::config("dead_letter_retention must be non-zero"));
        }
        Ok(())
    }
}
