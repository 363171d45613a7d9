//! The queue contract shared by all backends.

use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueError;
use crate::types::{DeadLetterEntry, LeasedMessage, MessageId, QueueCounts, ReceiptHandle};

/// Durable queue with visibility-timeout leasing.
///
/// ## Delivery contract
///
/// - `lease` delivers each message to at most one consumer per visibility
///   window and increments its receive count
/// - a message whose next delivery would exceed the configured receive budget
///   is moved to the dead-letter arena *instead of* being delivered; consumers
///   never dead-letter explicitly
/// - `acknowledge` is idempotent: unknown, expired, or superseded handles are
///   a no-op, never an error
///
/// Implementations must be safe to share across consumer threads; the queue
/// is the only coordination point between them.
pub trait PaymentQueue: Send + Sync {
    /// Append a serialized envelope. Durable once this returns.
    fn enqueue(&self, body: String) -> Result<MessageId, QueueError>;

    /// Append a serialized envelope that stays invisible for `delay`.
    fn enqueue_delayed(&self, body: String, delay: Duration) -> Result<MessageId, QueueError>;

    /// Lease up to `max_messages`, long-polling up to `wait` when the queue
    /// is empty. Returns fewer than `max_messages` (possibly zero) messages;
    /// each comes with a fresh [`ReceiptHandle`] and a visibility deadline.
    fn lease(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError>;

    /// Delete a message by the handle of its current delivery.
    fn acknowledge(&self, handle: &ReceiptHandle) -> Result<(), QueueError>;

    /// Push the visibility deadline of an in-flight message to now +
    /// `visibility`. No-op if the lease already expired or the handle is
    /// unknown.
    fn extend_visibility(
        &self,
        handle: &ReceiptHandle,
        visibility: Duration,
    ) -> Result<(), QueueError>;

    /// Primary queue depth by state.
    fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Number of entries in the dead-letter arena.
    fn dead_letter_count(&self) -> Result<usize, QueueError>;

    /// Oldest dead letters first, up to `limit`.
    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError>;

    /// Drop all dead letters, returning how many were removed.
    fn purge_dead_letters(&self) -> Result<usize, QueueError>;
}

impl<Q> PaymentQueue for Arc<Q>
where
    Q: PaymentQueue + ?Sized,
{
    fn enqueue(&self, body: String) -> Result<MessageId, QueueError> {
        (**self).enqueue(body)
    }

    fn enqueue_delayed(&self, body: String, delay: Duration) -> Result<MessageId, QueueError> {
        (**self).enqueue_delayed(body, delay)
    }

    fn lease(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        (**self).lease(max_messages, wait)
    }

    fn acknowledge(&self, handle: &ReceiptHandle) -> Result<(), QueueError> {
        (**self).acknowledge(handle)
    }

    fn extend_visibility(
        &self,
        handle: &ReceiptHandle,
        visibility: Duration,
    ) -> Result<(), QueueError> {
        (**self).extend_visibility(handle, visibility)
    }

    fn counts(&self) -> Result<QueueCounts, QueueError> {
        (**self).counts()
    }

    fn dead_letter_count(&self) -> Result<usize, QueueError> {
        (**self).dead_letter_count()
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        (**self).list_dead_letters(limit)
    }

    fn purge_dead_letters(&self) -> Result<usize, QueueError> {
        (**self).purge_dead_letters()
    }
}
