//! Queue message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, stable identifier of a queued message.
///
/// Assigned once at enqueue time and unchanged across redeliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque lease token.
///
/// A fresh handle is issued on every delivery of a message; acknowledging or
/// extending a lease requires the handle of the *current* delivery. Handles
/// from superseded leases are silently ignored. Random (v4) rather than
/// time-ordered since a handle is a capability, not a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(pub Uuid);

impl ReceiptHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ReceiptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message held by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    /// Serialized payment envelope. The queue treats this as opaque bytes.
    pub body: String,
    /// Number of times this message has been delivered. Owned by the queue;
    /// incremented on every lease.
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(body: String) -> Self {
        Self {
            id: MessageId::new(),
            body,
            receive_count: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// A message delivered to one consumer under a visibility lease.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    pub message: QueueMessage,
    pub handle: ReceiptHandle,
    pub visibility_deadline: DateTime<Utc>,
}

impl LeasedMessage {
    pub fn id(&self) -> MessageId {
        self.message.id
    }

    pub fn body(&self) -> &str {
        &self.message.body
    }
}

/// Queue depth broken down by message state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    /// Leasable right now.
    pub available: usize,
    /// Delivered and inside a visibility window.
    pub in_flight: usize,
    /// Enqueued with a delay that has not elapsed yet.
    pub delayed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.available + self.in_flight + self.delayed
    }
}

/// Entry in the dead-letter arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub message: QueueMessage,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(message: QueueMessage, reason: impl Into<String>) -> Self {
        Self {
            message,
            dead_lettered_at: Utc::now(),
            reason: reason.into(),
        }
    }
}
