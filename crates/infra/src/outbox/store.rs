//! Outbox storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// How long a claimed batch stays invisible to other publishers.
pub const CLAIM_WINDOW: Duration = Duration::from_secs(30);

/// Delivery state of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
}

/// A notification recorded for later publication.
///
/// Written in the same unit of work as the state change it describes, then
/// drained by the publisher in the background. The record survives a crash
/// between the state change and the publish, so downstream listeners may see
/// an event twice but never miss one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: OutboxStatus,
    /// Failed publish attempts so far.
    pub attempts: u32,
    /// Earliest instant the event may be (re)claimed.
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            available_at: now,
            created_at: now,
            published_at: None,
        }
    }
}

/// Outbox store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox event not found: {0}")]
    NotFound(Uuid),
    #[error("outbox event already exists: {0}")]
    AlreadyExists(Uuid),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Outbox statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OutboxStats {
    pub pending: usize,
    pub published: usize,
}

/// Outbox store abstraction.
pub trait OutboxStore: Send + Sync {
    /// Record a new pending event.
    fn append(&self, event: OutboxEvent) -> Result<Uuid, OutboxError>;

    /// Claim up to `limit` due pending events, oldest first.
    ///
    /// Claimed events are pushed [`CLAIM_WINDOW`] into the future, so a slow
    /// publisher and its replacement do not drain the same batch twice.
    fn claim_due(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError>;

    /// Mark an event as published.
    fn mark_published(&self, id: Uuid) -> Result<(), OutboxError>;

    /// Record a failed publish attempt and schedule a retry after `backoff`.
    fn mark_failed(&self, id: Uuid, backoff: Duration) -> Result<(), OutboxError>;

    /// Get outbox statistics.
    fn stats(&self) -> Result<OutboxStats, OutboxError>;
}

impl<S> OutboxStore for Arc<S>
where
    S: OutboxStore + ?Sized,
{
    fn append(&self, event: OutboxEvent) -> Result<Uuid, OutboxError> {
        (**self).append(event)
    }

    fn claim_due(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError> {
        (**self).claim_due(limit)
    }

    fn mark_published(&self, id: Uuid) -> Result<(), OutboxError> {
        (**self).mark_published(id)
    }

    fn mark_failed(&self, id: Uuid, backoff: Duration) -> Result<(), OutboxError> {
        (**self).mark_failed(id, backoff)
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        (**self).stats()
    }
}

/// In-memory outbox for tests and embedded runs.
#[derive(Debug)]
pub struct InMemoryOutboxStore {
    events: RwLock<HashMap<Uuid, OutboxEvent>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxStore for InMemoryOutboxStore {
    fn append(&self, event: OutboxEvent) -> Result<Uuid, OutboxError> {
        let mut events = self.events.write().unwrap();
        if events.contains_key(&event.id) {
            return Err(OutboxError::AlreadyExists(event.id));
        }
        let id = event.id;
        events.insert(id, event);
        Ok(id)
    }

    fn claim_due(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxError> {
        let mut events = self.events.write().unwrap();
        let now = Utc::now();

        let mut candidates: Vec<(DateTime<Utc>, Uuid)> = events
            .values()
            .filter(|e| e.status == OutboxStatus::Pending && e.available_at <= now)
            .map(|e| (e.created_at, e.id))
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let hold = chrono::Duration::from_std(CLAIM_WINDOW).unwrap_or_default();
        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(event) = events.get_mut(&id) {
                event.available_at = now + hold;
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    fn mark_published(&self, id: Uuid) -> Result<(), OutboxError> {
        let mut events = self.events.write().unwrap();
        let event = events.get_mut(&id).ok_or(OutboxError::NotFound(id))?;
        event.status = OutboxStatus::Published;
        event.published_at = Some(Utc::now());
        Ok(())
    }

    fn mark_failed(&self, id: Uuid, backoff: Duration) -> Result<(), OutboxError> {
        let mut events = self.events.write().unwrap();
        let event = events.get_mut(&id).ok_or(OutboxError::NotFound(id))?;
        event.attempts += 1;
        event.available_at = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default();
        Ok(())
    }

    fn stats(&self) -> Result<OutboxStats, OutboxError> {
        let events = self.events.read().unwrap();
        let mut stats = OutboxStats::default();
        for event in events.values() {
            match event.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Published => stats.published += 1,
            }
        }
        Ok(stats)
    }
}
