//! In-memory queue for tests, benches, and embedded deployments.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::store::PaymentQueue;
use crate::types::{
    DeadLetterEntry, LeasedMessage, MessageId, QueueCounts, QueueMessage, ReceiptHandle,
};

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug)]
struct Lease {
    handle: ReceiptHandle,
    deadline: DateTime<Utc>,
}

#[derive(Debug)]
struct MessageRecord {
    message: QueueMessage,
    /// Earliest instant the message may be delivered (enqueue time, or later
    /// for delayed enqueues).
    available_at: DateTime<Utc>,
    /// Present while some consumer holds the current delivery. A lease whose
    /// deadline has passed is treated as absent.
    lease: Option<Lease>,
}

impl MessageRecord {
    fn in_flight(&self, now: DateTime<Utc>) -> bool {
        self.lease.as_ref().is_some_and(|l| l.deadline > now)
    }

    fn leasable(&self, now: DateTime<Utc>) -> bool {
        !self.in_flight(now) && self.available_at <= now
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: HashMap<MessageId, MessageRecord>,
    dead_letters: HashMap<MessageId, DeadLetterEntry>,
}

/// In-memory [`PaymentQueue`] with the full delivery contract.
///
/// Single-process only: leases, retention, and the dead-letter arena live in
/// one mutex-guarded arena. Long-polling is condvar-based, so a blocked
/// `lease` wakes as soon as a message is enqueued or a visibility deadline
/// passes rather than sleeping the full wait.
#[derive(Debug)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
    config: QueueConfig,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::build(QueueConfig::default())
    }

    /// Create a queue with a custom delivery policy.
    pub fn with_config(config: QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn build(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
            config,
        }
    }

    fn insert(&self, body: String, delay: Duration) -> MessageId {
        let message = QueueMessage::new(body);
        let id = message.id;
        let available_at = message.enqueued_at + chrono_duration(delay);

        let mut state = self.state.lock().unwrap();
        state.records.insert(
            id,
            MessageRecord {
                message,
                available_at,
                lease: None,
            },
        );
        self.wakeup.notify_all();
        debug!(message_id = %id, delay_ms = delay.as_millis() as u64, "message enqueued");
        id
    }

    /// Drop messages past their retention window, both arenas.
    fn sweep(state: &mut QueueState, config: &QueueConfig, now: DateTime<Utc>) {
        let cutoff = now - chrono_duration(config.retention);
        state.records.retain(|id, record| {
            let keep = record.message.enqueued_at > cutoff;
            if !keep {
                warn!(
                    message_id = %id,
                    receive_count = record.message.receive_count,
                    "dropping unacknowledged message past retention"
                );
            }
            keep
        });

        let dead_cutoff = now - chrono_duration(config.dead_letter_retention);
        state.dead_letters.retain(|id, entry| {
            let keep = entry.dead_lettered_at > dead_cutoff;
            if !keep {
                debug!(message_id = %id, "dead letter aged out");
            }
            keep
        });
    }

    /// Deliver up to `max` leasable messages, oldest first. Messages whose
    /// receive budget is already spent are promoted to the dead-letter arena
    /// here instead of being delivered.
    fn lease_ready(
        state: &mut QueueState,
        config: &QueueConfig,
        max: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeasedMessage> {
        let mut candidates: Vec<(DateTime<Utc>, MessageId)> = state
            .records
            .iter()
            .filter(|(_, r)| r.leasable(now))
            .map(|(id, r)| (r.message.enqueued_at, *id))
            .collect();
        candidates.sort();

        let mut leased = Vec::new();
        for (_, id) in candidates {
            if leased.len() == max {
                break;
            }

            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };

            if record.message.receive_count + 1 > config.max_receive_count {
                if let Some(record) = state.records.remove(&id) {
                    warn!(
                        message_id = %id,
                        receive_count = record.message.receive_count,
                        max_receive_count = config.max_receive_count,
                        "receive budget spent; promoting message to dead-letter arena"
                    );
                    let reason =
                        format!("receive count would exceed {}", config.max_receive_count);
                    state
                        .dead_letters
                        .insert(id, DeadLetterEntry::new(record.message, reason));
                }
                continue;
            }

            record.message.receive_count += 1;
            let lease = Lease {
                handle: ReceiptHandle::new(),
                deadline: now + chrono_duration(config.visibility_timeout),
            };
            leased.push(LeasedMessage {
                message: record.message.clone(),
                handle: lease.handle,
                visibility_deadline: lease.deadline,
            });
            record.lease = Some(lease);
        }
        leased
    }

    /// Earliest future instant at which some message changes state (a delay
    /// elapsing or a lease expiring). Bounds how long a long-poll may sleep.
    fn next_transition(state: &QueueState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut next: Option<DateTime<Utc>> = None;
        for record in state.records.values() {
            let instants = [
                Some(record.available_at),
                record.lease.as_ref().map(|l| l.deadline),
            ];
            for at in instants.into_iter().flatten() {
                if at > now && next.is_none_or(|n| at < n) {
                    next = Some(at);
                }
            }
        }
        next
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentQueue for InMemoryQueue {
    fn enqueue(&self, body: String) -> Result<MessageId, QueueError> {
        Ok(self.insert(body, Duration::ZERO))
    }

    fn enqueue_delayed(&self, body: String, delay: Duration) -> Result<MessageId, QueueError> {
        Ok(self.insert(body, delay))
    }

    fn lease(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }

        let poll_deadline = Instant::now() + wait;
        let mut state = self.state.lock().unwrap();
        loop {
            let now = Utc::now();
            Self::sweep(&mut state, &self.config, now);

            let leased = Self::lease_ready(&mut state, &self.config, max_messages, now);
            if !leased.is_empty() {
                return Ok(leased);
            }

            let remaining = poll_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            // Sleep until woken by an enqueue, the next timed state change,
            // or the end of the poll window, whichever comes first.
            let nap = match Self::next_transition(&state, now) {
                Some(at) => remaining
                    .min((at - now).to_std().unwrap_or(Duration::ZERO))
                    .max(Duration::from_millis(1)),
                None => remaining,
            };
            let (guard, _) = self.wakeup.wait_timeout(state, nap).unwrap();
            state = guard;
        }
    }

    fn acknowledge(&self, handle: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        // The current delivery's handle wins even if its deadline has passed,
        // as long as the message has not been re-leased in the meantime.
        let found = state
            .records
            .iter()
            .find(|(_, r)| r.lease.as_ref().is_some_and(|l| l.handle == *handle))
            .map(|(id, _)| *id);

        match found {
            Some(id) => {
                state.records.remove(&id);
                debug!(message_id = %id, "message acknowledged and deleted");
            }
            None => {
                debug!(handle = %handle, "acknowledge for unknown or superseded handle; ignoring");
            }
        }
        Ok(())
    }

    fn extend_visibility(
        &self,
        handle: &ReceiptHandle,
        visibility: Duration,
    ) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let record = state.records.values_mut().find(|r| {
            r.lease
                .as_ref()
                .is_some_and(|l| l.handle == *handle && l.deadline > now)
        });

        if let Some(record) = record {
            let deadline = now + chrono_duration(visibility);
            if let Some(lease) = record.lease.as_mut() {
                lease.deadline = deadline;
            }
            debug!(message_id = %record.message.id, "visibility extended");
        }
        self.wakeup.notify_all();
        Ok(())
    }

    fn counts(&self) -> Result<QueueCounts, QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        Self::sweep(&mut state, &self.config, now);

        let mut counts = QueueCounts::default();
        for record in state.records.values() {
            if record.in_flight(now) {
                counts.in_flight += 1;
            } else if record.available_at > now {
                counts.delayed += 1;
            } else {
                counts.available += 1;
            }
        }
        Ok(counts)
    }

    fn dead_letter_count(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        Self::sweep(&mut state, &self.config, now);
        Ok(state.dead_letters.len())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        Self::sweep(&mut state, &self.config, now);

        let mut entries: Vec<DeadLetterEntry> = state.dead_letters.values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn purge_dead_letters(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        Self::sweep(&mut state, &self.config, now);

        let purged = state.dead_letters.len();
        state.dead_letters.clear();
        if purged > 0 {
            debug!(purged, "dead-letter arena purged");
        }
        Ok(purged)
    }
}
