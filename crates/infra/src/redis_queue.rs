//! Redis-backed payment queue (durable, at-least-once delivery).
//!
//! Queue state lives in a handful of keys under one namespace so several
//! processes can share the same queue:
//!
//! - `{ns}:sched` (ZSET): message id scored by the next instant it becomes
//!   deliverable. A past score is leasable now; a future score is either an
//!   initial delay or an active lease, distinguished by the `state` field on
//!   the message hash
//! - `{ns}:msg:<id>` (HASH): body, receive count, enqueue time, current
//!   handle, state. Carries the retention TTL
//! - `{ns}:handle:<handle>` (STRING): receipt handle to message id, so
//!   acknowledges avoid scans
//! - `{ns}:dlq` (LIST): serialized dead-letter entries
//!
//! Claiming is the one multi-step state change that must be atomic across
//! consumers, so it runs as a short server-side script; everything else is
//! plain commands. Schedule retention is lazy: ids whose hash TTL has expired
//! are dropped the next time a claim touches them.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use paylake_queue::{
    DeadLetterEntry, LeasedMessage, MessageId, PaymentQueue, QueueConfig, QueueCounts,
    QueueError, QueueMessage, ReceiptHandle,
};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "paylake:payments";

/// Pause between claim attempts while long-polling an empty queue.
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Atomically fetch due ids and push their scores to the new deadline, so no
/// two consumers claim the same delivery.
const CLAIM_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, id in ipairs(due) do
    redis.call('ZADD', KEYS[1], ARGV[3], id)
end
return due";

/// [`PaymentQueue`] over a shared Redis instance.
#[derive(Debug, Clone)]
pub struct RedisQueue {
    client: Arc<redis::Client>,
    namespace: String,
    config: QueueConfig,
}

impl RedisQueue {
    /// Connect to `redis_url` under the default namespace.
    ///
    /// The url is parsed eagerly but the first connection is made lazily, on
    /// the first queue operation.
    pub fn new(redis_url: impl AsRef<str>, config: QueueConfig) -> Result<Self, QueueError> {
        Self::with_namespace(redis_url, DEFAULT_NAMESPACE, config)
    }

    pub fn with_namespace(
        redis_url: impl AsRef<str>,
        namespace: impl Into<String>,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::config(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            namespace: namespace.into(),
            config,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn conn(&self) -> Result<redis::Connection, QueueError> {
        self.client
            .get_connection()
            .map_err(|e| QueueError::backend(format!("redis connection failed: {e}")))
    }

    fn sched_key(&self) -> String {
        format!("{}:sched", self.namespace)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.namespace)
    }

    fn msg_key(&self, id: MessageId) -> String {
        format!("{}:msg:{id}", self.namespace)
    }

    fn handle_key(&self, handle: &ReceiptHandle) -> String {
        format!("{}:handle:{handle}", self.namespace)
    }

    #[instrument(skip(self, body), fields(namespace = %self.namespace), err)]
    fn insert(&self, body: String, delay: Duration) -> Result<MessageId, QueueError> {
        let message = QueueMessage::new(body);
        let id = message.id;
        let available_at = message.enqueued_at
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let mut conn = self.conn()?;

        let _: u64 = redis::cmd("HSET")
            .arg(self.msg_key(id))
            .arg("body")
            .arg(&message.body)
            .arg("receive_count")
            .arg(0u32)
            .arg("enqueued_at")
            .arg(message.enqueued_at.to_rfc3339())
            .arg("state")
            .arg("queued")
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("HSET failed: {e}")))?;

        let _: u64 = redis::cmd("EXPIRE")
            .arg(self.msg_key(id))
            .arg(self.config.retention.as_secs())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("EXPIRE failed: {e}")))?;

        let _: u64 = redis::cmd("ZADD")
            .arg(self.sched_key())
            .arg(available_at.timestamp_millis())
            .arg(id.to_string())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("ZADD failed: {e}")))?;

        debug!(message_id = %id, "message enqueued");
        Ok(id)
    }

    /// One claim pass: atomically claim due ids, then turn each into a
    /// delivery or a dead-letter promotion. Promotions do not count against
    /// the batch, so the pass claims again until it either delivers
    /// something or runs out of due ids.
    fn lease_once(
        &self,
        conn: &mut redis::Connection,
        max: usize,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        loop {
            let now = Utc::now();
            let deadline = now
                + chrono::Duration::from_std(self.config.visibility_timeout)
                    .unwrap_or(chrono::Duration::MAX);

            let due: Vec<String> = redis::Script::new(CLAIM_SCRIPT)
                .key(self.sched_key())
                .arg(now.timestamp_millis())
                .arg(max)
                .arg(deadline.timestamp_millis())
                .invoke(conn)
                .map_err(|e| QueueError::backend(format!("claim script failed: {e}")))?;

            if due.is_empty() {
                return Ok(Vec::new());
            }

            let mut leased = Vec::new();
            for id_str in due {
                if let Some(message) = self.deliver_claimed(conn, &id_str, deadline)? {
                    leased.push(message);
                }
            }

            if !leased.is_empty() {
                return Ok(leased);
            }
        }
    }

    /// Turn one claimed id into a delivery, or promote it if its receive
    /// budget is spent. Returns `None` for promotions and for ids whose hash
    /// already aged out of retention.
    fn deliver_claimed(
        &self,
        conn: &mut redis::Connection,
        id_str: &str,
        deadline: DateTime<Utc>,
    ) -> Result<Option<LeasedMessage>, QueueError> {
        let id = Uuid::parse_str(id_str)
            .map(MessageId)
            .map_err(|e| QueueError::Serialization(format!("bad message id {id_str}: {e}")))?;

        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.msg_key(id))
            .query(conn)
            .map_err(|e| QueueError::backend(format!("HGETALL failed: {e}")))?;

        if fields.is_empty() {
            // Retention dropped the payload; clean the schedule entry.
            let _: u64 = redis::cmd("ZREM")
                .arg(self.sched_key())
                .arg(id_str)
                .query(conn)
                .map_err(|e| QueueError::backend(format!("ZREM failed: {e}")))?;
            warn!(message_id = %id, "dropping unacknowledged message past retention");
            return Ok(None);
        }

        let message = message_from_hash(id, &fields);
        if message.receive_count + 1 > self.config.max_receive_count {
            self.promote_to_dead_letter(conn, message)?;
            return Ok(None);
        }

        let receive_count: i64 = redis::cmd("HINCRBY")
            .arg(self.msg_key(id))
            .arg("receive_count")
            .arg(1)
            .query(conn)
            .map_err(|e| QueueError::backend(format!("HINCRBY failed: {e}")))?;

        let handle = ReceiptHandle::new();
        let _: u64 = redis::cmd("HSET")
            .arg(self.msg_key(id))
            .arg("handle")
            .arg(handle.to_string())
            .arg("state")
            .arg("leased")
            .query(conn)
            .map_err(|e| QueueError::backend(format!("HSET failed: {e}")))?;

        let _: String = redis::cmd("SET")
            .arg(self.handle_key(&handle))
            .arg(id.to_string())
            .arg("EX")
            .arg(self.config.retention.as_secs())
            .query(conn)
            .map_err(|e| QueueError::backend(format!("SET failed: {e}")))?;

        Ok(Some(LeasedMessage {
            message: QueueMessage {
                receive_count: receive_count as u32,
                ..message
            },
            handle,
            visibility_deadline: deadline,
        }))
    }

    fn promote_to_dead_letter(
        &self,
        conn: &mut redis::Connection,
        message: QueueMessage,
    ) -> Result<(), QueueError> {
        let id = message.id;
        warn!(
            message_id = %id,
            receive_count = message.receive_count,
            max_receive_count = self.config.max_receive_count,
            "receive budget spent; promoting message to dead-letter arena"
        );

        let reason = format!(
            "receive count would exceed {}",
            self.config.max_receive_count
        );
        let entry = serde_json::to_string(&DeadLetterEntry::new(message, reason))
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let _: u64 = redis::cmd("RPUSH")
            .arg(self.dlq_key())
            .arg(entry)
            .query(conn)
            .map_err(|e| QueueError::backend(format!("RPUSH failed: {e}")))?;
        let _: u64 = redis::cmd("ZREM")
            .arg(self.sched_key())
            .arg(id.to_string())
            .query(conn)
            .map_err(|e| QueueError::backend(format!("ZREM failed: {e}")))?;
        let _: u64 = redis::cmd("DEL")
            .arg(self.msg_key(id))
            .query(conn)
            .map_err(|e| QueueError::backend(format!("DEL failed: {e}")))?;

        Ok(())
    }

    /// Resolve a receipt handle to the id of the message it belongs to,
    /// checking that the handle is still the message's current one.
    fn resolve_handle(
        &self,
        conn: &mut redis::Connection,
        handle: &ReceiptHandle,
    ) -> Result<Option<MessageId>, QueueError> {
        let id_str: Option<String> = redis::cmd("GET")
            .arg(self.handle_key(handle))
            .query(conn)
            .map_err(|e| QueueError::backend(format!("GET failed: {e}")))?;

        let Some(id_str) = id_str else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&id_str)
            .map(MessageId)
            .map_err(|e| QueueError::Serialization(format!("bad message id {id_str}: {e}")))?;

        let current: Option<String> = redis::cmd("HGET")
            .arg(self.msg_key(id))
            .arg("handle")
            .query(conn)
            .map_err(|e| QueueError::backend(format!("HGET failed: {e}")))?;

        if current.as_deref() == Some(handle.to_string().as_str()) {
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    fn dead_letter_entries(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.dlq_key())
            .arg(0)
            .arg(-1)
            .query(conn)
            .map_err(|e| QueueError::backend(format!("LRANGE failed: {e}")))?;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.dead_letter_retention)
                .unwrap_or(chrono::Duration::MAX);
        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            let entry: DeadLetterEntry = serde_json::from_str(&item)
                .map_err(|e| QueueError::Serialization(e.to_string()))?;
            if entry.dead_lettered_at > cutoff {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.dead_lettered_at);
        Ok(entries)
    }
}

fn message_from_hash(id: MessageId, fields: &HashMap<String, String>) -> QueueMessage {
    QueueMessage {
        id,
        body: fields.get("body").cloned().unwrap_or_default(),
        receive_count: fields
            .get("receive_count")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        enqueued_at: fields
            .get("enqueued_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    }
}

impl PaymentQueue for RedisQueue {
    fn enqueue(&self, body: String) -> Result<MessageId, QueueError> {
        self.insert(body, Duration::ZERO)
    }

    fn enqueue_delayed(&self, body: String, delay: Duration) -> Result<MessageId, QueueError> {
        self.insert(body, delay)
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
        let mut conn = self.conn()?;
        loop {
            let leased = self.lease_once(&mut conn, max_messages)?;
            if !leased.is_empty() {
                return Ok(leased);
            }

            let remaining = poll_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            thread::sleep(remaining.min(CLAIM_POLL_INTERVAL));
        }
    }

    fn acknowledge(&self, handle: &ReceiptHandle) -> Result<(), QueueError> {
        let mut conn = self.conn()?;
        match self.resolve_handle(&mut conn, handle)? {
            Some(id) => {
                let _: u64 = redis::cmd("DEL")
                    .arg(self.msg_key(id))
                    .arg(self.handle_key(handle))
                    .query(&mut conn)
                    .map_err(|e| QueueError::backend(format!("DEL failed: {e}")))?;
                let _: u64 = redis::cmd("ZREM")
                    .arg(self.sched_key())
                    .arg(id.to_string())
                    .query(&mut conn)
                    .map_err(|e| QueueError::backend(format!("ZREM failed: {e}")))?;
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
        let mut conn = self.conn()?;
        let Some(id) = self.resolve_handle(&mut conn, handle)? else {
            return Ok(());
        };

        let now = Utc::now();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(self.sched_key())
            .arg(id.to_string())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("ZSCORE failed: {e}")))?;

        // Only an unexpired lease may be extended.
        let Some(score) = score else { return Ok(()) };
        if (score as i64) <= now.timestamp_millis() {
            return Ok(());
        }

        let deadline = now
            + chrono::Duration::from_std(visibility).unwrap_or(chrono::Duration::MAX);
        let _: u64 = redis::cmd("ZADD")
            .arg(self.sched_key())
            .arg("XX")
            .arg(deadline.timestamp_millis())
            .arg(id.to_string())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("ZADD failed: {e}")))?;
        debug!(message_id = %id, "visibility extended");
        Ok(())
    }

    fn counts(&self) -> Result<QueueCounts, QueueError> {
        let mut conn = self.conn()?;
        let now_ms = Utc::now().timestamp_millis();

        let available: u64 = redis::cmd("ZCOUNT")
            .arg(self.sched_key())
            .arg("-inf")
            .arg(now_ms)
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("ZCOUNT failed: {e}")))?;

        let future_ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.sched_key())
            .arg(format!("({now_ms}"))
            .arg("+inf")
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("ZRANGEBYSCORE failed: {e}")))?;

        let mut counts = QueueCounts {
            available: available as usize,
            ..QueueCounts::default()
        };
        for id_str in future_ids {
            let state: Option<String> = redis::cmd("HGET")
                .arg(format!("{}:msg:{id_str}", self.namespace))
                .arg("state")
                .query(&mut conn)
                .map_err(|e| QueueError::backend(format!("HGET failed: {e}")))?;
            match state.as_deref() {
                Some("leased") => counts.in_flight += 1,
                Some(_) => counts.delayed += 1,
                // Hash aged out; the schedule entry is swept on next claim.
                None => {}
            }
        }
        Ok(counts)
    }

    fn dead_letter_count(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn()?;
        Ok(self.dead_letter_entries(&mut conn)?.len())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let mut conn = self.conn()?;
        let mut entries = self.dead_letter_entries(&mut conn)?;
        entries.truncate(limit);
        Ok(entries)
    }

    fn purge_dead_letters(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn()?;
        let purged: u64 = redis::cmd("LLEN")
            .arg(self.dlq_key())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("LLEN failed: {e}")))?;
        let _: u64 = redis::cmd("DEL")
            .arg(self.dlq_key())
            .query(&mut conn)
            .map_err(|e| QueueError::backend(format!("DEL failed: {e}")))?;
        if purged > 0 {
            debug!(purged, "dead-letter arena purged");
        }
        Ok(purged as usize)
    }
}
