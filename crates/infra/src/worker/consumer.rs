//! Queue consumer that drains payments into the object store.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use paylake_core::PaymentEnvelope;
use paylake_queue::{LeasedMessage, PaymentQueue, QueueError};

use crate::object_store::{KeyScheme, ObjectKey, ObjectStore, StoreError};

/// Default number of messages leased per poll.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default long-poll window for an empty queue.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(20);
/// Default pause after a queue error before polling again.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Consumer loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Messages leased per poll.
    pub batch_size: usize,
    /// Long-poll window when the queue is empty.
    pub wait_time: Duration,
    /// Pause after a queue error before the next poll.
    pub error_backoff: Duration,
    /// Name for logging and the worker thread.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wait_time: DEFAULT_WAIT_TIME,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            name: "payment-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub leased: u64,
    pub written: u64,
    pub acked: u64,
    pub malformed: u64,
    pub store_failures: u64,
    pub ack_failures: u64,
}

/// Handle to control a running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// The worker finishes its current batch first. A poll blocked on an
    /// empty queue returns at the end of its wait window, so shutdown can
    /// take up to `wait_time`.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current consumer statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Outcome of processing a single delivery.
#[derive(Debug)]
enum ProcessOutcome {
    /// Decoded, validated, and persisted; safe to acknowledge.
    Written { key: ObjectKey },
    /// Rejected by decode or validation; never acknowledged.
    Malformed { reason: String },
    /// Persist failed; never acknowledged, the queue will redeliver.
    StoreFailed { error: StoreError },
}

/// Payment consumer: leases batches, persists each payment, acknowledges.
///
/// A message is acknowledged **only after** its object write succeeds.
/// Everything else rides the visibility timeout: malformed payloads are
/// redelivered until the queue promotes them to the dead-letter arena, and
/// store outages resolve into redelivered (possibly duplicated) writes.
pub struct Consumer<Q, S> {
    queue: Q,
    store: S,
    keys: KeyScheme,
}

impl<Q, S> Consumer<Q, S>
where
    Q: PaymentQueue,
    S: ObjectStore,
{
    pub fn new(queue: Q, store: S, keys: KeyScheme) -> Self {
        Self { queue, store, keys }
    }

    /// Run one lease/process/acknowledge cycle.
    ///
    /// Returns the number of messages leased. Exposed so tests and callers
    /// can drive the consumer synchronously instead of through [`spawn`].
    ///
    /// [`spawn`]: Consumer::spawn
    pub fn poll_once(
        &self,
        config: &WorkerConfig,
        stats: &Mutex<WorkerStats>,
    ) -> Result<usize, QueueError> {
        let batch = self.queue.lease(config.batch_size, config.wait_time)?;
        let leased = batch.len();
        if leased > 0 {
            stats.lock().unwrap().leased += leased as u64;
        }

        for message in batch {
            self.handle_delivery(config, stats, message);
        }
        Ok(leased)
    }

    fn handle_delivery(
        &self,
        config: &WorkerConfig,
        stats: &Mutex<WorkerStats>,
        message: LeasedMessage,
    ) {
        match self.process(&message) {
            ProcessOutcome::Written { key } => {
                stats.lock().unwrap().written += 1;
                debug!(
                    worker = %config.name,
                    message_id = %message.id(),
                    key = %key,
                    "payment persisted"
                );

                match self.queue.acknowledge(&message.handle) {
                    Ok(()) => stats.lock().unwrap().acked += 1,
                    Err(e) => {
                        stats.lock().unwrap().ack_failures += 1;
                        warn!(
                            worker = %config.name,
                            message_id = %message.id(),
                            error = %e,
                            "acknowledge failed; the payment will be written again on redelivery"
                        );
                    }
                }
            }
            ProcessOutcome::Malformed { reason } => {
                stats.lock().unwrap().malformed += 1;
                warn!(
                    worker = %config.name,
                    message_id = %message.id(),
                    receive_count = message.message.receive_count,
                    reason = %reason,
                    "malformed payment; leaving for redelivery"
                );
            }
            ProcessOutcome::StoreFailed { error } => {
                stats.lock().unwrap().store_failures += 1;
                if error.is_transient() {
                    warn!(
                        worker = %config.name,
                        message_id = %message.id(),
                        error = %error,
                        "object store unavailable; leaving for redelivery"
                    );
                } else {
                    error!(
                        worker = %config.name,
                        message_id = %message.id(),
                        error = %error,
                        "object write rejected; check store configuration"
                    );
                }
            }
        }
    }

    fn process(&self, message: &LeasedMessage) -> ProcessOutcome {
        let envelope = match PaymentEnvelope::parse(message.body().as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                return ProcessOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        // The stored object is the message body verbatim; the envelope is
        // only decoded to vet it and pick the partition date.
        let key = self.keys.object_key(envelope.partition_date(Utc::now()));
        match self.store.put(&key, message.body().as_bytes()) {
            Ok(()) => ProcessOutcome::Written { key },
            Err(error) => ProcessOutcome::StoreFailed { error },
        }
    }
}

impl<Q, S> Consumer<Q, S>
where
    Q: PaymentQueue + 'static,
    S: ObjectStore + 'static,
{
    /// Spawn the consumer loop in a background thread.
    pub fn spawn(self, config: WorkerConfig) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || consumer_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn payment worker thread");

        ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn consumer_loop<Q, S>(
    consumer: Consumer<Q, S>,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    Q: PaymentQueue + 'static,
    S: ObjectStore + 'static,
{
    info!(
        worker = %config.name,
        batch_size = config.batch_size,
        wait_ms = config.wait_time.as_millis() as u64,
        "payment worker started"
    );

    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if let Err(e) = consumer.poll_once(&config, &stats) {
            error!(worker = %config.name, error = %e, "queue poll failed");
            thread::sleep(config.error_backoff);
        }
    }

    let last = stats.lock().unwrap().clone();
    info!(
        worker = %config.name,
        written = last.written,
        acked = last.acked,
        malformed = last.malformed,
        "payment worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use paylake_queue::{InMemoryQueue, QueueConfig, ReceiptHandle};

    use crate::object_store::{FailureMode, InMemoryObjectStore};

    use super::*;

    fn body(payment_id: &str) -> String {
        format!(r#"{{"payment_id":"{payment_id}","amount":10.5,"ts":"2026-01-01T12:00:00Z"}}"#)
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig::default()
            .with_name("test-worker")
            .with_wait_time(Duration::ZERO)
    }

    fn consumer(
        queue: Arc<InMemoryQueue>,
        store: Arc<InMemoryObjectStore>,
    ) -> Consumer<Arc<InMemoryQueue>, Arc<InMemoryObjectStore>> {
        Consumer::new(queue, store, KeyScheme::default())
    }

    #[test]
    fn valid_payment_is_written_and_acked() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        queue.enqueue(body("p1")).unwrap();
        let leased = consumer.poll_once(&test_config(), &stats).unwrap();

        assert_eq!(leased, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(queue.counts().unwrap().total(), 0);

        let s = stats.lock().unwrap();
        assert_eq!(s.written, 1);
        assert_eq!(s.acked, 1);
        assert_eq!(s.malformed, 0);
    }

    #[test]
    fn stored_object_is_the_raw_body_verbatim() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        let payload = body("p1");
        queue.enqueue(payload.clone()).unwrap();
        consumer.poll_once(&test_config(), &stats).unwrap();

        let keys = store.keys();
        assert_eq!(store.get(&keys[0]).unwrap(), payload.as_bytes());
    }

    #[test]
    fn partition_comes_from_the_event_timestamp() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        queue.enqueue(body("p1")).unwrap();
        consumer.poll_once(&test_config(), &stats).unwrap();

        assert!(store.keys()[0].starts_with("raw/dt=2026-01-01/"));
    }

    #[test]
    fn partition_falls_back_to_processing_date_without_ts() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        let before = Utc::now().date_naive();
        queue
            .enqueue(r#"{"payment_id":"p1","amount":1.0}"#.to_string())
            .unwrap();
        consumer.poll_once(&test_config(), &stats).unwrap();
        let after = Utc::now().date_naive();

        let key = &store.keys()[0];
        assert!(
            key.starts_with(&format!("raw/dt={before}/"))
                || key.starts_with(&format!("raw/dt={after}/"))
        );
    }

    #[test]
    fn malformed_body_is_never_written_or_acked() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        queue.enqueue("not json at all".to_string()).unwrap();
        queue.enqueue(body("p2")).unwrap();
        consumer.poll_once(&test_config(), &stats).unwrap();

        assert_eq!(store.len(), 1);
        // The malformed message keeps its lease and will be redelivered.
        assert_eq!(queue.counts().unwrap().in_flight, 1);

        let s = stats.lock().unwrap();
        assert_eq!(s.malformed, 1);
        assert_eq!(s.written, 1);
        assert_eq!(s.acked, 1);
    }

    #[test]
    fn missing_payment_id_counts_as_malformed() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        queue.enqueue(r#"{"amount":5.0}"#.to_string()).unwrap();
        consumer.poll_once(&test_config(), &stats).unwrap();

        assert!(store.is_empty());
        assert_eq!(stats.lock().unwrap().malformed, 1);
    }

    #[test]
    fn store_outage_is_retried_on_redelivery() {
        let queue = Arc::new(
            InMemoryQueue::with_config(
                QueueConfig::default().with_visibility_timeout(Duration::from_millis(30)),
            )
            .unwrap(),
        );
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());
        let stats = Mutex::new(WorkerStats::default());

        queue.enqueue(body("p1")).unwrap();

        store.fail_with(FailureMode::Unavailable);
        consumer.poll_once(&test_config(), &stats).unwrap();
        assert!(store.is_empty());
        assert_eq!(queue.counts().unwrap().in_flight, 1);
        {
            let s = stats.lock().unwrap();
            assert_eq!(s.store_failures, 1);
            assert_eq!(s.acked, 0);
        }

        // Outage ends; the redelivered message is written and acked.
        store.clear_failure();
        let config = test_config().with_wait_time(Duration::from_secs(2));
        consumer.poll_once(&config, &stats).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(queue.counts().unwrap().total(), 0);
        assert_eq!(stats.lock().unwrap().acked, 1);
    }

    /// Queue wrapper that fails the first N acknowledges, simulating a crash
    /// between the object write and the ack.
    struct FlakyAckQueue {
        inner: InMemoryQueue,
        ack_failures_left: AtomicUsize,
    }

    impl PaymentQueue for FlakyAckQueue {
        fn enqueue(&self, body: String) -> Result<paylake_queue::MessageId, QueueError> {
            self.inner.enqueue(body)
        }

        fn enqueue_delayed(
            &self,
            body: String,
            delay: Duration,
        ) -> Result<paylake_queue::MessageId, QueueError> {
            self.inner.enqueue_delayed(body, delay)
        }

        fn lease(
            &self,
            max_messages: usize,
            wait: Duration,
        ) -> Result<Vec<LeasedMessage>, QueueError> {
            self.inner.lease(max_messages, wait)
        }

        fn acknowledge(&self, handle: &ReceiptHandle) -> Result<(), QueueError> {
            if self.ack_failures_left.load(Ordering::SeqCst) > 0 {
                self.ack_failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(QueueError::backend("injected acknowledge failure"));
            }
            self.inner.acknowledge(handle)
        }

        fn extend_visibility(
            &self,
            handle: &ReceiptHandle,
            visibility: Duration,
        ) -> Result<(), QueueError> {
            self.inner.extend_visibility(handle, visibility)
        }

        fn counts(&self) -> Result<paylake_queue::QueueCounts, QueueError> {
            self.inner.counts()
        }

        fn dead_letter_count(&self) -> Result<usize, QueueError> {
            self.inner.dead_letter_count()
        }

        fn list_dead_letters(
            &self,
            limit: usize,
        ) -> Result<Vec<paylake_queue::DeadLetterEntry>, QueueError> {
            self.inner.list_dead_letters(limit)
        }

        fn purge_dead_letters(&self) -> Result<usize, QueueError> {
            self.inner.purge_dead_letters()
        }
    }

    #[test]
    fn ack_failure_duplicates_the_object_instead_of_losing_it() {
        let queue = Arc::new(FlakyAckQueue {
            inner: InMemoryQueue::with_config(
                QueueConfig::default().with_visibility_timeout(Duration::from_millis(30)),
            )
            .unwrap(),
            ack_failures_left: AtomicUsize::new(1),
        });
        let store = InMemoryObjectStore::arc();
        let consumer = Consumer::new(queue.clone(), store.clone(), KeyScheme::default());
        let stats = Mutex::new(WorkerStats::default());

        let payload = body("p1");
        queue.enqueue(payload.clone()).unwrap();

        consumer.poll_once(&test_config(), &stats).unwrap();
        assert_eq!(stats.lock().unwrap().ack_failures, 1);

        let config = test_config().with_wait_time(Duration::from_secs(2));
        consumer.poll_once(&config, &stats).unwrap();

        // Two distinct objects with identical content, and an empty queue.
        assert_eq!(store.len(), 2);
        for key in store.keys() {
            assert_eq!(store.get(&key).unwrap(), payload.as_bytes());
        }
        assert_eq!(queue.counts().unwrap().total(), 0);
    }

    #[test]
    fn spawned_worker_drains_the_queue_and_shuts_down() {
        let queue = InMemoryQueue::arc();
        let store = InMemoryObjectStore::arc();
        let consumer = consumer(queue.clone(), store.clone());

        for i in 0..3 {
            queue.enqueue(body(&format!("p{i}"))).unwrap();
        }

        let handle = consumer.spawn(
            WorkerConfig::default()
                .with_name("drain-worker")
                .with_wait_time(Duration::from_millis(50)),
        );

        for _ in 0..50 {
            if store.len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(store.len(), 3);

        let stats = handle.stats();
        assert_eq!(stats.written, 3);
        assert_eq!(stats.acked, 3);

        handle.shutdown();
        assert_eq!(queue.counts().unwrap().total(), 0);
    }
}
