//! Outbox publisher loop.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::store::{OutboxError, OutboxEvent, OutboxStore};

/// Default events drained per tick.
pub const DEFAULT_PUBLISH_BATCH: usize = 10;
/// Default pause between drain ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default retry backoff after a failed publish.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Publish callback. Returning an error leaves the event pending and
/// schedules a retry.
pub type PublishFn = Box<dyn Fn(&OutboxEvent) -> Result<(), String> + Send + Sync>;

/// Publisher loop configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Events drained per tick.
    pub batch_size: usize,
    /// Pause between drain ticks.
    pub poll_interval: Duration,
    /// Retry backoff after a failed publish.
    pub retry_backoff: Duration,
    /// Name for logging and the publisher thread.
    pub name: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_PUBLISH_BATCH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            name: "outbox-publisher".to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}

/// Handle to control a running publisher.
#[derive(Debug)]
pub struct PublisherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl PublisherHandle {
    /// Request graceful shutdown and wait for the publisher to stop.
    ///
    /// Unpublished events stay pending in the store and are drained after
    /// the next start.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background outbox drainer.
///
/// Claims due events in batches and hands each to the publish callback.
/// Delivery is at-least-once: a crash after publish but before
/// `mark_published` republishes the event on the next drain.
pub struct OutboxPublisher<S> {
    store: S,
    publish: PublishFn,
}

impl<S: OutboxStore> OutboxPublisher<S> {
    pub fn new<F>(store: S, publish: F) -> Self
    where
        F: Fn(&OutboxEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            store,
            publish: Box::new(publish),
        }
    }

    /// Drain one batch of due events.
    ///
    /// Returns how many events were published. Exposed so tests and callers
    /// can drive the publisher synchronously instead of through [`spawn`].
    ///
    /// [`spawn`]: OutboxPublisher::spawn
    pub fn drain_due(&self, config: &PublisherConfig) -> Result<usize, OutboxError> {
        let batch = self.store.claim_due(config.batch_size)?;
        let mut published = 0;

        for event in batch {
            match (self.publish)(&event) {
                Ok(()) => {
                    self.store.mark_published(event.id)?;
                    published += 1;
                    debug!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        "outbox event published"
                    );
                }
                Err(e) => {
                    self.store.mark_failed(event.id, config.retry_backoff)?;
                    warn!(
                        event_id = %event.id,
                        attempts = event.attempts + 1,
                        error = %e,
                        "outbox publish failed; retry scheduled"
                    );
                }
            }
        }
        Ok(published)
    }
}

impl<S: OutboxStore + 'static> OutboxPublisher<S> {
    /// Spawn the publisher loop in a background thread.
    pub fn spawn(self, config: PublisherConfig) -> PublisherHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || publisher_loop(self, config, shutdown_rx))
            .expect("failed to spawn outbox publisher thread");

        PublisherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn publisher_loop<S: OutboxStore>(
    publisher: OutboxPublisher<S>,
    config: PublisherConfig,
    shutdown_rx: mpsc::Receiver<()>,
) {
    info!(publisher = %config.name, "outbox publisher started");

    loop {
        // Sleeps one poll interval, or wakes immediately on shutdown.
        match shutdown_rx.recv_timeout(config.poll_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if let Err(e) = publisher.drain_due(&config) {
            warn!(publisher = %config.name, error = %e, "outbox drain failed");
        }
    }

    info!(publisher = %config.name, "outbox publisher stopped");
}
