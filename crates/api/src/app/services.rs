//! Pipeline wiring: queue backend, object store, workers, outbox relay.

use std::sync::Arc;

use tracing::{info, warn};

use paylake_infra::{
    FsObjectStore, InMemoryObjectStore, InMemoryOutboxStore, KeyScheme, ObjectStore,
    OutboxPublisher, OutboxStore, PublisherConfig, PublisherHandle, WorkerPool,
};
use paylake_queue::{InMemoryQueue, PaymentQueue};

#[cfg(feature = "redis")]
use paylake_infra::RedisQueue;

use crate::config::AppConfig;

/// Shared handles the HTTP handlers work against.
pub struct AppServices {
    pub queue: Arc<dyn PaymentQueue>,
    pub outbox: Arc<dyn OutboxStore>,
}

/// A wired pipeline: handler-facing services plus the background loops.
pub struct Pipeline {
    pub services: Arc<AppServices>,
    workers: WorkerPool,
    publisher: PublisherHandle,
}

impl Pipeline {
    /// Stop the outbox relay and the workers, waiting for each to finish.
    ///
    /// In-flight leases simply expire; pending outbox events stay in the
    /// store and are relayed after the next start.
    pub fn shutdown(self) {
        self.publisher.shutdown();
        self.workers.shutdown();
    }
}

/// Wire the pipeline from configuration and start its background loops.
pub fn build_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let keys = KeyScheme::new(config.prefix.as_str())?;
    let queue = build_queue(config)?;
    let store = build_store(config)?;
    let outbox: Arc<dyn OutboxStore> = InMemoryOutboxStore::arc();

    let workers = WorkerPool::spawn(
        queue.clone(),
        store,
        keys,
        config.worker_config(),
        config.workers,
    );

    // The relay feeds accepted outbox events into the same queue the
    // ingress gate writes to, so both paths drain through one consumer.
    let relay = queue.clone();
    let publisher = OutboxPublisher::new(outbox.clone(), move |event| {
        let body = serde_json::to_string(&event.payload).map_err(|e| e.to_string())?;
        relay.enqueue(body).map(|_| ()).map_err(|e| e.to_string())
    })
    .spawn(PublisherConfig::default().with_name("outbox-relay"));

    info!(
        workers = config.workers,
        bucket = %config.bucket,
        region = %config.region,
        "payment pipeline started"
    );

    Ok(Pipeline {
        services: Arc::new(AppServices { queue, outbox }),
        workers,
        publisher,
    })
}

fn build_queue(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentQueue>> {
    let queue_config = config.queue_config();

    if let Some(url) = config.queue_url.as_deref() {
        if url.starts_with("redis://") || url.starts_with("rediss://") {
            #[cfg(feature = "redis")]
            {
                let queue = RedisQueue::new(url, queue_config)?;
                info!("using redis queue backend");
                return Ok(Arc::new(queue));
            }
            #[cfg(not(feature = "redis"))]
            warn!(
                "QUEUE_URL points at redis but the redis feature is not enabled; \
                 falling back to the in-process queue"
            );
        } else {
            warn!(url, "unrecognized QUEUE_URL scheme; using the in-process queue");
        }
    }

    Ok(Arc::new(InMemoryQueue::with_config(queue_config)?))
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &config.data_dir {
        Some(dir) => {
            let root = dir.join(&config.bucket);
            let store = FsObjectStore::new(&root)?;
            info!(root = %root.display(), "using filesystem object store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATA_DIR not set; storing objects in memory (dev mode, not durable)");
            Ok(Arc::new(InMemoryObjectStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            bucket: "payments".to_string(),
            data_dir: None,
            prefix: "raw".to_string(),
            region: "us-east-1".to_string(),
            queue_url: None,
            visibility_timeout: std::time::Duration::from_secs(60),
            max_receive_count: 5,
            batch_size: 5,
            wait_time: std::time::Duration::from_millis(20),
            workers: 1,
        }
    }

    #[test]
    fn pipeline_starts_and_shuts_down_cleanly() {
        let pipeline = build_pipeline(&config()).unwrap();
        assert_eq!(pipeline.services.queue.counts().unwrap().total(), 0);
        pipeline.shutdown();
    }

    #[test]
    fn hostile_prefix_fails_before_anything_spawns() {
        let mut bad = config();
        bad.prefix = "../escape".to_string();
        assert!(build_pipeline(&bad).is_err());
    }

    #[test]
    fn unknown_queue_scheme_falls_back_to_in_process() {
        let mut config = config();
        config.queue_url = Some("kafka://broker:9092".to_string());

        let pipeline = build_pipeline(&config).unwrap();
        pipeline.services.queue.enqueue("{}".to_string()).unwrap();
        assert_eq!(pipeline.services.queue.counts().unwrap().total(), 1);
        pipeline.shutdown();
    }
}
