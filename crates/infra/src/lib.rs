//! Infrastructure layer: object storage, queue consumers, outbox relay.

pub mod object_store;
pub mod outbox;
#[cfg(feature = "redis")]
pub mod redis_queue;
pub mod worker;


pub use object_store::{
    DEFAULT_PREFIX, FailureMode, FsObjectStore, InMemoryObjectStore, KeyScheme, ObjectKey,
    ObjectStore, StoreError,
};
pub use outbox::{
    InMemoryOutboxStore, OutboxError, OutboxEvent, OutboxPublisher, OutboxStats, OutboxStatus,
    OutboxStore, PublisherConfig, PublisherHandle,
};
#[cfg(feature = "redis")]
pub use redis_queue::RedisQueue;
pub use worker::{Consumer, ConsumerHandle, WorkerConfig, WorkerPool, WorkerStats};
