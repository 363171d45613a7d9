//! Background consumers that move payments from the queue to the raw zone.

pub mod consumer;
pub mod pool;

pub use consumer::{
    Consumer, ConsumerHandle, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_BACKOFF, DEFAULT_WAIT_TIME,
    WorkerConfig, WorkerStats,
};
pub use pool::WorkerPool;
