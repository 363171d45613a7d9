//! Transactional outbox for payment producers.
//!
//! A producer appends an event record in its own unit of work; a background
//! publisher later relays pending records downstream, retrying with backoff.
//! Acceptance and delivery stay decoupled, so a downstream outage never turns
//! into a rejected request.

pub mod publisher;
pub mod store;

pub use publisher::{
    DEFAULT_POLL_INTERVAL, DEFAULT_PUBLISH_BATCH, DEFAULT_RETRY_BACKOFF, OutboxPublisher,
    PublishFn, PublisherConfig, PublisherHandle,
};
pub use store::{
    CLAIM_WINDOW, InMemoryOutboxStore, OutboxError, OutboxEvent, OutboxStats, OutboxStatus,
    OutboxStore,
};
