//! Durable payment queue with at-least-once delivery.
//!
//! ## Design
//!
//! - Producers append serialized payment envelopes; the queue never inspects
//!   bodies
//! - Consumers lease batches; a leased message is invisible to other
//!   consumers until its visibility deadline passes
//! - Delivery is at-least-once: an unacknowledged lease expires and the
//!   message is delivered again with an incremented receive count
//! - Poison messages are promoted to a dead-letter arena by the queue itself,
//!   at lease time, once the receive budget is spent
//! - Unacknowledged messages age out after a retention window; dead letters
//!   keep a longer one
//!
//! ## Components
//!
//! - [`PaymentQueue`]: the queue contract shared by all backends
//! - [`InMemoryQueue`]: reference implementation for tests and embedded use
//! - [`QueueConfig`]: visibility timeout, receive budget, retention windows

pub mod config;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use config::QueueConfig;
pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use store::PaymentQueue;
pub use types::{
    DeadLetterEntry, LeasedMessage, MessageId, QueueCounts, QueueMessage, ReceiptHandle,
};
