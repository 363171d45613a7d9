//! `paylake-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the payment envelope wire type, its validation and defaulting rules, and the
//! domain error model.

pub mod envelope;
pub mod error;

pub use envelope::PaymentEnvelope;
pub use error::{DomainError, DomainResult};
