//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of the payment data itself
/// (malformed bodies, missing fields). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A payment body failed structural decoding (bad JSON, wrong types,
    /// unknown fields).
    #[error("malformed payment body: {0}")]
    Malformed(String),

    /// A decoded envelope failed structural validation.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
