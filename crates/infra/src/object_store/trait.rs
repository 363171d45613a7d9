use std::sync::Arc;

use thiserror::Error;

use super::key::ObjectKey;

/// Object store operation error.
///
/// These are **infrastructure errors** (backend reachability, permissions,
/// key hygiene) as opposed to domain errors (malformed or invalid payments).
///
/// ## Retry Semantics
///
/// - `Unavailable` is transient: the same write may succeed later, so
///   consumers leave the message unacknowledged and rely on redelivery
/// - `PermissionDenied` and `InvalidKey` are deployment problems; retrying
///   cannot fix them, but the message still rides redelivery so it survives
///   in the queue (and eventually the dead-letter arena) until an operator
///   intervenes
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("object store permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Whether a later attempt at the same write could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Write-once sink for raw payment objects.
///
/// ## Design Principles
///
/// - **No storage assumptions**: in-memory for tests, a filesystem tree for
///   single-node runs, with remote object storage slotting in behind the same
///   trait
/// - **Persist-before-acknowledge**: callers write first and acknowledge the
///   queue only afterwards; the store never participates in queue bookkeeping
/// - **One object per attempt**: keys carry a fresh uuid, so a redelivered
///   payment lands as a second object instead of overwriting the first
///
/// ## Write Semantics
///
/// `put()` is atomic per object: readers never observe a partially written
/// object under a final key. Writing the same key twice overwrites; since
/// keys are minted fresh per attempt this only happens when a caller reuses
/// a key deliberately.
pub trait ObjectStore: Send + Sync {
    /// Persist one object under the given key.
    fn put(&self, key: &ObjectKey, body: &[u8]) -> Result<(), StoreError>;
}

impl<S> ObjectStore for Arc<S>
where
    S: ObjectStore + ?Sized,
{
    fn put(&self, key: &ObjectKey, body: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, body)
    }
}
