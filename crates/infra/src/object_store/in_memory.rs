//! In-memory object store for tests and embedded runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::key::ObjectKey;
use super::r#trait::{ObjectStore, StoreError};

/// Failure to inject into an [`InMemoryObjectStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Unavailable,
    PermissionDenied,
}

/// In-memory [`ObjectStore`] keyed by the full object key.
///
/// Supports failure injection so consumer tests can exercise the
/// write-failed path without a real backend.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    failure: RwLock<Option<FailureMode>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent `put` fail until [`clear_failure`] is called.
    ///
    /// [`clear_failure`]: Self::clear_failure
    pub fn fail_with(&self, mode: FailureMode) {
        *self.failure.write().unwrap() = Some(mode);
    }

    pub fn clear_failure(&self) {
        *self.failure.write().unwrap() = None;
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a stored object by its full key string.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(key).cloned()
    }

    /// All stored keys, sorted, so tests can assert on partition layout.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, key: &ObjectKey, body: &[u8]) -> Result<(), StoreError> {
        if let Some(mode) = *self.failure.read().unwrap() {
            return Err(match mode {
                FailureMode::Unavailable => StoreError::unavailable("injected failure"),
                FailureMode::PermissionDenied => StoreError::permission_denied("injected failure"),
            });
        }

        self.objects
            .write()
            .unwrap()
            .insert(key.as_str().to_string(), body.to_vec());
        Ok(())
    }
}
