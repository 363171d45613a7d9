//! Raw-zone object store boundary.
//!
//! Validated payments are persisted here as immutable JSON objects, one per
//! delivery attempt, partitioned by date for downstream batch readers.

pub mod fs;
pub mod in_memory;
pub mod key;
pub mod r#trait;

pub use fs::FsObjectStore;
pub use in_memory::{FailureMode, InMemoryObjectStore};
pub use key::{DEFAULT_PREFIX, KeyScheme, ObjectKey};
pub use r#trait::{ObjectStore, StoreError};
