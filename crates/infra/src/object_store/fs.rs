//! Filesystem-backed object store.
//!
//! Maps keys directly onto paths under a root directory, so the raw zone is
//! browsable with ordinary tools (`ls <root>/raw/dt=2026-01-01/`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use super::key::ObjectKey;
use super::r#trait::{ObjectStore, StoreError};

/// [`ObjectStore`] that writes each object to `<root>/<key>`.
///
/// Objects are written to a temporary sibling first and renamed into place,
/// so a crash mid-write never leaves a partial object under a final key.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| map_io_error(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn map_io_error(path: &Path, err: io::Error) -> StoreError {
    let msg = format!("{}: {err}", path.display());
    match err.kind() {
        io::ErrorKind::PermissionDenied => StoreError::permission_denied(msg),
        _ => StoreError::unavailable(msg),
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &ObjectKey, body: &[u8]) -> Result<(), StoreError> {
        let path = self.root.join(key.as_str());
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::invalid_key(key.as_str()))?;
        fs::create_dir_all(parent).map_err(|e| map_io_error(parent, e))?;

        // Write-then-rename keeps readers from ever seeing a partial object.
        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, body).map_err(|e| map_io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            map_io_error(&path, e)
        })?;

        debug!(key = %key, bytes = body.len(), "object written");
        Ok(())
    }
}
