//! Raw-zone key layout.

use chrono::NaiveDate;
use uuid::Uuid;

use super::r#trait::StoreError;

/// Default top-level prefix for the raw zone.
pub const DEFAULT_PREFIX: &str = "raw";

/// Fully formed object key, e.g. `raw/dt=2026-01-01/<uuid>.json`.
///
/// Keys are only minted through a [`KeyScheme`], so a key in hand is always
/// well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key layout for the raw zone: `<prefix>/dt=YYYY-MM-DD/<uuid v4>.json`.
///
/// The date segment partitions objects for downstream batch readers. The
/// uuid is minted fresh per write, so redeliveries of the same payment land
/// as distinct objects instead of overwriting each other.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    /// Build a scheme under `prefix`.
    ///
    /// The prefix must be non-empty, carry no whitespace, and contain no
    /// empty or `..` path segments. Validated once at startup so `put` never
    /// sees a hostile key.
    pub fn new(prefix: impl Into<String>) -> Result<Self, StoreError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(StoreError::invalid_key("prefix must not be empty"));
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(StoreError::invalid_key(format!(
                "prefix {prefix:?} must not contain whitespace"
            )));
        }
        if prefix.split('/').any(|segment| segment.is_empty()) {
            return Err(StoreError::invalid_key(format!(
                "prefix {prefix:?} must not contain empty path segments"
            )));
        }
        if prefix.split('/').any(|segment| segment == "..") {
            return Err(StoreError::invalid_key(format!(
                "prefix {prefix:?} must not traverse upwards"
            )));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mint a key for one stored payment under the given partition date.
    pub fn object_key(&self, date: NaiveDate) -> ObjectKey {
        ObjectKey(format!("{}/dt={}/{}.json", self.prefix, date, Uuid::new_v4()))
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}
