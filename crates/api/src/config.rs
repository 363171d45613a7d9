//! Environment-driven configuration for the pipeline process.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use paylake_infra::DEFAULT_PREFIX;
use paylake_infra::worker::{DEFAULT_BATCH_SIZE, DEFAULT_WAIT_TIME};
use paylake_infra::WorkerConfig;
use paylake_queue::config::{DEFAULT_MAX_RECEIVE_COUNT, DEFAULT_VISIBILITY_TIMEOUT};
use paylake_queue::QueueConfig;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Default region identifier.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Default number of consumer workers.
pub const DEFAULT_WORKERS: usize = 1;

/// Configuration error. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP bind address (`BIND_ADDR`).
    pub bind_addr: String,
    /// Logical bucket objects are written under (`BUCKET`, required).
    pub bucket: String,
    /// Filesystem root for the object store (`DATA_DIR`); in-memory when unset.
    pub data_dir: Option<PathBuf>,
    /// Key prefix inside the bucket (`PREFIX`).
    pub prefix: String,
    /// Region the remote backends live in (`REGION`); local backends ignore it.
    pub region: String,
    /// Queue backend URL (`QUEUE_URL`); in-process queue when unset.
    pub queue_url: Option<String>,
    /// Lease duration before redelivery (`VISIBILITY_TIMEOUT_SECS`).
    pub visibility_timeout: Duration,
    /// Deliveries a message gets before dead-lettering (`MAX_RECEIVE_COUNT`).
    pub max_receive_count: u32,
    /// Messages leased per worker poll (`BATCH_SIZE`).
    pub batch_size: usize,
    /// Long-poll window for an empty queue (`WAIT_TIME_SECS`).
    pub wait_time: Duration,
    /// Consumer threads draining the queue (`WORKERS`).
    pub workers: usize,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`.
    ///
    /// Empty and whitespace-only values count as unset and fall back to
    /// their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bucket = get(&lookup, "BUCKET").ok_or(ConfigError::Missing("BUCKET"))?;

        let batch_size: usize = parse_var(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }
        let workers: usize = parse_var(&lookup, "WORKERS", DEFAULT_WORKERS)?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKERS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr: get(&lookup, "BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            bucket,
            data_dir: get(&lookup, "DATA_DIR").map(PathBuf::from),
            prefix: get(&lookup, "PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            region: get(&lookup, "REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            queue_url: get(&lookup, "QUEUE_URL"),
            visibility_timeout: Duration::from_secs(parse_var(
                &lookup,
                "VISIBILITY_TIMEOUT_SECS",
                DEFAULT_VISIBILITY_TIMEOUT.as_secs(),
            )?),
            max_receive_count: parse_var(&lookup, "MAX_RECEIVE_COUNT", DEFAULT_MAX_RECEIVE_COUNT)?,
            batch_size,
            wait_time: Duration::from_secs(parse_var(
                &lookup,
                "WAIT_TIME_SECS",
                DEFAULT_WAIT_TIME.as_secs(),
            )?),
            workers,
        })
    }

    /// Delivery policy handed to the queue backend.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::default()
            .with_visibility_timeout(self.visibility_timeout)
            .with_max_receive_count(self.max_receive_count)
    }

    /// Poll policy handed to the consumer workers.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_batch_size(self.batch_size)
            .with_wait_time(self.wait_time)
    }
}

fn get(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: Vec<(&'static str, &'static str)>) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn bucket_alone_is_enough() {
        let config = AppConfig::from_vars(vars(vec![("BUCKET", "payments")])).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.bucket, "payments");
        assert_eq!(config.data_dir, None);
        assert_eq!(config.prefix, "raw");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.queue_url, None);
        assert_eq!(config.visibility_timeout, Duration::from_secs(60));
        assert_eq!(config.max_receive_count, 5);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.wait_time, Duration::from_secs(20));
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn missing_bucket_is_fatal() {
        let err = AppConfig::from_vars(vars(vec![])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BUCKET")));
    }

    #[test]
    fn every_knob_can_be_overridden() {
        let config = AppConfig::from_vars(vars(vec![
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("BUCKET", "lake"),
            ("DATA_DIR", "/var/lib/paylake"),
            ("PREFIX", "ingest"),
            ("REGION", "eu-central-1"),
            ("QUEUE_URL", "redis://localhost:6379"),
            ("VISIBILITY_TIMEOUT_SECS", "90"),
            ("MAX_RECEIVE_COUNT", "3"),
            ("BATCH_SIZE", "10"),
            ("WAIT_TIME_SECS", "5"),
            ("WORKERS", "4"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.bucket, "lake");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/paylake")));
        assert_eq!(config.prefix, "ingest");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.queue_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(config.visibility_timeout, Duration::from_secs(90));
        assert_eq!(config.max_receive_count, 3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.wait_time, Duration::from_secs(5));
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_vars(vars(vec![
            ("BUCKET", "payments"),
            ("PREFIX", ""),
            ("REGION", "  "),
            ("WAIT_TIME_SECS", "   "),
            ("QUEUE_URL", ""),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "raw");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.wait_time, Duration::from_secs(20));
        assert_eq!(config.queue_url, None);
    }

    #[test]
    fn blank_bucket_counts_as_missing() {
        let err = AppConfig::from_vars(vars(vec![("BUCKET", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BUCKET")));
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        let err = AppConfig::from_vars(vars(vec![("BUCKET", "payments"), ("WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "WORKERS", .. }));
    }

    #[test]
    fn zero_workers_and_zero_batch_are_rejected() {
        let err = AppConfig::from_vars(vars(vec![("BUCKET", "payments"), ("WORKERS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "WORKERS", .. }));

        let err = AppConfig::from_vars(vars(vec![("BUCKET", "payments"), ("BATCH_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "BATCH_SIZE", .. }
        ));
    }

    #[test]
    fn derived_policies_carry_the_overrides() {
        let config = AppConfig::from_vars(vars(vec![
            ("BUCKET", "payments"),
            ("VISIBILITY_TIMEOUT_SECS", "30"),
            ("MAX_RECEIVE_COUNT", "2"),
            ("BATCH_SIZE", "7"),
            ("WAIT_TIME_SECS", "1"),
        ]))
        .unwrap();

        let queue = config.queue_config();
        assert_eq!(queue.visibility_timeout, Duration::from_secs(30));
        assert_eq!(queue.max_receive_count, 2);

        let worker = config.worker_config();
        assert_eq!(worker.batch_size, 7);
        assert_eq!(worker.wait_time, Duration::from_secs(1));
    }
}
