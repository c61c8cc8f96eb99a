//! Engine configuration.
//!
//! # Example
//!
//! ```
//! use correlation_runtime::config::EngineConfig;
//! use std::time::Duration;
//!
//! let config = EngineConfig::default()
//!     .with_partition_count(3)
//!     .with_ttl_check_interval(Duration::from_millis(500));
//!
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// An environment variable holds a value that cannot be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// A JSON document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime settings of an engine node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of partitions, numbered from 1.
    pub partition_count: u16,
    /// Capacity of each partition's command channel.
    pub command_channel_capacity: usize,
    /// How often buffered messages are checked for expiry.
    #[serde(rename = "ttl_check_interval_ms", with = "duration_ms")]
    pub ttl_check_interval: Duration,
    /// Upper bound of messages expired by one expiry command.
    pub ttl_check_batch_limit: usize,
    /// Where the Prometheus endpoint listens; disabled when `None`.
    pub metrics_addr: Option<SocketAddr>,
}

impl EngineConfig {
    /// Highest partition count keys can encode.
    pub const MAX_PARTITIONS: u16 = 4095;

    /// Set the number of partitions
    #[must_use]
    pub const fn with_partition_count(mut self, count: u16) -> Self {
        self.partition_count = count;
        self
    }

    /// Set the command channel capacity
    #[must_use]
    pub const fn with_command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    /// Set the expiry check interval
    #[must_use]
    pub const fn with_ttl_check_interval(mut self, interval: Duration) -> Self {
        self.ttl_check_interval = interval;
        self
    }

    /// Set the expiry batch limit
    #[must_use]
    pub const fn with_ttl_check_batch_limit(mut self, limit: usize) -> Self {
        self.ttl_check_batch_limit = limit;
        self
    }

    /// Enable the Prometheus endpoint
    #[must_use]
    pub const fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    /// Load defaults overridden by `CORRELATION_*` environment variables:
    /// `CORRELATION_PARTITION_COUNT`, `CORRELATION_COMMAND_CHANNEL_CAPACITY`,
    /// `CORRELATION_TTL_CHECK_INTERVAL_MS`, `CORRELATION_TTL_CHECK_BATCH_LIMIT`
    /// and `CORRELATION_METRICS_ADDR`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be parsed or is invalid
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar { var, value })
        }

        let mut config = Self::default();
        if let Some(value) = lookup("CORRELATION_PARTITION_COUNT") {
            config.partition_count = parse("CORRELATION_PARTITION_COUNT", value)?;
        }
        if let Some(value) = lookup("CORRELATION_COMMAND_CHANNEL_CAPACITY") {
            config.command_channel_capacity = parse("CORRELATION_COMMAND_CHANNEL_CAPACITY", value)?;
        }
        if let Some(value) = lookup("CORRELATION_TTL_CHECK_INTERVAL_MS") {
            config.ttl_check_interval =
                Duration::from_millis(parse("CORRELATION_TTL_CHECK_INTERVAL_MS", value)?);
        }
        if let Some(value) = lookup("CORRELATION_TTL_CHECK_BATCH_LIMIT") {
            config.ttl_check_batch_limit = parse("CORRELATION_TTL_CHECK_BATCH_LIMIT", value)?;
        }
        if let Some(value) = lookup("CORRELATION_METRICS_ADDR") {
            config.metrics_addr = Some(parse("CORRELATION_METRICS_ADDR", value)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any setting is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 || self.partition_count > Self::MAX_PARTITIONS {
            return Err(ConfigError::Validation(format!(
                "partition_count must be between 1 and {}",
                Self::MAX_PARTITIONS
            )));
        }
        if self.command_channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "command_channel_capacity must be positive".to_string(),
            ));
        }
        if self.ttl_check_interval.is_zero() {
            return Err(ConfigError::Validation(
                "ttl_check_interval must be positive".to_string(),
            ));
        }
        if self.ttl_check_batch_limit == 0 {
            return Err(ConfigError::Validation(
                "ttl_check_batch_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_count: 1,
            command_channel_capacity: 1024,
            ttl_check_interval: Duration::from_secs(1),
            ttl_check_batch_limit: 100,
            metrics_addr: None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
