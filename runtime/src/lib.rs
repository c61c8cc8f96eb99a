//! # Correlation Runtime
//!
//! Runs the message correlation state machine as a set of partitions.
//!
//! - [`Partition`]: one Tokio task per partition, processing its commands in
//!   sequence (process, log append, commit)
//! - [`PartitionRouter`]: routes commands by correlation key or process
//!   instance key, and carries cross-partition subscription commands
//! - [`MessageTtlChecker`]: enqueues expiry of buffered messages
//! - [`Engine`]: starts everything from an [`EngineConfig`] and exposes the
//!   client-facing commands
//!
//! Observability: `tracing` spans per partition, `metrics` counters exported
//! through [`metrics::MetricsServer`].

pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod metrics;
pub mod partition;
pub mod router;
pub mod ttl;

pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use log::{EventLog, InMemoryEventLog, LogError, LoggedRecord};
pub use partition::{Partition, PartitionRequest};
pub use router::{PartitionRouter, subscription_partition};
pub use ttl::MessageTtlChecker;
