//! Runtime errors.

use crate::config::ConfigError;
use crate::log::LogError;
use crate::metrics::MetricsError;
use correlation_core::{PartitionId, ProcessingError};
use thiserror::Error;

/// Errors returned by the [`Engine`](crate::Engine) and its partitions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The partition's command channel is closed, usually after shutdown or
    /// a fatal failure.
    #[error("Partition {partition} is not accepting commands")]
    ChannelClosed {
        /// Target partition.
        partition: PartitionId,
    },

    /// The partition does not exist in this engine.
    #[error("Unknown partition {0}")]
    UnknownPartition(PartitionId),

    /// The partition accepted the command but dropped the reply.
    #[error("Partition {partition} stopped before replying")]
    NoReply {
        /// Target partition.
        partition: PartitionId,
    },

    /// Processing failed; the partition rolled back and stopped.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// The log rejected the events of a command.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The metrics endpoint could not be started.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// A partition task panicked or was cancelled.
    #[error("Partition {partition} task failed: {reason}")]
    PartitionFailed {
        /// Failed partition.
        partition: PartitionId,
        /// Join error.
        reason: String,
    },
}
