//! Append-only event log.
//!
//! Partitions append the follow-up events of each command as one batch before
//! committing state. Events are stored as [`SerializedEvent`]s with the
//! partition and key kept in the metadata.

use correlation_core::PartitionId;
use correlation_core::event::{Event, EventError, SerializedEvent};
use correlation_core::record::Record;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised by an [`EventLog`].
#[derive(Error, Debug)]
pub enum LogError {
    /// The log's lock was poisoned by a panicking writer.
    #[error("Event log lock poisoned")]
    Poisoned,

    /// An event could not be encoded or decoded.
    #[error(transparent)]
    Event(#[from] EventError),

    /// The log storage rejected the write.
    #[error("Event log unavailable: {0}")]
    Unavailable(String),
}

/// Durable sink of the events a partition writes.
pub trait EventLog: Send + Sync {
    /// Append a batch of events for one partition.
    ///
    /// Returns the position of the last appended entry, or the current end of
    /// the log for an empty batch.
    ///
    /// # Errors
    ///
    /// Returns error if the batch cannot be written. Nothing of the batch is
    /// written in that case.
    fn append(&self, partition: PartitionId, events: &[Record]) -> Result<u64, LogError>;
}

/// One log entry.
#[derive(Clone, Debug)]
pub struct LoggedRecord {
    /// Position in the log, starting at 1.
    pub position: u64,
    /// Partition that wrote the entry.
    pub partition: PartitionId,
    /// The encoded event.
    pub event: SerializedEvent,
}

impl LoggedRecord {
    /// Decode the stored event.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes do not decode to a [`Record`].
    pub fn record(&self) -> Result<Record, EventError> {
        Record::from_bytes(&self.event.data)
    }
}

/// In-memory log shared by all partitions of an engine.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventLog {
    entries: Arc<Mutex<Vec<LoggedRecord>>>,
}

impl InMemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, in log order.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn entries(&self) -> Result<Vec<LoggedRecord>, LogError> {
        Ok(self.entries.lock().map_err(|_| LogError::Poisoned)?.clone())
    }

    /// Decoded events written by one partition, in log order.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned or an entry fails to decode.
    pub fn read(&self, partition: PartitionId) -> Result<Vec<Record>, LogError> {
        let entries = self.entries.lock().map_err(|_| LogError::Poisoned)?;
        entries
            .iter()
            .filter(|entry| entry.partition == partition)
            .map(|entry| entry.record().map_err(LogError::from))
            .collect()
    }

    /// Number of entries.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, LogError> {
        Ok(self.entries.lock().map_err(|_| LogError::Poisoned)?.len())
    }

    /// Whether the log is empty.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, LogError> {
        self.len().map(|len| len == 0)
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, partition: PartitionId, events: &[Record]) -> Result<u64, LogError> {
        let serialized = events
            .iter()
            .map(|event| {
                let metadata = serde_json::json!({
                    "partition": partition.get(),
                    "key": event.key.get(),
                });
                SerializedEvent::from_event(event, Some(metadata))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = self.entries.lock().map_err(|_| LogError::Poisoned)?;
        let mut position = entries.len() as u64;
        for event in serialized {
            position += 1;
            entries.push(LoggedRecord {
                position,
                partition,
                event,
            });
        }
        Ok(position)
    }
}
