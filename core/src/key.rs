//! Record keys and partition identifiers.
//!
//! Every entity produced by a partition (messages, process instances, element
//! instances, subscriptions) is identified by a [`Key`]. The partition that
//! generated a key is encoded in its upper bits, which is what lets the
//! runtime route a command to the partition owning a process instance without
//! any lookup table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of low bits holding the per-partition counter.
pub const KEY_BITS: u32 = 51;

const COUNTER_MASK: i64 = (1_i64 << KEY_BITS) - 1;

/// Identifier of an independently sequenced partition.
///
/// Partition ids start at 1; 0 is never assigned to a running partition.
/// Ids above 4095 do not fit the key encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(u16);

impl PartitionId {
    /// Create a partition id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// The raw partition number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique, monotonically increasing identifier of a record.
///
/// # Examples
///
/// ```
/// use correlation_core::key::{Key, PartitionId};
///
/// let key = Key::encode(PartitionId::new(3), 42);
/// assert_eq!(key.partition_id(), PartitionId::new(3));
/// assert_eq!(key.counter(), 42);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(i64);

impl Key {
    /// Wrap a raw key value.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Build a key from a partition id and a counter value.
    #[must_use]
    pub const fn encode(partition: PartitionId, counter: i64) -> Self {
        Self(((partition.0 as i64) << KEY_BITS) | (counter & COUNTER_MASK))
    }

    /// The raw key value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The partition that generated this key.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn partition_id(self) -> PartitionId {
        PartitionId((self.0 >> KEY_BITS) as u16)
    }

    /// The counter part of the key.
    #[must_use]
    pub const fn counter(self) -> i64 {
        self.0 & COUNTER_MASK
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Key {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Source of fresh record keys.
///
/// Implementations must never hand out the same key twice within a partition.
pub trait KeyGenerator: Send {
    /// Allocate the next key.
    fn next_key(&mut self) -> Key;
}

/// Key generator encoding its partition id into every key.
#[derive(Debug, Clone)]
pub struct PartitionKeyGenerator {
    partition: PartitionId,
    next: i64,
}

impl PartitionKeyGenerator {
    /// Start generating keys for `partition` from counter 1.
    #[must_use]
    pub const fn new(partition: PartitionId) -> Self {
        Self { partition, next: 1 }
    }

    /// Resume generation after `last` (e.g. after recovering state).
    #[must_use]
    pub const fn resume_after(partition: PartitionId, last: Key) -> Self {
        Self {
            partition,
            next: last.counter().saturating_add(1),
        }
    }

    /// The partition keys are generated for.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }
}

impl KeyGenerator for PartitionKeyGenerator {
    fn next_key(&mut self) -> Key {
        let key = Key::encode(self.partition, self.next);
        self.next = self.next.saturating_add(1);
        key
    }
}
