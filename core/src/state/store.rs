//! Transactional keyed store abstraction.
//!
//! The correlation state lives in a sorted key-value store split into column
//! families. One command's writes are buffered until [`KeyValueStore::commit`];
//! reads during processing observe those pending writes, readers outside the
//! partition only ever see committed data.
//!
//! Composite keys are built with [`DbKey`] so that byte order equals the
//! logical order of their parts. Prefix scans over `(tenant, name,
//! correlation key)` therefore return entries in ascending key order, which is
//! insertion order for monotonically generated keys.

use serde::{Serialize, de::DeserializeOwned};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised by the keyed store.
///
/// All of them are fatal for the command being processed: the partition rolls
/// back and hands the error to its supervisor.
#[derive(Error, Debug)]
pub enum StateError {
    /// The underlying store cannot be reached.
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded.
    #[error("Failed to encode value for {column_family}: {reason}")]
    Encode {
        /// Column family being written.
        column_family: ColumnFamily,
        /// Codec error.
        reason: String,
    },

    /// A stored value could not be decoded.
    #[error("Failed to decode value from {column_family}: {reason}")]
    Decode {
        /// Column family being read.
        column_family: ColumnFamily,
        /// Codec error.
        reason: String,
    },
}

/// Column families of the correlation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnFamily {
    /// message key -> stored message
    Messages,
    /// (deadline, message key) -> message key
    MessageDeadlines,
    /// (tenant, name, correlation key, message key) -> message key
    MessagesByNameAndCorrelationKey,
    /// (message key, bpmn process id) -> ()
    MessageCorrelated,
    /// (tenant, name, correlation key, element instance key) -> subscription
    MessageSubscriptionByNameAndCorrelationKey,
    /// (element instance key, name) -> (tenant, correlation key)
    MessageSubscriptionByKey,
    /// (tenant, name, process definition key) -> start event subscription
    MessageStartEventSubscriptionByName,
    /// (process definition key, name) -> tenant
    MessageStartEventSubscriptionByKey,
}

impl fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sorted, transactional key-value store.
pub trait KeyValueStore: Send {
    /// Read one value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the store cannot be read.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, StateError>;

    /// Write one value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the store cannot be written.
    fn put(&mut self, cf: ColumnFamily, key: Vec<u8>, value: Vec<u8>) -> Result<(), StateError>;

    /// Delete one value; deleting a missing key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the store cannot be written.
    fn delete(&mut self, cf: ColumnFamily, key: &[u8]) -> Result<(), StateError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the store cannot be read.
    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError>;

    /// At most `limit` entries with `from <= key < to`, in ascending key
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the store cannot be read.
    fn scan_range(
        &self,
        cf: ColumnFamily,
        from: &[u8],
        to: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError>;

    /// Make the pending writes visible to readers.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Unavailable`] if the writes cannot be persisted.
    fn commit(&mut self) -> Result<(), StateError>;

    /// Discard the pending writes.
    fn rollback(&mut self);
}

/// Order-preserving composite key builder.
///
/// Strings are length-prefixed so that a key built from a subset of the
/// leading parts is a strict prefix of every longer key. Signed longs are
/// written big-endian with the sign bit flipped so byte order equals numeric
/// order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DbKey(Vec<u8>);

impl DbKey {
    /// Start an empty key.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a string part.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn string(mut self, part: &str) -> Self {
        let len = part.len().min(u32::MAX as usize) as u32;
        self.0.extend_from_slice(&len.to_be_bytes());
        self.0.extend_from_slice(part.as_bytes());
        self
    }

    /// Append a signed long part.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn long(mut self, part: i64) -> Self {
        let ordered = (part as u64) ^ (1_u64 << 63);
        self.0.extend_from_slice(&ordered.to_be_bytes());
        self
    }

    /// The encoded key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the builder.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Encode a value for storage.
pub(crate) fn encode<T: Serialize>(cf: ColumnFamily, value: &T) -> Result<Vec<u8>, StateError> {
    bincode::serialize(value).map_err(|e| StateError::Encode {
        column_family: cf,
        reason: e.to_string(),
    })
}

/// Decode a stored value.
pub(crate) fn decode<T: DeserializeOwned>(cf: ColumnFamily, bytes: &[u8]) -> Result<T, StateError> {
    bincode::deserialize(bytes).map_err(|e| StateError::Decode {
        column_family: cf,
        reason: e.to_string(),
    })
}

type Entry = (ColumnFamily, Vec<u8>);

/// In-memory store backed by a `BTreeMap`, with a pending-write overlay.
///
/// # Example
///
/// ```
/// use correlation_core::state::store::{ColumnFamily, InMemoryKeyValueStore, KeyValueStore};
///
/// let mut store = InMemoryKeyValueStore::new();
/// store.put(ColumnFamily::Messages, b"k".to_vec(), b"v".to_vec()).unwrap();
///
/// // Pending writes are visible inside the transaction ...
/// assert!(store.get(ColumnFamily::Messages, b"k").unwrap().is_some());
/// // ... but not to readers of the committed snapshot.
/// assert!(store.snapshot().get(ColumnFamily::Messages, b"k").is_none());
///
/// store.commit().unwrap();
/// assert!(store.snapshot().get(ColumnFamily::Messages, b"k").is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    committed: BTreeMap<Entry, Vec<u8>>,
    pending: BTreeMap<Entry, Option<Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed data.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.committed.clone(),
        }
    }

    /// Whether uncommitted writes exist.
    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let entry = (cf, key.to_vec());
        if let Some(pending) = self.pending.get(&entry) {
            return Ok(pending.clone());
        }
        Ok(self.committed.get(&entry).cloned())
    }

    fn put(&mut self, cf: ColumnFamily, key: Vec<u8>, value: Vec<u8>) -> Result<(), StateError> {
        self.pending.insert((cf, key), Some(value));
        Ok(())
    }

    fn delete(&mut self, cf: ColumnFamily, key: &[u8]) -> Result<(), StateError> {
        self.pending.insert((cf, key.to_vec()), None);
        Ok(())
    }

    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let start = (cf, prefix.to_vec());
        let in_range = |(family, key): &Entry| *family == cf && key.starts_with(prefix);

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .committed
            .range(start.clone()..)
            .take_while(|(entry, _)| in_range(*entry))
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect();

        for ((_, key), value) in self
            .pending
            .range(start..)
            .take_while(|(entry, _)| in_range(*entry))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                },
                None => {
                    merged.remove(key);
                },
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn scan_range(
        &self,
        cf: ColumnFamily,
        from: &[u8],
        to: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StateError> {
        let mut entries = Vec::new();
        if from >= to || limit == 0 {
            return Ok(entries);
        }
        let bounds = (cf, from.to_vec())..(cf, to.to_vec());
        let mut committed = self.committed.range(bounds.clone()).peekable();
        let mut pending = self.pending.range(bounds).peekable();

        // Walk both maps in key order; a pending write shadows the committed
        // value of the same key.
        while entries.len() < limit {
            let order = match (committed.peek(), pending.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((committed_key, _)), Some((pending_key, _))) => committed_key.cmp(pending_key),
            };
            let next = match order {
                Ordering::Less => committed.next().map(|((_, key), value)| (key, Some(value))),
                Ordering::Equal => {
                    committed.next();
                    pending.next().map(|((_, key), value)| (key, value.as_ref()))
                },
                Ordering::Greater => pending.next().map(|((_, key), value)| (key, value.as_ref())),
            };
            if let Some((key, Some(value))) = next {
                entries.push((key.clone(), value.clone()));
            }
        }
        Ok(entries)
    }

    fn commit(&mut self) -> Result<(), StateError> {
        for (entry, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(value) => {
                    self.committed.insert(entry, value);
                },
                None => {
                    self.committed.remove(&entry);
                },
            }
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending.clear();
    }
}

/// Read-only copy of committed store data, for readers outside the partition.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<Entry, Vec<u8>>,
}

impl Snapshot {
    /// Read one committed value.
    #[must_use]
    pub fn get(&self, cf: ColumnFamily, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(&(cf, key.to_vec())).map(Vec::as_slice)
    }

    /// Number of committed entries in a column family.
    #[must_use]
    pub fn count(&self, cf: ColumnFamily) -> usize {
        self.entries.keys().filter(|(family, _)| *family == cf).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rollback_discards_pending_writes() {
        let mut store = InMemoryKeyValueStore::new();
        store.put(ColumnFamily::Messages, vec![1], vec![9]).unwrap();
        store.commit().unwrap();

        store.delete(ColumnFamily::Messages, &[1]).unwrap();
        store.put(ColumnFamily::Messages, vec![2], vec![8]).unwrap();
        assert_eq!(store.get(ColumnFamily::Messages, &[1]).unwrap(), None);
        store.rollback();

        assert_eq!(store.get(ColumnFamily::Messages, &[1]).unwrap(), Some(vec![9]));
        assert_eq!(store.get(ColumnFamily::Messages, &[2]).unwrap(), None);
        assert!(!store.has_pending_writes());
    }

    #[test]
    fn scan_merges_pending_over_committed() {
        let mut store = InMemoryKeyValueStore::new();
        let prefix = DbKey::new().string("tenant").string("orderPlaced");
        let first = prefix.clone().long(1).into_bytes();
        let second = prefix.clone().long(2).into_bytes();
        let third = prefix.clone().long(3).into_bytes();

        store.put(ColumnFamily::Messages, first.clone(), vec![1]).unwrap();
        store.put(ColumnFamily::Messages, second.clone(), vec![2]).unwrap();
        store.commit().unwrap();
        store.delete(ColumnFamily::Messages, &first).unwrap();
        store.put(ColumnFamily::Messages, third.clone(), vec![3]).unwrap();
        store
            .put(ColumnFamily::MessageDeadlines, second.clone(), vec![0])
            .unwrap();

        let entries = store
            .scan_prefix(ColumnFamily::Messages, prefix.as_bytes())
            .unwrap();
        assert_eq!(entries, vec![(second, vec![2]), (third, vec![3])]);
    }

    #[test]
    fn shorter_string_is_not_confused_with_longer_prefix() {
        let mut store = InMemoryKeyValueStore::new();
        let ab = DbKey::new().string("ab").long(1).into_bytes();
        store.put(ColumnFamily::Messages, ab, vec![1]).unwrap();

        let scan = store
            .scan_prefix(ColumnFamily::Messages, DbKey::new().string("a").as_bytes())
            .unwrap();
        assert!(scan.is_empty());
    }

    #[test]
    fn range_scan_stops_at_bound_and_limit() {
        let mut store = InMemoryKeyValueStore::new();
        let key = |n: i64| DbKey::new().long(n).into_bytes();
        for n in [1, 2, 3, 5] {
            store.put(ColumnFamily::MessageDeadlines, key(n), vec![0]).unwrap();
        }
        store.put(ColumnFamily::Messages, key(0), vec![0]).unwrap();
        store.commit().unwrap();
        store.delete(ColumnFamily::MessageDeadlines, &key(2)).unwrap();
        store.put(ColumnFamily::MessageDeadlines, key(3), vec![7]).unwrap();
        store.put(ColumnFamily::MessageDeadlines, key(4), vec![4]).unwrap();

        let keys = |entries: Vec<(Vec<u8>, Vec<u8>)>| -> Vec<Vec<u8>> {
            entries.into_iter().map(|(key, _)| key).collect()
        };
        let all = store
            .scan_range(ColumnFamily::MessageDeadlines, &[], &key(5), usize::MAX)
            .unwrap();
        assert_eq!(all, vec![(key(1), vec![0]), (key(3), vec![7]), (key(4), vec![4])]);

        let first_two = store
            .scan_range(ColumnFamily::MessageDeadlines, &[], &key(6), 2)
            .unwrap();
        assert_eq!(keys(first_two), vec![key(1), key(3)]);

        assert!(store
            .scan_range(ColumnFamily::MessageDeadlines, &key(5), &key(1), 10)
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn long_encoding_preserves_order(a in any::<i64>(), b in any::<i64>()) {
            let ka = DbKey::new().long(a).into_bytes();
            let kb = DbKey::new().long(b).into_bytes();
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}
