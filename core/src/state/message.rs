//! Buffered messages, their deadlines and correlation markers.

use super::store::{ColumnFamily, DbKey, KeyValueStore, StateError, decode, encode};
use crate::key::Key;
use crate::record::{MessageRecord, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message kept in state until its deadline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message key.
    pub key: Key,
    /// The published message.
    pub record: MessageRecord,
    /// Instant after which the message can no longer be correlated.
    pub deadline: DateTime<Utc>,
}

impl StoredMessage {
    /// Whether the message is past its deadline at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }
}

fn message_key(key: Key) -> DbKey {
    DbKey::new().long(key.get())
}

fn name_and_correlation_key(tenant_id: &TenantId, name: &str, correlation_key: &str) -> DbKey {
    DbKey::new()
        .string(tenant_id.as_str())
        .string(name)
        .string(correlation_key)
}

fn deadline_key(deadline: DateTime<Utc>, key: Key) -> DbKey {
    DbKey::new().long(deadline.timestamp_millis()).long(key.get())
}

fn correlation_marker(message: Key, bpmn_process_id: &str) -> DbKey {
    DbKey::new().long(message.get()).string(bpmn_process_id)
}

/// Read access to message state.
pub struct MessageState<'a, S: ?Sized> {
    db: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> MessageState<'a, S> {
    pub(crate) const fn new(db: &'a S) -> Self {
        Self { db }
    }

    /// Look up a message by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn get(&self, key: Key) -> Result<Option<StoredMessage>, StateError> {
        self.db
            .get(ColumnFamily::Messages, message_key(key).as_bytes())?
            .map(|bytes| decode(ColumnFamily::Messages, &bytes))
            .transpose()
    }

    /// Buffered messages with the given name and correlation key, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn find_messages(
        &self,
        tenant_id: &TenantId,
        name: &str,
        correlation_key: &str,
    ) -> Result<Vec<StoredMessage>, StateError> {
        self.resolve(&name_and_correlation_key(tenant_id, name, correlation_key))
    }

    /// Buffered messages with the given name, whatever their correlation
    /// key, in (correlation key, message key) order.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn find_messages_by_name(
        &self,
        tenant_id: &TenantId,
        name: &str,
    ) -> Result<Vec<StoredMessage>, StateError> {
        let prefix = DbKey::new().string(tenant_id.as_str()).string(name);
        self.resolve(&prefix)
    }

    fn resolve(&self, prefix: &DbKey) -> Result<Vec<StoredMessage>, StateError> {
        let mut messages = Vec::new();
        for (_, value) in self
            .db
            .scan_prefix(ColumnFamily::MessagesByNameAndCorrelationKey, prefix.as_bytes())?
        {
            let key: Key = decode(ColumnFamily::MessagesByNameAndCorrelationKey, &value)?;
            if let Some(message) = self.get(key)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Keys of messages whose deadline is at or before `now`, earliest
    /// deadline first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn messages_with_deadline_before(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Key>, StateError> {
        let bound = DbKey::new().long(now.timestamp_millis().saturating_add(1));
        self.db
            .scan_range(ColumnFamily::MessageDeadlines, &[], bound.as_bytes(), limit)?
            .iter()
            .map(|(_, value)| decode(ColumnFamily::MessageDeadlines, value))
            .collect()
    }

    /// Whether the message was already correlated to an instance of the process.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn exist_message_correlation(
        &self,
        message: Key,
        bpmn_process_id: &str,
    ) -> Result<bool, StateError> {
        Ok(self
            .db
            .get(
                ColumnFamily::MessageCorrelated,
                correlation_marker(message, bpmn_process_id).as_bytes(),
            )?
            .is_some())
    }
}

/// Write access to message state; only event appliers and the correlation
/// behavior use it.
pub struct MutableMessageState<'a, S: ?Sized> {
    db: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> MutableMessageState<'a, S> {
    pub(crate) const fn new(db: &'a mut S) -> Self {
        Self { db }
    }

    /// Read access through the same handle.
    #[must_use]
    pub fn view(&self) -> MessageState<'_, S> {
        MessageState::new(&*self.db)
    }

    /// Store a message and index it by name, correlation key and deadline.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn put(&mut self, message: &StoredMessage) -> Result<(), StateError> {
        let key_bytes = encode(ColumnFamily::Messages, &message.key)?;
        self.db.put(
            ColumnFamily::Messages,
            message_key(message.key).into_bytes(),
            encode(ColumnFamily::Messages, message)?,
        )?;
        self.db.put(
            ColumnFamily::MessageDeadlines,
            deadline_key(message.deadline, message.key).into_bytes(),
            key_bytes.clone(),
        )?;
        self.db.put(
            ColumnFamily::MessagesByNameAndCorrelationKey,
            name_and_correlation_key(
                &message.record.tenant_id,
                &message.record.name,
                &message.record.correlation_key,
            )
            .long(message.key.get())
            .into_bytes(),
            key_bytes,
        )
    }

    /// Remove a message together with its indexes and correlation markers.
    ///
    /// Removing a message that is not stored only clears its markers.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn remove(&mut self, key: Key) -> Result<(), StateError> {
        let existing = self.view().get(key)?;
        if let Some(message) = existing {
            self.db
                .delete(ColumnFamily::Messages, message_key(key).as_bytes())?;
            self.db.delete(
                ColumnFamily::MessageDeadlines,
                deadline_key(message.deadline, key).as_bytes(),
            )?;
            self.db.delete(
                ColumnFamily::MessagesByNameAndCorrelationKey,
                name_and_correlation_key(
                    &message.record.tenant_id,
                    &message.record.name,
                    &message.record.correlation_key,
                )
                .long(key.get())
                .as_bytes(),
            )?;
        }

        let markers = self
            .db
            .scan_prefix(ColumnFamily::MessageCorrelated, message_key(key).as_bytes())?;
        for (marker, _) in markers {
            self.db.delete(ColumnFamily::MessageCorrelated, &marker)?;
        }
        Ok(())
    }

    /// Remember that the message was correlated to an instance of the process.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn put_message_correlation(
        &mut self,
        message: Key,
        bpmn_process_id: &str,
    ) -> Result<(), StateError> {
        self.db.put(
            ColumnFamily::MessageCorrelated,
            correlation_marker(message, bpmn_process_id).into_bytes(),
            Vec::new(),
        )
    }

    /// Forget a correlation, allowing the message to reach the process again.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn remove_message_correlation(
        &mut self,
        message: Key,
        bpmn_process_id: &str,
    ) -> Result<(), StateError> {
        self.db.delete(
            ColumnFamily::MessageCorrelated,
            correlation_marker(message, bpmn_process_id).as_bytes(),
        )
    }
}
