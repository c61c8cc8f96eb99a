//! Message start event subscriptions of deployed process definitions.

use super::store::{ColumnFamily, DbKey, KeyValueStore, StateError, decode, encode};
use crate::key::Key;
use crate::record::{MessageStartEventSubscriptionRecord, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct StartEventRef {
    tenant_id: TenantId,
    message_name: String,
}

fn by_name(tenant_id: &TenantId, message_name: &str) -> DbKey {
    DbKey::new().string(tenant_id.as_str()).string(message_name)
}

fn by_definition(process_definition_key: Key) -> DbKey {
    DbKey::new().long(process_definition_key.get())
}

/// Read access to start-event subscriptions.
pub struct MessageStartEventSubscriptionState<'a, S: ?Sized> {
    db: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> MessageStartEventSubscriptionState<'a, S> {
    pub(crate) const fn new(db: &'a S) -> Self {
        Self { db }
    }

    /// Start events listening for the message name, in process definition
    /// key order.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn find_by_message_name(
        &self,
        tenant_id: &TenantId,
        message_name: &str,
    ) -> Result<Vec<MessageStartEventSubscriptionRecord>, StateError> {
        let cf = ColumnFamily::MessageStartEventSubscriptionByName;
        self.db
            .scan_prefix(cf, by_name(tenant_id, message_name).as_bytes())?
            .iter()
            .map(|(_, value)| decode(cf, value))
            .collect()
    }

    /// Start events registered for a process definition.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn find_by_process_definition(
        &self,
        process_definition_key: Key,
    ) -> Result<Vec<MessageStartEventSubscriptionRecord>, StateError> {
        let mut found = Vec::new();
        for (_, value) in self.db.scan_prefix(
            ColumnFamily::MessageStartEventSubscriptionByKey,
            by_definition(process_definition_key).as_bytes(),
        )? {
            let reference: StartEventRef =
                decode(ColumnFamily::MessageStartEventSubscriptionByKey, &value)?;
            let key = by_name(&reference.tenant_id, &reference.message_name)
                .long(process_definition_key.get());
            let cf = ColumnFamily::MessageStartEventSubscriptionByName;
            if let Some(bytes) = self.db.get(cf, key.as_bytes())? {
                found.push(decode(cf, &bytes)?);
            }
        }
        Ok(found)
    }

    /// Whether the process definition listens for the message name.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn exists(&self, process_definition_key: Key, message_name: &str) -> Result<bool, StateError> {
        Ok(self
            .db
            .get(
                ColumnFamily::MessageStartEventSubscriptionByKey,
                by_definition(process_definition_key)
                    .string(message_name)
                    .as_bytes(),
            )?
            .is_some())
    }
}

/// Write access to start-event subscriptions.
pub struct MutableMessageStartEventSubscriptionState<'a, S: ?Sized> {
    db: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> MutableMessageStartEventSubscriptionState<'a, S> {
    pub(crate) const fn new(db: &'a mut S) -> Self {
        Self { db }
    }

    /// Register a start event.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn put(&mut self, record: &MessageStartEventSubscriptionRecord) -> Result<(), StateError> {
        let reference = StartEventRef {
            tenant_id: record.tenant_id.clone(),
            message_name: record.message_name.clone(),
        };
        self.db.put(
            ColumnFamily::MessageStartEventSubscriptionByName,
            by_name(&record.tenant_id, &record.message_name)
                .long(record.process_definition_key.get())
                .into_bytes(),
            encode(ColumnFamily::MessageStartEventSubscriptionByName, record)?,
        )?;
        self.db.put(
            ColumnFamily::MessageStartEventSubscriptionByKey,
            by_definition(record.process_definition_key)
                .string(&record.message_name)
                .into_bytes(),
            encode(ColumnFamily::MessageStartEventSubscriptionByKey, &reference)?,
        )
    }

    /// Unregister a start event.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn remove(&mut self, record: &MessageStartEventSubscriptionRecord) -> Result<(), StateError> {
        self.db.delete(
            ColumnFamily::MessageStartEventSubscriptionByName,
            by_name(&record.tenant_id, &record.message_name)
                .long(record.process_definition_key.get())
                .as_bytes(),
        )?;
        self.db.delete(
            ColumnFamily::MessageStartEventSubscriptionByKey,
            by_definition(record.process_definition_key)
                .string(&record.message_name)
                .as_bytes(),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::store::InMemoryKeyValueStore;

    #[test]
    fn start_events_are_listed_by_name_and_by_definition() {
        let mut db = InMemoryKeyValueStore::new();
        let mut state = MutableMessageStartEventSubscriptionState::new(&mut db);
        let newer = MessageStartEventSubscriptionRecord::new(Key::new(20), "b", "start", "orderPlaced");
        let older = MessageStartEventSubscriptionRecord::new(Key::new(10), "a", "start", "orderPlaced");
        let other = MessageStartEventSubscriptionRecord::new(Key::new(10), "a", "start2", "cancelled");
        state.put(&newer).unwrap();
        state.put(&older).unwrap();
        state.put(&other).unwrap();

        let view = MessageStartEventSubscriptionState::new(&db);
        assert_eq!(
            view.find_by_message_name(&TenantId::default(), "orderPlaced")
                .unwrap(),
            vec![older.clone(), newer]
        );
        assert_eq!(
            view.find_by_process_definition(Key::new(10)).unwrap(),
            vec![other, older]
        );
    }

    #[test]
    fn remove_unregisters_start_event() {
        let mut db = InMemoryKeyValueStore::new();
        let record = MessageStartEventSubscriptionRecord::new(Key::new(10), "a", "start", "orderPlaced");
        let mut state = MutableMessageStartEventSubscriptionState::new(&mut db);
        state.put(&record).unwrap();
        state.remove(&record).unwrap();

        let view = MessageStartEventSubscriptionState::new(&db);
        assert!(!view.exists(Key::new(10), "orderPlaced").unwrap());
        assert!(
            view.find_by_message_name(&TenantId::default(), "orderPlaced")
                .unwrap()
                .is_empty()
        );
    }
}
