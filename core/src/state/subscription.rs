//! Process-instance message subscriptions.

use super::store::{ColumnFamily, DbKey, KeyValueStore, StateError, decode, encode};
use crate::key::Key;
use crate::record::{MessageSubscriptionRecord, TenantId};
use serde::{Deserialize, Serialize};

/// Whether a subscription can take a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Waiting for a message.
    Open,
    /// A message was handed to the process instance and is not acknowledged yet.
    Correlating {
        /// The message in flight.
        message_key: Key,
    },
}

/// A stored subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSubscription {
    /// What the element waits for.
    pub record: MessageSubscriptionRecord,
    /// Current status.
    pub status: SubscriptionStatus,
}

impl MessageSubscription {
    /// A freshly opened subscription.
    #[must_use]
    pub const fn open(record: MessageSubscriptionRecord) -> Self {
        Self {
            record,
            status: SubscriptionStatus::Open,
        }
    }

    /// Whether the subscription may be matched.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Open)
    }

    /// The message in flight, if any.
    #[must_use]
    pub const fn correlating_message(&self) -> Option<Key> {
        match self.status {
            SubscriptionStatus::Open => None,
            SubscriptionStatus::Correlating { message_key } => Some(message_key),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SubscriptionRef {
    tenant_id: TenantId,
    correlation_key: String,
}

fn by_name_and_correlation_key(tenant_id: &TenantId, name: &str, correlation_key: &str) -> DbKey {
    DbKey::new()
        .string(tenant_id.as_str())
        .string(name)
        .string(correlation_key)
}

fn primary_key(record: &MessageSubscriptionRecord) -> DbKey {
    by_name_and_correlation_key(
        &record.tenant_id,
        &record.message_name,
        &record.correlation_key,
    )
    .long(record.element_instance_key.get())
}

fn by_element(element_instance_key: Key, message_name: &str) -> DbKey {
    DbKey::new()
        .long(element_instance_key.get())
        .string(message_name)
}

/// Read access to subscription state.
pub struct MessageSubscriptionState<'a, S: ?Sized> {
    db: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> MessageSubscriptionState<'a, S> {
    pub(crate) const fn new(db: &'a S) -> Self {
        Self { db }
    }

    /// All subscriptions for a name and correlation key, in element instance
    /// key order, whatever their status.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn find_subscriptions(
        &self,
        tenant_id: &TenantId,
        message_name: &str,
        correlation_key: &str,
    ) -> Result<Vec<MessageSubscription>, StateError> {
        let cf = ColumnFamily::MessageSubscriptionByNameAndCorrelationKey;
        let prefix = by_name_and_correlation_key(tenant_id, message_name, correlation_key);
        self.db
            .scan_prefix(cf, prefix.as_bytes())?
            .iter()
            .map(|(_, value)| decode(cf, value))
            .collect()
    }

    /// The subscription of an element instance for a message name.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn get(
        &self,
        element_instance_key: Key,
        message_name: &str,
    ) -> Result<Option<MessageSubscription>, StateError> {
        let Some(bytes) = self.db.get(
            ColumnFamily::MessageSubscriptionByKey,
            by_element(element_instance_key, message_name).as_bytes(),
        )?
        else {
            return Ok(None);
        };
        let reference: SubscriptionRef = decode(ColumnFamily::MessageSubscriptionByKey, &bytes)?;
        let key = by_name_and_correlation_key(
            &reference.tenant_id,
            message_name,
            &reference.correlation_key,
        )
        .long(element_instance_key.get());

        let cf = ColumnFamily::MessageSubscriptionByNameAndCorrelationKey;
        self.db
            .get(cf, key.as_bytes())?
            .map(|bytes| decode(cf, &bytes))
            .transpose()
    }

    /// Whether the element instance already subscribed to the message name.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be read.
    pub fn exists(&self, element_instance_key: Key, message_name: &str) -> Result<bool, StateError> {
        Ok(self
            .db
            .get(
                ColumnFamily::MessageSubscriptionByKey,
                by_element(element_instance_key, message_name).as_bytes(),
            )?
            .is_some())
    }
}

/// Write access to subscription state.
pub struct MutableMessageSubscriptionState<'a, S: ?Sized> {
    db: &'a mut S,
}

impl<'a, S: KeyValueStore + ?Sized> MutableMessageSubscriptionState<'a, S> {
    pub(crate) const fn new(db: &'a mut S) -> Self {
        Self { db }
    }

    /// Read access through the same handle.
    #[must_use]
    pub fn view(&self) -> MessageSubscriptionState<'_, S> {
        MessageSubscriptionState::new(&*self.db)
    }

    /// Store or replace a subscription.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn put(&mut self, subscription: &MessageSubscription) -> Result<(), StateError> {
        let record = &subscription.record;
        let reference = SubscriptionRef {
            tenant_id: record.tenant_id.clone(),
            correlation_key: record.correlation_key.clone(),
        };
        self.db.put(
            ColumnFamily::MessageSubscriptionByNameAndCorrelationKey,
            primary_key(record).into_bytes(),
            encode(ColumnFamily::MessageSubscriptionByNameAndCorrelationKey, subscription)?,
        )?;
        self.db.put(
            ColumnFamily::MessageSubscriptionByKey,
            by_element(record.element_instance_key, &record.message_name).into_bytes(),
            encode(ColumnFamily::MessageSubscriptionByKey, &reference)?,
        )
    }

    /// Mark a subscription as having a message in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn update_to_correlating(
        &mut self,
        subscription: &MessageSubscription,
        message_key: Key,
    ) -> Result<(), StateError> {
        self.put(&MessageSubscription {
            record: subscription.record.clone(),
            status: SubscriptionStatus::Correlating { message_key },
        })
    }

    /// Make a subscription eligible for matching again.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn update_to_open(&mut self, subscription: &MessageSubscription) -> Result<(), StateError> {
        self.put(&MessageSubscription::open(subscription.record.clone()))
    }

    /// Remove a subscription; removing a missing one is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot be written.
    pub fn remove(&mut self, element_instance_key: Key, message_name: &str) -> Result<(), StateError> {
        let existing = self.view().get(element_instance_key, message_name)?;
        if let Some(subscription) = existing {
            self.db.delete(
                ColumnFamily::MessageSubscriptionByNameAndCorrelationKey,
                primary_key(&subscription.record).as_bytes(),
            )?;
            self.db.delete(
                ColumnFamily::MessageSubscriptionByKey,
                by_element(element_instance_key, message_name).as_bytes(),
            )?;
        }
        Ok(())
    }
}
