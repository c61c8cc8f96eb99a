//! Correlation state of one partition.
//!
//! [`EngineState`] owns the keyed store and hands out views over it. The
//! read-only views (`messages()`, `subscriptions()`, ...) are what processors
//! consult; the mutable ones are reserved for event appliers and the
//! correlation behavior.

pub mod message;
pub mod start_event;
pub mod store;
pub mod subscription;

use message::{MessageState, MutableMessageState};
use start_event::{MessageStartEventSubscriptionState, MutableMessageStartEventSubscriptionState};
use store::{InMemoryKeyValueStore, KeyValueStore, StateError};
use subscription::{MessageSubscriptionState, MutableMessageSubscriptionState};

/// State of one partition on top of a keyed store.
#[derive(Debug, Default)]
pub struct EngineState<S = InMemoryKeyValueStore> {
    db: S,
}

impl<S: KeyValueStore> EngineState<S> {
    /// Wrap a store.
    #[must_use]
    pub const fn new(db: S) -> Self {
        Self { db }
    }

    /// Buffered messages.
    #[must_use]
    pub const fn messages(&self) -> MessageState<'_, S> {
        MessageState::new(&self.db)
    }

    /// Buffered messages, writable.
    pub const fn messages_mut(&mut self) -> MutableMessageState<'_, S> {
        MutableMessageState::new(&mut self.db)
    }

    /// Process-instance subscriptions.
    #[must_use]
    pub const fn subscriptions(&self) -> MessageSubscriptionState<'_, S> {
        MessageSubscriptionState::new(&self.db)
    }

    /// Process-instance subscriptions, writable.
    pub const fn subscriptions_mut(&mut self) -> MutableMessageSubscriptionState<'_, S> {
        MutableMessageSubscriptionState::new(&mut self.db)
    }

    /// Message start event subscriptions.
    #[must_use]
    pub const fn start_event_subscriptions(&self) -> MessageStartEventSubscriptionState<'_, S> {
        MessageStartEventSubscriptionState::new(&self.db)
    }

    /// Message start event subscriptions, writable.
    pub const fn start_event_subscriptions_mut(
        &mut self,
    ) -> MutableMessageStartEventSubscriptionState<'_, S> {
        MutableMessageStartEventSubscriptionState::new(&mut self.db)
    }

    /// Make the writes of the current command visible.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] if the store cannot persist the writes.
    pub fn commit(&mut self) -> Result<(), StateError> {
        self.db.commit()
    }

    /// Discard the writes of the current command.
    pub fn rollback(&mut self) {
        self.db.rollback();
    }

    /// The underlying store.
    #[must_use]
    pub const fn db(&self) -> &S {
        &self.db
    }
}
