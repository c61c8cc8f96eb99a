//! State changes carried by events.
//!
//! Every event that changes state is applied here and only here, so replaying
//! the log rebuilds the same state that processing produced.

use crate::record::{
    Intent, MessageIntent, MessageStartEventSubscriptionIntent, MessageSubscriptionIntent, Record,
    RecordValue,
};
use crate::state::EngineState;
use crate::state::message::StoredMessage;
use crate::state::store::{KeyValueStore, StateError};
use crate::state::subscription::MessageSubscription;

/// Apply one event to state. Events without state changes are ignored.
///
/// # Errors
///
/// Returns a [`StateError`] if the store cannot be read or written.
pub fn apply<S: KeyValueStore>(state: &mut EngineState<S>, event: &Record) -> Result<(), StateError> {
    match (event.intent, &event.value) {
        (Intent::Message(MessageIntent::Published), RecordValue::Message(message)) => {
            if !message.expires_immediately() {
                state.messages_mut().put(&StoredMessage {
                    key: event.key,
                    record: message.clone(),
                    deadline: message.deadline(event.timestamp),
                })?;
            }
        },
        (Intent::Message(MessageIntent::Expired), _) => {
            state.messages_mut().remove(event.key)?;
        },
        (
            Intent::MessageSubscription(intent),
            RecordValue::MessageSubscription(subscription),
        ) => match intent {
            MessageSubscriptionIntent::Created => {
                state
                    .subscriptions_mut()
                    .put(&MessageSubscription::open(subscription.clone()))?;
            },
            MessageSubscriptionIntent::Correlated => {
                let stored = state
                    .subscriptions()
                    .get(subscription.element_instance_key, &subscription.message_name)?;
                match stored {
                    Some(stored) if !stored.record.interrupting => {
                        state.subscriptions_mut().update_to_open(&stored)?;
                    },
                    Some(_) => {
                        state.subscriptions_mut().remove(
                            subscription.element_instance_key,
                            &subscription.message_name,
                        )?;
                    },
                    None => {},
                }
            },
            MessageSubscriptionIntent::Rejected => {
                if let Some(message_key) = subscription.message_key {
                    state
                        .messages_mut()
                        .remove_message_correlation(message_key, &subscription.bpmn_process_id)?;
                }
            },
            MessageSubscriptionIntent::Deleted => {
                state
                    .subscriptions_mut()
                    .remove(subscription.element_instance_key, &subscription.message_name)?;
            },
            _ => {},
        },
        (
            Intent::MessageStartEventSubscription(intent),
            RecordValue::MessageStartEventSubscription(subscription),
        ) => match intent {
            MessageStartEventSubscriptionIntent::Created => {
                state.start_event_subscriptions_mut().put(subscription)?;
            },
            MessageStartEventSubscriptionIntent::Deleted => {
                state.start_event_subscriptions_mut().remove(subscription)?;
            },
            _ => {},
        },
        _ => {},
    }
    Ok(())
}
