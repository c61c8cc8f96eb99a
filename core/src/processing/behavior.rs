//! Matching a message against subscriptions and notifying the matches.

use super::context::ProcessingContext;
use crate::environment::StartEventTrigger;
use crate::error::ProcessingError;
use crate::key::Key;
use crate::record::{
    MessageStartEventSubscriptionRecord, ProcessMessageSubscriptionRecord, TenantId, Variables,
};
use crate::state::store::KeyValueStore;
use crate::state::subscription::MessageSubscription;
use crate::subscriptions::{CorrelatedSubscription, Subscriptions};

/// The message being correlated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MessageData<'m> {
    pub key: Key,
    pub name: &'m str,
    pub correlation_key: &'m str,
    pub variables: &'m Variables,
    pub tenant_id: &'m TenantId,
}

impl MessageData<'_> {
    fn has_correlation_key(&self) -> bool {
        !self.correlation_key.is_empty()
    }
}

/// Start events listening for the message name, one new instance per process.
///
/// A process that already received the message, in this pass or earlier, is
/// skipped.
pub(crate) fn correlate_to_message_start_events<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &MessageData<'_>,
    matches: &mut Subscriptions,
) -> Result<(), ProcessingError> {
    let candidates = ctx
        .state
        .start_event_subscriptions()
        .find_by_message_name(message.tenant_id, message.name)?;

    for subscription in candidates {
        correlate_to_start_event(ctx, message, &subscription, matches)?;
    }
    Ok(())
}

/// Trigger one start event unless its process already received the message.
pub(crate) fn correlate_to_start_event<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &MessageData<'_>,
    subscription: &MessageStartEventSubscriptionRecord,
    matches: &mut Subscriptions,
) -> Result<(), ProcessingError> {
    let process = subscription.bpmn_process_id.as_str();
    if matches.contains_process(process)
        || ctx
            .state
            .messages()
            .exist_message_correlation(message.key, process)?
    {
        tracing::trace!(message_key = %message.key, process, "Process already received message");
        return Ok(());
    }

    let trigger = StartEventTrigger {
        process_definition_key: subscription.process_definition_key,
        bpmn_process_id: subscription.bpmn_process_id.clone(),
        start_event_id: subscription.start_event_id.clone(),
        message_key: message.key,
        message_name: message.name.to_string(),
        correlation_key: message.correlation_key.to_string(),
        variables: message.variables.clone(),
        tenant_id: message.tenant_id.clone(),
    };
    let env = &mut *ctx.env;
    let started = env
        .instantiator
        .instantiate(&mut *env.key_generator, &trigger)?;

    ctx.state
        .messages_mut()
        .put_message_correlation(message.key, process)?;
    tracing::debug!(
        message_key = %message.key,
        process,
        process_instance_key = %started.process_instance_key,
        "Message triggered start event"
    );
    matches.add(CorrelatedSubscription::StartEvent {
        process_definition_key: subscription.process_definition_key,
        bpmn_process_id: subscription.bpmn_process_id.clone(),
        process_instance_key: started.process_instance_key,
        element_instance_key: started.element_instance_key,
    });
    Ok(())
}

/// Open instance subscriptions for the message name and correlation key, at
/// most one per process. Matched subscriptions become correlating.
///
/// A message without correlation key never reaches instance subscriptions.
pub(crate) fn correlate_to_subscriptions<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &MessageData<'_>,
    matches: &mut Subscriptions,
) -> Result<(), ProcessingError> {
    if !message.has_correlation_key() {
        return Ok(());
    }

    let candidates = ctx.state.subscriptions().find_subscriptions(
        message.tenant_id,
        message.name,
        message.correlation_key,
    )?;

    for subscription in candidates {
        if !subscription.is_open()
            || matches.contains_process(&subscription.record.bpmn_process_id)
            || ctx
                .state
                .messages()
                .exist_message_correlation(message.key, &subscription.record.bpmn_process_id)?
        {
            continue;
        }
        mark_correlating(ctx, message.key, &subscription)?;
        matches.add(CorrelatedSubscription::ProcessInstance {
            process_instance_key: subscription.record.process_instance_key,
            element_instance_key: subscription.record.element_instance_key,
            bpmn_process_id: subscription.record.bpmn_process_id.clone(),
        });
    }
    Ok(())
}

/// Hand `message_key` to `subscription`: it stops being eligible until the
/// process instance answers, and the process is marked as served.
pub(crate) fn mark_correlating<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message_key: Key,
    subscription: &MessageSubscription,
) -> Result<(), ProcessingError> {
    ctx.state
        .subscriptions_mut()
        .update_to_correlating(subscription, message_key)?;
    ctx.state
        .messages_mut()
        .put_message_correlation(message_key, &subscription.record.bpmn_process_id)?;
    tracing::debug!(
        message_key = %message_key,
        element_instance_key = %subscription.record.element_instance_key,
        "Subscription correlating"
    );
    Ok(())
}

/// Send a correlate command for every match. Returns `true` if all of them
/// were enqueued; a failed send never stops the others.
///
/// An instance subscription whose command could not be enqueued is released
/// again, so a later message or publish can reach it. Start event matches stay
/// correlated, their process instance already exists.
pub(crate) fn send_correlate_commands<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &MessageData<'_>,
    matches: &Subscriptions,
) -> Result<bool, ProcessingError> {
    let sender = ctx.env.command_sender.clone();
    let mut undelivered = Vec::new();
    let all_sent = matches.visit_subscriptions(|subscription| {
        let delivered = sender.correlate_process_message_subscription(ProcessMessageSubscriptionRecord {
            process_instance_key: subscription.process_instance_key(),
            element_instance_key: subscription.element_instance_key(),
            bpmn_process_id: subscription.bpmn_process_id().to_string(),
            message_name: message.name.to_string(),
            message_key: message.key,
            variables: message.variables.clone(),
            correlation_key: message.correlation_key.to_string(),
            tenant_id: message.tenant_id.clone(),
        });
        if !delivered {
            tracing::warn!(
                message_key = %message.key,
                process_instance_key = %subscription.process_instance_key(),
                element_instance_key = %subscription.element_instance_key(),
                "Failed to send correlate command"
            );
            if !subscription.is_start_event() {
                undelivered.push(subscription.clone());
            }
        }
        ctx.record_send(delivered);
        delivered
    });

    for subscription in &undelivered {
        release_correlating(ctx, message, subscription)?;
    }
    Ok(all_sent)
}

/// Reopen a subscription that was never told about `message`.
fn release_correlating<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &MessageData<'_>,
    subscription: &CorrelatedSubscription,
) -> Result<(), ProcessingError> {
    let stored = ctx
        .state
        .subscriptions()
        .get(subscription.element_instance_key(), message.name)?;
    if let Some(stored) = stored.filter(|stored| stored.correlating_message() == Some(message.key)) {
        ctx.state.subscriptions_mut().update_to_open(&stored)?;
    }
    ctx.state
        .messages_mut()
        .remove_message_correlation(message.key, subscription.bpmn_process_id())?;
    tracing::debug!(
        message_key = %message.key,
        element_instance_key = %subscription.element_instance_key(),
        "Subscription reopened after failed send"
    );
    Ok(())
}
