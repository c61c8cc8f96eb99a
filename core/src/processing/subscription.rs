//! `MESSAGE_SUBSCRIPTION.*`: the subscription partition's side of instance
//! subscriptions.

use super::behavior::{self, MessageData};
use super::context::ProcessingContext;
use crate::error::{ProcessingError, RejectionType};
use crate::record::{MessageSubscriptionIntent, MessageSubscriptionRecord};
use crate::state::message::StoredMessage;
use crate::state::store::KeyValueStore;
use crate::state::subscription::MessageSubscription;
use crate::subscriptions::{CorrelatedSubscription, Subscriptions};

/// `CREATE`: open a subscription and hand it the oldest buffered message it
/// has not seen yet.
pub(crate) fn create<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    if record.correlation_key.is_empty() {
        ctx.reject(
            MessageSubscriptionIntent::Create,
            RejectionType::InvalidArgument,
            format!(
                "Expected to open subscription for element with key '{}' and message name '{}', but the correlation key is empty",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    }
    if ctx
        .state
        .subscriptions()
        .exists(record.element_instance_key, &record.message_name)?
    {
        ctx.reject(
            MessageSubscriptionIntent::Create,
            RejectionType::AlreadyExists,
            format!(
                "Expected to open a new subscription for element with key '{}' and message name '{}', but there is already one",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    }

    ctx.append_follow_up_event(
        record.element_instance_key,
        MessageSubscriptionIntent::Created,
        record.clone(),
    )?;
    correlate_next_message(ctx, &record)
}

/// `CORRELATE`: the process instance consumed the message.
pub(crate) fn correlate<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let Some(subscription) = ctx
        .state
        .subscriptions()
        .get(record.element_instance_key, &record.message_name)?
    else {
        ctx.reject(
            MessageSubscriptionIntent::Correlate,
            RejectionType::NotFound,
            format!(
                "Expected to correlate subscription for element with key '{}' and message name '{}', but no such subscription was found",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    };
    if record.message_key.is_none() || subscription.correlating_message() != record.message_key {
        ctx.reject(
            MessageSubscriptionIntent::Correlate,
            RejectionType::InvalidState,
            format!(
                "Expected subscription for element with key '{}' to be correlating the message, but it is not",
                record.element_instance_key
            ),
        );
        return Ok(());
    }

    let mut correlated = subscription.record.clone();
    correlated.message_key = record.message_key;
    ctx.append_follow_up_event(
        record.element_instance_key,
        MessageSubscriptionIntent::Correlated,
        correlated,
    )?;

    if !subscription.record.interrupting {
        correlate_next_message(ctx, &subscription.record)?;
    }
    Ok(())
}

/// `REJECT`: the process instance refused the message. The message is
/// offered to the next open subscription of the same process.
pub(crate) fn reject<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let correlated = match record.message_key {
        Some(message_key) => ctx
            .state
            .messages()
            .exist_message_correlation(message_key, &record.bpmn_process_id)?,
        None => false,
    };
    let Some(message_key) = record.message_key.filter(|_| correlated) else {
        ctx.reject(
            MessageSubscriptionIntent::Reject,
            RejectionType::InvalidState,
            format!(
                "Expected message to be correlated to process '{}', but it is not",
                record.bpmn_process_id
            ),
        );
        return Ok(());
    };

    ctx.append_follow_up_event(
        record.element_instance_key,
        MessageSubscriptionIntent::Rejected,
        record.clone(),
    )?;

    let Some(message) = ctx.state.messages().get(message_key)? else {
        return Ok(());
    };
    if message.is_expired(ctx.now()) {
        return Ok(());
    }
    let next = ctx
        .state
        .subscriptions()
        .find_subscriptions(
            &message.record.tenant_id,
            &message.record.name,
            &message.record.correlation_key,
        )?
        .into_iter()
        .find(|candidate| {
            candidate.is_open() && candidate.record.bpmn_process_id == record.bpmn_process_id
        });
    if let Some(subscription) = next {
        correlate_message(ctx, &message, &subscription)?;
    }
    Ok(())
}

/// `DELETE`: close the subscription.
pub(crate) fn delete<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let Some(subscription) = ctx
        .state
        .subscriptions()
        .get(record.element_instance_key, &record.message_name)?
    else {
        ctx.reject(
            MessageSubscriptionIntent::Delete,
            RejectionType::NotFound,
            format!(
                "Expected to close subscription for element with key '{}' and message name '{}', but no such subscription was found",
                record.element_instance_key, record.message_name
            ),
        );
        return Ok(());
    };

    ctx.append_follow_up_event(
        record.element_instance_key,
        MessageSubscriptionIntent::Deleted,
        subscription.record,
    )
}

fn correlate_next_message<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: &MessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let now = ctx.now();
    let buffered = ctx.state.messages().find_messages(
        &record.tenant_id,
        &record.message_name,
        &record.correlation_key,
    )?;

    for message in buffered {
        if message.is_expired(now)
            || ctx
                .state
                .messages()
                .exist_message_correlation(message.key, &record.bpmn_process_id)?
        {
            continue;
        }
        if let Some(subscription) = ctx
            .state
            .subscriptions()
            .get(record.element_instance_key, &record.message_name)?
        {
            correlate_message(ctx, &message, &subscription)?;
        }
        break;
    }
    Ok(())
}

fn correlate_message<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: &StoredMessage,
    subscription: &MessageSubscription,
) -> Result<(), ProcessingError> {
    behavior::mark_correlating(ctx, message.key, subscription)?;

    let mut matches = Subscriptions::new();
    matches.add(CorrelatedSubscription::ProcessInstance {
        process_instance_key: subscription.record.process_instance_key,
        element_instance_key: subscription.record.element_instance_key,
        bpmn_process_id: subscription.record.bpmn_process_id.clone(),
    });
    let data = MessageData {
        key: message.key,
        name: &message.record.name,
        correlation_key: &message.record.correlation_key,
        variables: &message.record.variables,
        tenant_id: &message.record.tenant_id,
    };
    behavior::send_correlate_commands(ctx, &data, &matches)?;
    Ok(())
}
