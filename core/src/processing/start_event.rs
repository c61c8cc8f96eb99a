//! `MESSAGE_START_EVENT_SUBSCRIPTION.*`

use super::behavior::{self, MessageData};
use super::context::ProcessingContext;
use crate::error::{ProcessingError, RejectionType};
use crate::record::{MessageStartEventSubscriptionIntent, MessageStartEventSubscriptionRecord};
use crate::state::store::KeyValueStore;
use crate::subscriptions::Subscriptions;

/// `CREATE`: register a start event, then let buffered messages with its name
/// start instances.
pub(crate) fn create<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageStartEventSubscriptionRecord,
) -> Result<(), ProcessingError> {
    if ctx
        .state
        .start_event_subscriptions()
        .exists(record.process_definition_key, &record.message_name)?
    {
        ctx.reject(
            MessageStartEventSubscriptionIntent::Create,
            RejectionType::AlreadyExists,
            format!(
                "Expected to open a start event subscription for process definition '{}' and message '{}', but there is already one",
                record.process_definition_key, record.message_name
            ),
        );
        return Ok(());
    }

    ctx.append_follow_up_event(
        record.process_definition_key,
        MessageStartEventSubscriptionIntent::Created,
        record.clone(),
    )?;

    let now = ctx.now();
    let buffered = ctx
        .state
        .messages()
        .find_messages_by_name(&record.tenant_id, &record.message_name)?;
    for message in buffered.iter().filter(|message| !message.is_expired(now)) {
        let data = MessageData {
            key: message.key,
            name: &message.record.name,
            correlation_key: &message.record.correlation_key,
            variables: &message.record.variables,
            tenant_id: &message.record.tenant_id,
        };
        let mut matches = Subscriptions::new();
        behavior::correlate_to_start_event(ctx, &data, &record, &mut matches)?;
        behavior::send_correlate_commands(ctx, &data, &matches)?;
    }
    Ok(())
}

/// `DELETE`: unregister every start event of the process definition.
pub(crate) fn delete<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: MessageStartEventSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let registered = ctx
        .state
        .start_event_subscriptions()
        .find_by_process_definition(record.process_definition_key)?;
    if registered.is_empty() {
        ctx.reject(
            MessageStartEventSubscriptionIntent::Delete,
            RejectionType::NotFound,
            format!(
                "Expected to close the start event subscriptions of process definition '{}', but none were found",
                record.process_definition_key
            ),
        );
        return Ok(());
    }

    for subscription in registered {
        ctx.append_follow_up_event(
            subscription.process_definition_key,
            MessageStartEventSubscriptionIntent::Deleted,
            subscription,
        )?;
    }
    Ok(())
}
