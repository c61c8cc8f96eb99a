//! `MESSAGE.PUBLISH`: buffered publish.
//!
//! The message is correlated right away and, if it has a time to live, kept
//! so that subscriptions opened later can still pick it up.

use super::behavior::{self, MessageData};
use super::context::ProcessingContext;
use crate::error::{ProcessingError, RejectionType};
use crate::record::{MessageIntent, MessageRecord};
use crate::state::store::KeyValueStore;
use crate::subscriptions::Subscriptions;

pub(crate) fn process<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    message: MessageRecord,
) -> Result<(), ProcessingError> {
    if message.name.is_empty() {
        ctx.reject(
            MessageIntent::Publish,
            RejectionType::InvalidArgument,
            "Expected message name to be non-empty",
        );
        return Ok(());
    }

    if let Some(message_id) = &message.message_id {
        let duplicate = ctx
            .state
            .messages()
            .find_messages(&message.tenant_id, &message.name, &message.correlation_key)?
            .iter()
            .any(|buffered| buffered.record.message_id.as_ref() == Some(message_id));
        if duplicate {
            ctx.reject(
                MessageIntent::Publish,
                RejectionType::AlreadyExists,
                format!(
                    "Expected to publish a new message with id '{message_id}', but a message with that id was already published"
                ),
            );
            return Ok(());
        }
    }

    let message_key = ctx.next_key();
    ctx.append_follow_up_event(message_key, MessageIntent::Published, message.clone())?;
    ctx.write_response(message_key, MessageIntent::Published, message.clone());

    let data = MessageData {
        key: message_key,
        name: &message.name,
        correlation_key: &message.correlation_key,
        variables: &message.variables,
        tenant_id: &message.tenant_id,
    };
    let mut matches = Subscriptions::new();
    behavior::correlate_to_subscriptions(ctx, &data, &mut matches)?;
    behavior::correlate_to_message_start_events(ctx, &data, &mut matches)?;
    tracing::debug!(
        message_key = %message_key,
        name = %message.name,
        correlation_key = %message.correlation_key,
        matches = matches.len(),
        "Published message"
    );
    behavior::send_correlate_commands(ctx, &data, &matches)?;

    if message.expires_immediately() {
        ctx.append_follow_up_event(message_key, MessageIntent::Expired, message)?;
    }
    Ok(())
}
