//! `MESSAGE_CORRELATION.CORRELATE`: synchronous, point-in-time correlation.
//!
//! The message is published for the duration of the command only:
//!
//! ```text
//! RECEIVED -> PUBLISHED -> CORRELATED | NOT_CORRELATED -> EXPIRED
//! ```
//!
//! `CORRELATED` is written, and answered to the caller, only when a message
//! start event matched; the caller then learns the key of the first process
//! instance created. Instance subscriptions are notified either way.

use super::behavior::{self, MessageData};
use super::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::record::{MessageCorrelationIntent, MessageCorrelationRecord, MessageIntent};
use crate::state::store::KeyValueStore;
use crate::subscriptions::Subscriptions;

pub(crate) fn process<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    command: MessageCorrelationRecord,
) -> Result<(), ProcessingError> {
    let message_key = ctx.next_key();
    let message = command.to_message();
    ctx.append_follow_up_event(message_key, MessageIntent::Published, message.clone())?;

    let data = MessageData {
        key: message_key,
        name: &command.name,
        correlation_key: &command.correlation_key,
        variables: &command.variables,
        tenant_id: &command.tenant_id,
    };

    let mut matches = Subscriptions::new();
    behavior::correlate_to_message_start_events(ctx, &data, &mut matches)?;
    let start_events = matches.len();
    behavior::correlate_to_subscriptions(ctx, &data, &mut matches)?;

    tracing::debug!(
        message_key = %message_key,
        name = %command.name,
        correlation_key = %command.correlation_key,
        start_events,
        subscriptions = matches.len() - start_events,
        "Correlated message"
    );

    let mut correlation = command.clone().with_message_key(message_key);
    if let Some(first) = matches.peek().filter(|first| first.is_start_event()) {
        correlation = correlation.with_process_instance_key(first.process_instance_key());
        ctx.append_follow_up_event(
            message_key,
            MessageCorrelationIntent::Correlated,
            correlation.clone(),
        )?;
        ctx.write_response(message_key, MessageCorrelationIntent::Correlated, correlation);
    } else {
        ctx.append_follow_up_event(message_key, MessageCorrelationIntent::NotCorrelated, correlation)?;
    }

    ctx.append_follow_up_event(message_key, MessageIntent::Expired, message)?;

    behavior::send_correlate_commands(ctx, &data, &matches)?;
    Ok(())
}
