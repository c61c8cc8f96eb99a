//! `PROCESS_MESSAGE_SUBSCRIPTION.CORRELATE`: the process partition receives
//! a correlated message and acknowledges it to the subscription partition.

use super::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::record::{ProcessMessageSubscriptionIntent, ProcessMessageSubscriptionRecord};
use crate::state::store::KeyValueStore;

pub(crate) fn correlate<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    record: ProcessMessageSubscriptionRecord,
) -> Result<(), ProcessingError> {
    let acknowledgment = record.to_acknowledgment();
    ctx.append_follow_up_event(
        record.element_instance_key,
        ProcessMessageSubscriptionIntent::Correlated,
        record,
    )?;

    let sender = ctx.env.command_sender.clone();
    let delivered = sender.correlate_message_subscription(acknowledgment);
    if !delivered {
        tracing::warn!("Failed to acknowledge message correlation to subscription partition");
    }
    ctx.record_send(delivered);
    Ok(())
}
