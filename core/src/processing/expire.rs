//! `MESSAGE.EXPIRE`: drop buffered messages whose deadline passed.

use super::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::record::MessageIntent;
use crate::state::store::KeyValueStore;

pub(crate) fn process<S: KeyValueStore>(
    ctx: &mut ProcessingContext<'_, S>,
    limit: usize,
) -> Result<(), ProcessingError> {
    let now = ctx.now();
    let expired = ctx.state.messages().messages_with_deadline_before(now, limit)?;

    for key in expired {
        let Some(message) = ctx.state.messages().get(key)? else {
            continue;
        };
        ctx.append_follow_up_event(key, MessageIntent::Expired, message.record)?;
    }
    Ok(())
}
