//! Command processing.
//!
//! [`MessageProcessors::process`] runs one command against the partition
//! state. It applies the state changes of every follow-up event as the event
//! is appended, but never commits: the caller commits when it has accepted the
//! [`ProcessingResult`], or rolls back on error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use correlation_core::environment::{Environment, SystemClock};
//! use correlation_core::key::{PartitionId, PartitionKeyGenerator};
//! use correlation_core::processing::{Command, MessageProcessors};
//! use correlation_core::record::{MessageCorrelationIntent, MessageCorrelationRecord};
//! use correlation_core::sender::UnroutableCommandSender;
//! use correlation_core::state::EngineState;
//!
//! let mut state: EngineState = EngineState::default();
//! let mut env = Environment::new(
//!     Box::new(PartitionKeyGenerator::new(PartitionId::new(1))),
//!     Arc::new(SystemClock),
//!     Arc::new(UnroutableCommandSender),
//! );
//!
//! let result = MessageProcessors::process(
//!     Command::Correlate(MessageCorrelationRecord::new("orderPlaced", "order-42")),
//!     &mut state,
//!     &mut env,
//! )
//! .unwrap();
//!
//! assert_eq!(result.events.len(), 3);
//! assert_eq!(result.events[1].intent, MessageCorrelationIntent::NotCorrelated.into());
//! state.commit().unwrap();
//! ```

pub mod appliers;
mod behavior;
mod context;
mod correlate;
mod expire;
mod process_subscription;
mod publish;
mod start_event;
mod subscription;

pub use context::{ProcessingResult, SendStats};

use crate::environment::Environment;
use crate::error::ProcessingError;
use crate::record::{
    Intent, MessageCorrelationIntent, MessageCorrelationRecord, MessageIntent, MessageRecord,
    MessageStartEventSubscriptionIntent, MessageStartEventSubscriptionRecord,
    MessageSubscriptionIntent, MessageSubscriptionRecord, ProcessMessageSubscriptionIntent,
    ProcessMessageSubscriptionRecord,
};
use crate::state::EngineState;
use crate::state::store::KeyValueStore;
use context::ProcessingContext;
use serde::{Deserialize, Serialize};

/// A command addressed to one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `MESSAGE.PUBLISH`
    Publish(MessageRecord),
    /// `MESSAGE_CORRELATION.CORRELATE`
    Correlate(MessageCorrelationRecord),
    /// `MESSAGE.EXPIRE`, for at most `limit` messages.
    ExpireMessages {
        /// Upper bound of messages expired by this command.
        limit: usize,
    },
    /// `MESSAGE_SUBSCRIPTION.CREATE`
    CreateSubscription(MessageSubscriptionRecord),
    /// `MESSAGE_SUBSCRIPTION.CORRELATE`
    CorrelateSubscription(MessageSubscriptionRecord),
    /// `MESSAGE_SUBSCRIPTION.REJECT`
    RejectSubscription(MessageSubscriptionRecord),
    /// `MESSAGE_SUBSCRIPTION.DELETE`
    DeleteSubscription(MessageSubscriptionRecord),
    /// `MESSAGE_START_EVENT_SUBSCRIPTION.CREATE`
    CreateStartEventSubscription(MessageStartEventSubscriptionRecord),
    /// `MESSAGE_START_EVENT_SUBSCRIPTION.DELETE`, for every start event of
    /// the record's process definition.
    DeleteStartEventSubscriptions(MessageStartEventSubscriptionRecord),
    /// `PROCESS_MESSAGE_SUBSCRIPTION.CORRELATE`
    CorrelateProcessSubscription(ProcessMessageSubscriptionRecord),
}

impl Command {
    /// Intent of the command.
    #[must_use]
    pub const fn intent(&self) -> Intent {
        match self {
            Self::Publish(_) => Intent::Message(MessageIntent::Publish),
            Self::Correlate(_) => Intent::MessageCorrelation(MessageCorrelationIntent::Correlate),
            Self::ExpireMessages { .. } => Intent::Message(MessageIntent::Expire),
            Self::CreateSubscription(_) => {
                Intent::MessageSubscription(MessageSubscriptionIntent::Create)
            },
            Self::CorrelateSubscription(_) => {
                Intent::MessageSubscription(MessageSubscriptionIntent::Correlate)
            },
            Self::RejectSubscription(_) => {
                Intent::MessageSubscription(MessageSubscriptionIntent::Reject)
            },
            Self::DeleteSubscription(_) => {
                Intent::MessageSubscription(MessageSubscriptionIntent::Delete)
            },
            Self::CreateStartEventSubscription(_) => {
                Intent::MessageStartEventSubscription(MessageStartEventSubscriptionIntent::Create)
            },
            Self::DeleteStartEventSubscriptions(_) => {
                Intent::MessageStartEventSubscription(MessageStartEventSubscriptionIntent::Delete)
            },
            Self::CorrelateProcessSubscription(_) => {
                Intent::ProcessMessageSubscription(ProcessMessageSubscriptionIntent::Correlate)
            },
        }
    }
}

/// Entry point for every message-related command.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageProcessors;

impl MessageProcessors {
    /// Process one command. Writes are applied to `state` but not committed.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessingError`] if state cannot be read or written or a
    /// collaborator fails. The caller must roll back `state` in that case.
    #[tracing::instrument(level = "trace", skip_all, fields(intent = %command.intent()))]
    pub fn process<S: KeyValueStore>(
        command: Command,
        state: &mut EngineState<S>,
        env: &mut Environment,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mut ctx = ProcessingContext::new(state, env);
        match command {
            Command::Publish(message) => publish::process(&mut ctx, message)?,
            Command::Correlate(correlation) => correlate::process(&mut ctx, correlation)?,
            Command::ExpireMessages { limit } => expire::process(&mut ctx, limit)?,
            Command::CreateSubscription(record) => subscription::create(&mut ctx, record)?,
            Command::CorrelateSubscription(record) => subscription::correlate(&mut ctx, record)?,
            Command::RejectSubscription(record) => subscription::reject(&mut ctx, record)?,
            Command::DeleteSubscription(record) => subscription::delete(&mut ctx, record)?,
            Command::CreateStartEventSubscription(record) => start_event::create(&mut ctx, record)?,
            Command::DeleteStartEventSubscriptions(record) => start_event::delete(&mut ctx, record)?,
            Command::CorrelateProcessSubscription(record) => {
                process_subscription::correlate(&mut ctx, record)?;
            },
        }
        Ok(ctx.finish())
    }
}
