//! Per-command processing context.

use super::appliers;
use crate::environment::Environment;
use crate::error::{ProcessingError, Rejection, RejectionType};
use crate::key::Key;
use crate::record::{Intent, Record, RecordValue};
use crate::state::EngineState;
use crate::state::store::KeyValueStore;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;

/// Outcome of the cross-partition sends of one command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendStats {
    /// Commands handed to the sender.
    pub attempted: usize,
    /// Commands the sender could not enqueue.
    pub failed: usize,
}

/// Everything one command produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    /// Follow-up events, in append order. Their state changes are applied
    /// but not committed.
    pub events: SmallVec<[Record; 4]>,
    /// The response for the caller of the command, if any.
    pub response: Option<Record>,
    /// Set if the command was refused; `events` is then empty.
    pub rejection: Option<Rejection>,
    /// Cross-partition sends.
    pub sends: SendStats,
}

impl ProcessingResult {
    /// Intents of the events, in order.
    #[must_use]
    pub fn intents(&self) -> Vec<Intent> {
        self.events.iter().map(|event| event.intent).collect()
    }
}

/// State, collaborators and output buffers for one command.
pub struct ProcessingContext<'a, S: KeyValueStore> {
    pub(crate) state: &'a mut EngineState<S>,
    pub(crate) env: &'a mut Environment,
    now: DateTime<Utc>,
    result: ProcessingResult,
}

impl<'a, S: KeyValueStore> ProcessingContext<'a, S> {
    pub(crate) fn new(state: &'a mut EngineState<S>, env: &'a mut Environment) -> Self {
        let now = env.clock.now();
        Self {
            state,
            env,
            now,
            result: ProcessingResult::default(),
        }
    }

    /// Processing time of the command.
    pub(crate) const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub(crate) fn next_key(&mut self) -> Key {
        self.env.key_generator.next_key()
    }

    /// Apply an event to state and append it to the batch.
    pub(crate) fn append_follow_up_event(
        &mut self,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) -> Result<(), ProcessingError> {
        let event = Record::event(key, intent.into(), value.into(), self.now);
        appliers::apply(self.state, &event)?;
        self.result.events.push(event);
        Ok(())
    }

    /// Answer the caller with an event; the event itself is not appended.
    pub(crate) fn write_response(
        &mut self,
        key: Key,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) {
        self.result.response = Some(Record::event(key, intent.into(), value.into(), self.now));
    }

    pub(crate) fn reject(
        &mut self,
        intent: impl Into<Intent>,
        rejection_type: RejectionType,
        reason: impl Into<String>,
    ) {
        let rejection = Rejection::new(intent.into(), rejection_type, reason);
        tracing::debug!(%rejection, "Command rejected");
        self.result.rejection = Some(rejection);
    }

    pub(crate) fn record_send(&mut self, delivered: bool) {
        self.result.sends.attempted += 1;
        if !delivered {
            self.result.sends.failed += 1;
        }
    }

    pub(crate) fn finish(self) -> ProcessingResult {
        self.result
    }
}
