//! Collaborators injected into the processors.
//!
//! Everything a processor needs from the outside world (time, keys, process
//! instantiation, the cross-partition transport) sits behind a trait so tests
//! can swap in deterministic versions.

use crate::error::ProcessingError;
use crate::key::{Key, KeyGenerator};
use crate::record::{TenantId, Variables};
use crate::sender::SubscriptionCommandSender;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What triggered a message start event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartEventTrigger {
    /// Definition to instantiate.
    pub process_definition_key: Key,
    /// Id of the process.
    pub bpmn_process_id: String,
    /// Start event element id.
    pub start_event_id: String,
    /// Message that triggered the start event.
    pub message_key: Key,
    /// Name of the message.
    pub message_name: String,
    /// Correlation key of the message.
    pub correlation_key: String,
    /// Variables handed to the new instance.
    pub variables: Variables,
    /// Owning tenant.
    pub tenant_id: TenantId,
}

/// Keys of an instance created by a start event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartedInstance {
    /// The new process instance.
    pub process_instance_key: Key,
    /// The start event element instance.
    pub element_instance_key: Key,
}

/// Creates process instances for triggered message start events.
pub trait ProcessInstantiator: Send {
    /// Create an instance for `trigger`, drawing its keys from `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Instantiation`] if the instance cannot be
    /// created; the whole command is then aborted.
    fn instantiate(
        &mut self,
        keys: &mut dyn KeyGenerator,
        trigger: &StartEventTrigger,
    ) -> Result<StartedInstance, ProcessingError>;
}

/// Allocates instance and element keys; element execution happens elsewhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyAllocatingInstantiator;

impl ProcessInstantiator for KeyAllocatingInstantiator {
    fn instantiate(
        &mut self,
        keys: &mut dyn KeyGenerator,
        _trigger: &StartEventTrigger,
    ) -> Result<StartedInstance, ProcessingError> {
        Ok(StartedInstance {
            process_instance_key: keys.next_key(),
            element_instance_key: keys.next_key(),
        })
    }
}

/// Dependencies of one partition's processors.
pub struct Environment {
    /// Source of entity keys for the partition.
    pub key_generator: Box<dyn KeyGenerator>,
    /// Processing time.
    pub clock: Arc<dyn Clock>,
    /// Start event instantiation.
    pub instantiator: Box<dyn ProcessInstantiator>,
    /// Cross-partition transport.
    pub command_sender: Arc<dyn SubscriptionCommandSender>,
}

impl Environment {
    /// Build an environment that instantiates processes with
    /// [`KeyAllocatingInstantiator`].
    #[must_use]
    pub fn new(
        key_generator: Box<dyn KeyGenerator>,
        clock: Arc<dyn Clock>,
        command_sender: Arc<dyn SubscriptionCommandSender>,
    ) -> Self {
        Self {
            key_generator,
            clock,
            instantiator: Box::new(KeyAllocatingInstantiator),
            command_sender,
        }
    }

    /// Replace the process instantiator.
    #[must_use]
    pub fn with_instantiator(mut self, instantiator: Box<dyn ProcessInstantiator>) -> Self {
        self.instantiator = instantiator;
        self
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
