//! Command and event payloads exchanged by the correlation engine.
//!
//! Every record appended to the log is a [`Record`]: a key, a [`RecordType`],
//! an [`Intent`] and a [`RecordValue`]. Values are plain owned data. A value is
//! built once per command, refined through `with_*` methods while the command
//! is processed, and never mutated after it has been appended.

use crate::event::Event;
use crate::key::Key;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant id used when the caller does not supply one.
pub const DEFAULT_TENANT: &str = "<default>";

/// Tenant a record belongs to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The tenant id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self(DEFAULT_TENANT.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque variable payload carried by a message.
///
/// The engine never looks inside; it only copies the bytes into the records
/// and commands it emits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables(Vec<u8>);

impl Variables {
    /// Wrap a serialized variable document.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// An empty payload.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// The raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the payload carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Variables {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Variables {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Kind of record in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    /// A request to change state.
    Command,
    /// A fact that changed state.
    Event,
    /// A command that was refused without changing state.
    CommandRejection,
}

/// Intents of `MESSAGE` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageIntent {
    /// Command: publish a buffered message.
    Publish,
    /// Event: the message exists.
    Published,
    /// Command: expire messages whose deadline passed.
    Expire,
    /// Event: the message is gone.
    Expired,
}

/// Intents of `MESSAGE_CORRELATION` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageCorrelationIntent {
    /// Command: correlate a message synchronously.
    Correlate,
    /// Event: a message start event was triggered.
    Correlated,
    /// Event: no message start event matched.
    NotCorrelated,
}

/// Intents of `MESSAGE_SUBSCRIPTION` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSubscriptionIntent {
    /// Command: open a subscription.
    Create,
    /// Event: subscription opened.
    Created,
    /// Command: acknowledgment that the process instance consumed the message.
    Correlate,
    /// Event: correlation acknowledged.
    Correlated,
    /// Command: the process instance refused the message.
    Reject,
    /// Event: the subscription is open again.
    Rejected,
    /// Command: close the subscription.
    Delete,
    /// Event: subscription closed.
    Deleted,
}

/// Intents of `MESSAGE_START_EVENT_SUBSCRIPTION` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStartEventSubscriptionIntent {
    /// Command: register a start event.
    Create,
    /// Event: start event registered.
    Created,
    /// Command: unregister the start events of a process definition.
    Delete,
    /// Event: start event unregistered.
    Deleted,
}

/// Intents of `PROCESS_MESSAGE_SUBSCRIPTION` records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessMessageSubscriptionIntent {
    /// Command: deliver a correlated message to a process instance.
    Correlate,
    /// Event: the process instance received the message.
    Correlated,
}

/// Any intent, tagged with its value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// `MESSAGE.*`
    Message(MessageIntent),
    /// `MESSAGE_CORRELATION.*`
    MessageCorrelation(MessageCorrelationIntent),
    /// `MESSAGE_SUBSCRIPTION.*`
    MessageSubscription(MessageSubscriptionIntent),
    /// `MESSAGE_START_EVENT_SUBSCRIPTION.*`
    MessageStartEventSubscription(MessageStartEventSubscriptionIntent),
    /// `PROCESS_MESSAGE_SUBSCRIPTION.*`
    ProcessMessageSubscription(ProcessMessageSubscriptionIntent),
}

impl Intent {
    /// Stable `VALUE_TYPE.INTENT` name, used as the logged event type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Message(intent) => match intent {
                MessageIntent::Publish => "MESSAGE.PUBLISH",
                MessageIntent::Published => "MESSAGE.PUBLISHED",
                MessageIntent::Expire => "MESSAGE.EXPIRE",
                MessageIntent::Expired => "MESSAGE.EXPIRED",
            },
            Self::MessageCorrelation(intent) => match intent {
                MessageCorrelationIntent::Correlate => "MESSAGE_CORRELATION.CORRELATE",
                MessageCorrelationIntent::Correlated => "MESSAGE_CORRELATION.CORRELATED",
                MessageCorrelationIntent::NotCorrelated => "MESSAGE_CORRELATION.NOT_CORRELATED",
            },
            Self::MessageSubscription(intent) => match intent {
                MessageSubscriptionIntent::Create => "MESSAGE_SUBSCRIPTION.CREATE",
                MessageSubscriptionIntent::Created => "MESSAGE_SUBSCRIPTION.CREATED",
                MessageSubscriptionIntent::Correlate => "MESSAGE_SUBSCRIPTION.CORRELATE",
                MessageSubscriptionIntent::Correlated => "MESSAGE_SUBSCRIPTION.CORRELATED",
                MessageSubscriptionIntent::Reject => "MESSAGE_SUBSCRIPTION.REJECT",
                MessageSubscriptionIntent::Rejected => "MESSAGE_SUBSCRIPTION.REJECTED",
                MessageSubscriptionIntent::Delete => "MESSAGE_SUBSCRIPTION.DELETE",
                MessageSubscriptionIntent::Deleted => "MESSAGE_SUBSCRIPTION.DELETED",
            },
            Self::MessageStartEventSubscription(intent) => match intent {
                MessageStartEventSubscriptionIntent::Create => {
                    "MESSAGE_START_EVENT_SUBSCRIPTION.CREATE"
                },
                MessageStartEventSubscriptionIntent::Created => {
                    "MESSAGE_START_EVENT_SUBSCRIPTION.CREATED"
                },
                MessageStartEventSubscriptionIntent::Delete => {
                    "MESSAGE_START_EVENT_SUBSCRIPTION.DELETE"
                },
                MessageStartEventSubscriptionIntent::Deleted => {
                    "MESSAGE_START_EVENT_SUBSCRIPTION.DELETED"
                },
            },
            Self::ProcessMessageSubscription(intent) => match intent {
                ProcessMessageSubscriptionIntent::Correlate => {
                    "PROCESS_MESSAGE_SUBSCRIPTION.CORRELATE"
                },
                ProcessMessageSubscriptionIntent::Correlated => {
                    "PROCESS_MESSAGE_SUBSCRIPTION.CORRELATED"
                },
            },
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<MessageIntent> for Intent {
    fn from(intent: MessageIntent) -> Self {
        Self::Message(intent)
    }
}

impl From<MessageCorrelationIntent> for Intent {
    fn from(intent: MessageCorrelationIntent) -> Self {
        Self::MessageCorrelation(intent)
    }
}

impl From<MessageSubscriptionIntent> for Intent {
    fn from(intent: MessageSubscriptionIntent) -> Self {
        Self::MessageSubscription(intent)
    }
}

impl From<MessageStartEventSubscriptionIntent> for Intent {
    fn from(intent: MessageStartEventSubscriptionIntent) -> Self {
        Self::MessageStartEventSubscription(intent)
    }
}

impl From<ProcessMessageSubscriptionIntent> for Intent {
    fn from(intent: ProcessMessageSubscriptionIntent) -> Self {
        Self::ProcessMessageSubscription(intent)
    }
}

/// A message as published to the engine.
///
/// `time_to_live_ms <= 0` means the message expires right after the command
/// that published it has been processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message name subscriptions listen for.
    pub name: String,
    /// Routing value; empty for messages that can only start processes.
    pub correlation_key: String,
    /// Variable payload.
    pub variables: Variables,
    /// Time to live in milliseconds.
    pub time_to_live_ms: i64,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Optional caller-supplied message id.
    pub message_id: Option<String>,
}

impl MessageRecord {
    /// TTL value that forces expiry after the current processing cycle.
    pub const EXPIRE_IMMEDIATELY: i64 = -1;

    /// Create a message with the default tenant, no variables and immediate expiry.
    #[must_use]
    pub fn new(name: impl Into<String>, correlation_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation_key: correlation_key.into(),
            variables: Variables::empty(),
            time_to_live_ms: Self::EXPIRE_IMMEDIATELY,
            tenant_id: TenantId::default(),
            message_id: None,
        }
    }

    /// Set the variable payload.
    #[must_use]
    pub fn with_variables(mut self, variables: impl Into<Variables>) -> Self {
        self.variables = variables.into();
        self
    }

    /// Set the time to live.
    #[must_use]
    pub fn with_time_to_live(mut self, ttl: std::time::Duration) -> Self {
        self.time_to_live_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Set the caller-supplied message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Whether the message must not outlive the cycle that published it.
    #[must_use]
    pub const fn expires_immediately(&self) -> bool {
        self.time_to_live_ms <= 0
    }

    /// Instant after which the message is no longer eligible for correlation.
    #[must_use]
    pub fn deadline(&self, published_at: DateTime<Utc>) -> DateTime<Utc> {
        if self.expires_immediately() {
            return published_at;
        }
        published_at
            .checked_add_signed(Duration::milliseconds(self.time_to_live_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Payload of the synchronous correlate command and its follow-up events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCorrelationRecord {
    /// Message name.
    pub name: String,
    /// Correlation key; may be empty.
    pub correlation_key: String,
    /// Variable payload.
    pub variables: Variables,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Key of the message published for this command, once known.
    pub message_key: Option<Key>,
    /// Process instance created by the first matching start event, once known.
    pub process_instance_key: Option<Key>,
}

impl MessageCorrelationRecord {
    /// Create a correlate command payload with the default tenant.
    #[must_use]
    pub fn new(name: impl Into<String>, correlation_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            correlation_key: correlation_key.into(),
            variables: Variables::empty(),
            tenant_id: TenantId::default(),
            message_key: None,
            process_instance_key: None,
        }
    }

    /// Set the variable payload.
    #[must_use]
    pub fn with_variables(mut self, variables: impl Into<Variables>) -> Self {
        self.variables = variables.into();
        self
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Record the key of the message published for this command.
    #[must_use]
    pub const fn with_message_key(mut self, key: Key) -> Self {
        self.message_key = Some(key);
        self
    }

    /// Record the process instance the message started.
    #[must_use]
    pub const fn with_process_instance_key(mut self, key: Key) -> Self {
        self.process_instance_key = Some(key);
        self
    }

    /// The message this command publishes; it never outlives the command.
    #[must_use]
    pub fn to_message(&self) -> MessageRecord {
        MessageRecord {
            name: self.name.clone(),
            correlation_key: self.correlation_key.clone(),
            variables: self.variables.clone(),
            time_to_live_ms: MessageRecord::EXPIRE_IMMEDIATELY,
            tenant_id: self.tenant_id.clone(),
            message_id: None,
        }
    }
}

/// A process instance element waiting for a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSubscriptionRecord {
    /// Process instance owning the waiting element.
    pub process_instance_key: Key,
    /// The waiting element instance.
    pub element_instance_key: Key,
    /// Id of the process the instance runs.
    pub bpmn_process_id: String,
    /// Awaited message name.
    pub message_name: String,
    /// Awaited correlation key; never empty for an open subscription.
    pub correlation_key: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Whether consuming a message closes the subscription.
    pub interrupting: bool,
    /// Message being correlated, for acknowledgment and rejection commands.
    pub message_key: Option<Key>,
    /// Variables of the correlated message.
    pub variables: Variables,
}

impl MessageSubscriptionRecord {
    /// Create an interrupting subscription for the default tenant.
    #[must_use]
    pub fn new(
        process_instance_key: Key,
        element_instance_key: Key,
        bpmn_process_id: impl Into<String>,
        message_name: impl Into<String>,
        correlation_key: impl Into<String>,
    ) -> Self {
        Self {
            process_instance_key,
            element_instance_key,
            bpmn_process_id: bpmn_process_id.into(),
            message_name: message_name.into(),
            correlation_key: correlation_key.into(),
            tenant_id: TenantId::default(),
            interrupting: true,
            message_key: None,
            variables: Variables::empty(),
        }
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Mark the subscription as non-interrupting.
    #[must_use]
    pub const fn non_interrupting(mut self) -> Self {
        self.interrupting = false;
        self
    }

    /// Attach the message being correlated.
    #[must_use]
    pub fn with_message(mut self, message_key: Key, variables: Variables) -> Self {
        self.message_key = Some(message_key);
        self.variables = variables;
        self
    }
}

/// A message start event of a deployed process definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStartEventSubscriptionRecord {
    /// Process definition the start event belongs to.
    pub process_definition_key: Key,
    /// Id of the process.
    pub bpmn_process_id: String,
    /// Id of the start event element.
    pub start_event_id: String,
    /// Message name that triggers the start event.
    pub message_name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
}

impl MessageStartEventSubscriptionRecord {
    /// Create a start-event subscription for the default tenant.
    #[must_use]
    pub fn new(
        process_definition_key: Key,
        bpmn_process_id: impl Into<String>,
        start_event_id: impl Into<String>,
        message_name: impl Into<String>,
    ) -> Self {
        Self {
            process_definition_key,
            bpmn_process_id: bpmn_process_id.into(),
            start_event_id: start_event_id.into(),
            message_name: message_name.into(),
            tenant_id: TenantId::default(),
        }
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }
}

/// Cross-partition command delivering a correlated message to the partition
/// owning the matched process instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMessageSubscriptionRecord {
    /// Matched process instance.
    pub process_instance_key: Key,
    /// Matched element instance.
    pub element_instance_key: Key,
    /// Id of the process.
    pub bpmn_process_id: String,
    /// Message name.
    pub message_name: String,
    /// Key of the correlated message.
    pub message_key: Key,
    /// Variables of the correlated message.
    pub variables: Variables,
    /// Correlation key of the message.
    pub correlation_key: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
}

impl ProcessMessageSubscriptionRecord {
    /// The acknowledgment sent back to the subscription partition.
    ///
    /// The subscription partition decides from its stored subscription whether
    /// the acknowledgment closes it; `interrupting` is left at its default.
    #[must_use]
    pub fn to_acknowledgment(&self) -> MessageSubscriptionRecord {
        MessageSubscriptionRecord {
            process_instance_key: self.process_instance_key,
            element_instance_key: self.element_instance_key,
            bpmn_process_id: self.bpmn_process_id.clone(),
            message_name: self.message_name.clone(),
            correlation_key: self.correlation_key.clone(),
            tenant_id: self.tenant_id.clone(),
            interrupting: true,
            message_key: Some(self.message_key),
            variables: Variables::empty(),
        }
    }
}

/// Value carried by a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordValue {
    /// A message.
    Message(MessageRecord),
    /// A synchronous correlation.
    MessageCorrelation(MessageCorrelationRecord),
    /// An instance-level subscription.
    MessageSubscription(MessageSubscriptionRecord),
    /// A start-event subscription.
    MessageStartEventSubscription(MessageStartEventSubscriptionRecord),
    /// A cross-partition correlate command.
    ProcessMessageSubscription(ProcessMessageSubscriptionRecord),
}

impl From<MessageRecord> for RecordValue {
    fn from(value: MessageRecord) -> Self {
        Self::Message(value)
    }
}

impl From<MessageCorrelationRecord> for RecordValue {
    fn from(value: MessageCorrelationRecord) -> Self {
        Self::MessageCorrelation(value)
    }
}

impl From<MessageSubscriptionRecord> for RecordValue {
    fn from(value: MessageSubscriptionRecord) -> Self {
        Self::MessageSubscription(value)
    }
}

impl From<MessageStartEventSubscriptionRecord> for RecordValue {
    fn from(value: MessageStartEventSubscriptionRecord) -> Self {
        Self::MessageStartEventSubscription(value)
    }
}

impl From<ProcessMessageSubscriptionRecord> for RecordValue {
    fn from(value: ProcessMessageSubscriptionRecord) -> Self {
        Self::ProcessMessageSubscription(value)
    }
}

/// A keyed entry of the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Key of the entity the record is about.
    pub key: Key,
    /// Command, event or rejection.
    pub record_type: RecordType,
    /// What happened or is requested.
    pub intent: Intent,
    /// Payload.
    pub value: RecordValue,
    /// Processing time of the command that produced the record.
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Create an event record.
    #[must_use]
    pub const fn event(key: Key, intent: Intent, value: RecordValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            key,
            record_type: RecordType::Event,
            intent,
            value,
            timestamp,
        }
    }

    /// The message record carried by this record, if any.
    #[must_use]
    pub const fn as_message(&self) -> Option<&MessageRecord> {
        match &self.value {
            RecordValue::Message(value) => Some(value),
            _ => None,
        }
    }

    /// The correlation record carried by this record, if any.
    #[must_use]
    pub const fn as_message_correlation(&self) -> Option<&MessageCorrelationRecord> {
        match &self.value {
            RecordValue::MessageCorrelation(value) => Some(value),
            _ => None,
        }
    }

    /// The subscription record carried by this record, if any.
    #[must_use]
    pub const fn as_message_subscription(&self) -> Option<&MessageSubscriptionRecord> {
        match &self.value {
            RecordValue::MessageSubscription(value) => Some(value),
            _ => None,
        }
    }
}

impl Event for Record {
    fn event_type(&self) -> &'static str {
        self.intent.name()
    }
}
