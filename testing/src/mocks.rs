//! Mock implementations of the processing environment.
//!
//! - [`FixedClock`] and [`ManualClock`]: deterministic time
//! - [`RecordingCommandSender`]: captures cross-partition commands, with
//!   failure injection
//! - [`RecordingInstantiator`]: captures start event triggers

use chrono::{DateTime, Duration, Utc};
use correlation_core::ProcessingError;
use correlation_core::environment::{Clock, ProcessInstantiator, StartEventTrigger, StartedInstance};
use correlation_core::key::KeyGenerator;
use correlation_core::record::{MessageSubscriptionRecord, ProcessMessageSubscriptionRecord};
use correlation_core::sender::SubscriptionCommandSender;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use correlation_testing::mocks::FixedClock;
/// use correlation_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Clock that only moves when told to. Clones share the same time.
///
/// ```
/// use correlation_testing::mocks::ManualClock;
/// use correlation_core::environment::Clock;
/// use chrono::Duration;
///
/// let clock = ManualClock::new(correlation_testing::test_time());
/// let before = clock.now();
/// clock.advance(Duration::seconds(30));
/// assert_eq!(clock.now() - before, Duration::seconds(30));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock starting at `time`
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut time = lock(&self.time);
        *time += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.time)
    }
}

/// A command handed to a [`RecordingCommandSender`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentCommand {
    /// `PROCESS_MESSAGE_SUBSCRIPTION.CORRELATE` towards a process instance.
    CorrelateProcessMessageSubscription(ProcessMessageSubscriptionRecord),
    /// `MESSAGE_SUBSCRIPTION.CORRELATE` acknowledgment.
    CorrelateMessageSubscription(MessageSubscriptionRecord),
}

impl SentCommand {
    /// The process subscription command, if this is one.
    #[must_use]
    pub const fn as_process_command(&self) -> Option<&ProcessMessageSubscriptionRecord> {
        match self {
            Self::CorrelateProcessMessageSubscription(record) => Some(record),
            Self::CorrelateMessageSubscription(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct SenderLog {
    attempts: Vec<(SentCommand, bool)>,
    failing_calls: HashSet<usize>,
    fail_all: bool,
}

/// Sender that records every command instead of delivering it.
///
/// Clones share the same recording, so a test can keep one clone while the
/// environment owns another.
///
/// ```
/// use correlation_core::Key;
/// use correlation_core::record::MessageSubscriptionRecord;
/// use correlation_core::sender::SubscriptionCommandSender;
/// use correlation_testing::mocks::RecordingCommandSender;
///
/// let sender = RecordingCommandSender::new().failing_on(0);
/// let ack = MessageSubscriptionRecord::new(Key::new(1), Key::new(2), "p", "m", "c");
///
/// assert!(!sender.correlate_message_subscription(ack.clone()));
/// assert!(sender.correlate_message_subscription(ack));
/// assert_eq!(sender.attempts(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingCommandSender {
    log: Arc<Mutex<SenderLog>>,
}

impl RecordingCommandSender {
    /// Sender that accepts every command
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th attempt (0-based, counted over all methods)
    #[must_use]
    pub fn failing_on(self, call: usize) -> Self {
        lock(&self.log).failing_calls.insert(call);
        self
    }

    /// Fail every attempt
    #[must_use]
    pub fn failing_always(self) -> Self {
        lock(&self.log).fail_all = true;
        self
    }

    /// Every attempted command, delivered or not, in call order
    #[must_use]
    pub fn sent(&self) -> Vec<SentCommand> {
        lock(&self.log)
            .attempts
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    /// Commands that were accepted
    #[must_use]
    pub fn delivered(&self) -> Vec<SentCommand> {
        lock(&self.log)
            .attempts
            .iter()
            .filter(|(_, delivered)| *delivered)
            .map(|(command, _)| command.clone())
            .collect()
    }

    /// Number of attempts so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock(&self.log).attempts.len()
    }

    /// Process subscription commands attempted so far
    #[must_use]
    pub fn process_commands(&self) -> Vec<ProcessMessageSubscriptionRecord> {
        self.sent()
            .iter()
            .filter_map(SentCommand::as_process_command)
            .cloned()
            .collect()
    }

    fn record(&self, command: SentCommand) -> bool {
        let mut log = lock(&self.log);
        let call = log.attempts.len();
        let delivered = !log.fail_all && !log.failing_calls.contains(&call);
        log.attempts.push((command, delivered));
        delivered
    }
}

impl SubscriptionCommandSender for RecordingCommandSender {
    fn correlate_process_message_subscription(&self, command: ProcessMessageSubscriptionRecord) -> bool {
        self.record(SentCommand::CorrelateProcessMessageSubscription(command))
    }

    fn correlate_message_subscription(&self, command: MessageSubscriptionRecord) -> bool {
        self.record(SentCommand::CorrelateMessageSubscription(command))
    }
}

/// Instantiator that records triggers and allocates keys from the partition.
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingInstantiator {
    triggers: Arc<Mutex<Vec<StartEventTrigger>>>,
    failure: Option<String>,
}

impl RecordingInstantiator {
    /// Instantiator that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiator that fails every instantiation with `reason`
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Triggers received so far, in order
    #[must_use]
    pub fn triggers(&self) -> Vec<StartEventTrigger> {
        lock(&self.triggers).clone()
    }
}

impl ProcessInstantiator for RecordingInstantiator {
    fn instantiate(
        &mut self,
        keys: &mut dyn KeyGenerator,
        trigger: &StartEventTrigger,
    ) -> Result<StartedInstance, ProcessingError> {
        if let Some(reason) = &self.failure {
            return Err(ProcessingError::Instantiation {
                bpmn_process_id: trigger.bpmn_process_id.clone(),
                reason: reason.clone(),
            });
        }
        lock(&self.triggers).push(trigger.clone());
        Ok(StartedInstance {
            process_instance_key: keys.next_key(),
            element_instance_key: keys.next_key(),
        })
    }
}
