//! Processor-level tests of message correlation.
//!
//! Synchronous: every command is processed and committed on a single
//! partition with recording collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use correlation_core::environment::Environment;
use correlation_core::key::{Key, PartitionId, PartitionKeyGenerator};
use correlation_core::processing::{Command, MessageProcessors, ProcessingResult};
use correlation_core::record::{
    Intent, MessageCorrelationIntent, MessageCorrelationRecord, MessageIntent, MessageRecord,
    MessageStartEventSubscriptionIntent, MessageStartEventSubscriptionRecord,
    MessageSubscriptionIntent, MessageSubscriptionRecord, ProcessMessageSubscriptionIntent,
    ProcessMessageSubscriptionRecord, TenantId, Variables,
};
use correlation_core::state::EngineState;
use correlation_core::state::subscription::SubscriptionStatus;
use correlation_core::{ProcessingError, RejectionType};
use correlation_testing::assertions::{assert_no_sends, assert_rejected};
use correlation_testing::mocks::{ManualClock, RecordingInstantiator, SentCommand};
use correlation_testing::{ProcessorTest, RecordingCommandSender, properties, test_time};
use proptest::prelude::*;
use std::sync::Arc;

const PARTITION: PartitionId = PartitionId::new(1);

/// The n-th key generated on the test partition.
const fn nth_key(n: i64) -> Key {
    Key::encode(PARTITION, n)
}

fn correlation() -> MessageCorrelationRecord {
    MessageCorrelationRecord::new("orderPlaced", "order-42")
}

fn subscription(element_instance_key: i64, bpmn_process_id: &str) -> MessageSubscriptionRecord {
    MessageSubscriptionRecord::new(
        Key::new(100 + element_instance_key),
        Key::new(element_instance_key),
        bpmn_process_id,
        "orderPlaced",
        "order-42",
    )
}

fn start_event(process_definition_key: i64, bpmn_process_id: &str) -> MessageStartEventSubscriptionRecord {
    MessageStartEventSubscriptionRecord::new(
        Key::new(process_definition_key),
        bpmn_process_id,
        "start",
        "orderPlaced",
    )
}

fn buffered_message(ttl_seconds: u64) -> MessageRecord {
    MessageRecord::new("orderPlaced", "order-42")
        .with_time_to_live(std::time::Duration::from_secs(ttl_seconds))
}

fn correlate_intents(outcome: MessageCorrelationIntent) -> Vec<Intent> {
    vec![
        MessageIntent::Published.into(),
        outcome.into(),
        MessageIntent::Expired.into(),
    ]
}

fn process_commands(sent: &[SentCommand]) -> Vec<ProcessMessageSubscriptionRecord> {
    sent.iter()
        .filter_map(SentCommand::as_process_command)
        .cloned()
        .collect()
}

/// A partition driven by hand, for tests that move the clock between commands.
struct Harness {
    state: EngineState,
    env: Environment,
    clock: ManualClock,
    sender: RecordingCommandSender,
}

impl Harness {
    fn new() -> Self {
        correlation_testing::init_test_tracing();
        let clock = ManualClock::new(test_time());
        let sender = RecordingCommandSender::new();
        let env = Environment::new(
            Box::new(PartitionKeyGenerator::new(PARTITION)),
            Arc::new(clock.clone()),
            Arc::new(sender.clone()),
        );
        Self {
            state: EngineState::default(),
            env,
            clock,
            sender,
        }
    }

    fn process(&mut self, command: Command) -> ProcessingResult {
        let result = MessageProcessors::process(command, &mut self.state, &mut self.env)
            .expect("command failed");
        self.state.commit().expect("commit failed");
        result
    }
}

// ============================================================================
// MESSAGE_CORRELATION.CORRELATE
// ============================================================================

#[test]
fn no_match_publishes_not_correlated_and_expires_without_sends() {
    let result = ProcessorTest::new()
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::NotCorrelated))
        .then_sends(|sent| assert!(sent.is_empty()))
        .run();

    assert_no_sends(&result);
    assert!(result.response.is_none());
    assert!(result.events.iter().all(|event| event.key == nth_key(1)));
}

#[test]
fn start_event_match_correlates_and_answers_with_the_new_instance() {
    let instantiator = RecordingInstantiator::new();

    let result = ProcessorTest::new()
        .with_instantiator(instantiator.clone())
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::Correlated))
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].process_instance_key, nth_key(2));
            assert_eq!(commands[0].element_instance_key, nth_key(3));
            assert_eq!(commands[0].message_key, nth_key(1));
        })
        .run();

    let correlated = result.events[1].as_message_correlation().unwrap();
    assert_eq!(correlated.process_instance_key, Some(nth_key(2)));
    assert_eq!(correlated.message_key, Some(nth_key(1)));

    let response = result.response.as_ref().unwrap();
    assert_eq!(response.intent, MessageCorrelationIntent::Correlated.into());
    assert_eq!(
        response.as_message_correlation().unwrap().process_instance_key,
        Some(nth_key(2))
    );

    let triggers = instantiator.triggers();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].process_definition_key, Key::new(10));
    assert_eq!(triggers[0].message_key, nth_key(1));
}

#[test]
fn first_start_event_in_definition_key_order_is_reported() {
    let result = ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(11, "invoice-process")))
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .when(Command::Correlate(correlation()))
        .then_sends(|sent| {
            let processes: Vec<String> = process_commands(sent)
                .into_iter()
                .map(|command| command.bpmn_process_id)
                .collect();
            assert_eq!(processes, vec!["order-process", "invoice-process"]);
        })
        .run();

    // Definition 10 is discovered first: its instance takes keys 2 and 3.
    let correlated = result.events[1].as_message_correlation().unwrap();
    assert_eq!(correlated.process_instance_key, Some(nth_key(2)));
}

#[test]
fn one_instance_per_process_across_definition_versions() {
    let instantiator = RecordingInstantiator::new();

    ProcessorTest::new()
        .with_instantiator(instantiator.clone())
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .given(Command::CreateStartEventSubscription(start_event(20, "order-process")))
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::Correlated))
        .then_sends(|sent| assert_eq!(sent.len(), 1))
        .run();

    assert_eq!(instantiator.triggers().len(), 1);
}

#[test]
fn instance_only_match_is_not_correlated_but_still_sends() {
    let result = ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::CreateSubscription(subscription(8, "invoice-process")))
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::NotCorrelated))
        .then_sends(|sent| {
            let elements: Vec<Key> = process_commands(sent)
                .iter()
                .map(|command| command.element_instance_key)
                .collect();
            assert_eq!(elements, vec![Key::new(7), Key::new(8)]);
        })
        .run();

    assert!(result.response.is_none());
    assert_eq!(result.sends.attempted, 2);
    assert_eq!(result.sends.failed, 0);
}

#[test]
fn start_event_and_instance_matches_are_both_notified() {
    ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .given(Command::CreateSubscription(subscription(7, "invoice-process")))
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::Correlated))
        .then_sends(|sent| {
            let instances: Vec<Key> = process_commands(sent)
                .iter()
                .map(|command| command.process_instance_key)
                .collect();
            assert_eq!(instances, vec![nth_key(2), Key::new(107)]);
        })
        .run();
}

#[test]
fn instance_subscription_of_a_started_process_is_skipped() {
    ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::Correlate(correlation()))
        .then_sends(|sent| assert_eq!(sent.len(), 1))
        .then_state(|state| {
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert!(stored.is_open());
        })
        .run();
}

#[test]
fn failed_send_does_not_stop_the_remaining_sends() {
    let sender = RecordingCommandSender::new().failing_on(1);

    let result = ProcessorTest::new()
        .with_sender(sender.clone())
        .given(Command::CreateSubscription(subscription(7, "process-a")))
        .given(Command::CreateSubscription(subscription(8, "process-b")))
        .given(Command::CreateSubscription(subscription(9, "process-c")))
        .when(Command::Correlate(correlation()))
        .then_intents(&correlate_intents(MessageCorrelationIntent::NotCorrelated))
        .then_sends(|sent| assert_eq!(sent.len(), 3))
        .run();

    assert_eq!(result.sends.attempted, 3);
    assert_eq!(result.sends.failed, 1);
    assert_eq!(sender.delivered().len(), 2);
}

#[test]
fn identical_commands_get_distinct_message_keys() {
    let mut harness = Harness::new();

    let first = harness.process(Command::Correlate(correlation()));
    let second = harness.process(Command::Correlate(correlation()));

    assert_eq!(first.intents(), second.intents());
    assert_eq!(first.events[0].key, nth_key(1));
    assert_eq!(second.events[0].key, nth_key(2));
}

#[test]
fn empty_correlation_key_only_reaches_start_events() {
    let instantiator = RecordingInstantiator::new();

    ProcessorTest::new()
        .with_instantiator(instantiator.clone())
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::CreateStartEventSubscription(start_event(10, "invoice-process")))
        .when(Command::Correlate(MessageCorrelationRecord::new("orderPlaced", "")))
        .then_intents(&correlate_intents(MessageCorrelationIntent::Correlated))
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].bpmn_process_id, "invoice-process");
        })
        .then_state(|state| {
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert!(stored.is_open());
        })
        .run();

    assert_eq!(instantiator.triggers()[0].correlation_key, "");
}

#[test]
fn order_placed_reaches_the_waiting_instance() {
    let waiting = MessageSubscriptionRecord::new(
        Key::new(100),
        Key::new(7),
        "order-process",
        "orderPlaced",
        "order-42",
    );
    let variables = br#"{"orderId":42}"#.to_vec();

    let result = ProcessorTest::new()
        .given(Command::CreateSubscription(waiting))
        .when(Command::Correlate(correlation().with_variables(variables.clone())))
        .then_intents(&correlate_intents(MessageCorrelationIntent::NotCorrelated))
        .then_sends(move |sent| {
            assert_eq!(
                sent,
                [SentCommand::CorrelateProcessMessageSubscription(
                    ProcessMessageSubscriptionRecord {
                        process_instance_key: Key::new(100),
                        element_instance_key: Key::new(7),
                        bpmn_process_id: "order-process".to_string(),
                        message_name: "orderPlaced".to_string(),
                        message_key: nth_key(1),
                        variables: Variables::new(variables),
                        correlation_key: "order-42".to_string(),
                        tenant_id: TenantId::default(),
                    }
                )]
            );
        })
        .then_state(|state| {
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert_eq!(
                stored.status,
                SubscriptionStatus::Correlating {
                    message_key: nth_key(1)
                }
            );
        })
        .run();

    assert_eq!(result.events[0].key, nth_key(1));
    assert_eq!(result.sends.failed, 0);
}

#[test]
fn correlating_subscription_is_not_matched_again() {
    ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::Correlate(correlation()))
        .when(Command::Correlate(correlation()))
        .then_sends(|sent| assert!(sent.is_empty()))
        .run();
}

#[test]
fn subscription_is_notified_again_after_a_failed_send() {
    ProcessorTest::new()
        .with_sender(RecordingCommandSender::new().failing_on(0))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::Correlate(correlation()))
        .when(Command::Correlate(correlation()))
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].element_instance_key, Key::new(7));
            assert_eq!(commands[0].message_key, nth_key(2));
        })
        .then_state(|state| {
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert_eq!(stored.correlating_message(), Some(nth_key(2)));
        })
        .run();
}

#[test]
fn failed_send_leaves_the_subscription_open() {
    let mut harness = Harness::new();
    harness.sender = harness.sender.clone().failing_always();
    harness.process(Command::CreateSubscription(subscription(7, "order-process")));

    let result = harness.process(Command::Correlate(correlation()));

    assert_eq!(result.sends.failed, 1);
    let stored = harness
        .state
        .subscriptions()
        .get(Key::new(7), "orderPlaced")
        .unwrap()
        .unwrap();
    assert!(stored.is_open());
    assert!(!harness.state.db().has_pending_writes());
}

#[test]
fn failing_instantiation_aborts_the_command() {
    let mut state: EngineState = EngineState::default();
    let mut env = Environment::new(
        Box::new(PartitionKeyGenerator::new(PARTITION)),
        Arc::new(correlation_testing::test_clock()),
        Arc::new(RecordingCommandSender::new()),
    )
    .with_instantiator(Box::new(RecordingInstantiator::failing("no deployment")));

    MessageProcessors::process(
        Command::CreateStartEventSubscription(start_event(10, "order-process")),
        &mut state,
        &mut env,
    )
    .unwrap();
    state.commit().unwrap();

    let error = MessageProcessors::process(Command::Correlate(correlation()), &mut state, &mut env)
        .unwrap_err();
    state.rollback();

    assert!(matches!(error, ProcessingError::Instantiation { ref bpmn_process_id, .. } if bpmn_process_id == "order-process"));
    assert!(!state.db().has_pending_writes());
}

proptest! {
    #[test]
    fn every_match_is_sent_whichever_send_fails(
        (name, key, records) in properties::subscriptions(1..8),
        failing in 0_usize..8,
    ) {
        let sender = RecordingCommandSender::new().failing_on(failing);
        let mut test = ProcessorTest::new().with_sender(sender);
        let count = records.len();
        for record in records {
            test = test.given(Command::CreateSubscription(record));
        }

        let result = test
            .when(Command::Correlate(MessageCorrelationRecord::new(name, key)))
            .run();

        prop_assert_eq!(result.sends.attempted, count);
        prop_assert_eq!(result.sends.failed, usize::from(failing < count));
        prop_assert_eq!(
            result.intents(),
            correlate_intents(MessageCorrelationIntent::NotCorrelated)
        );
    }
}

// ============================================================================
// MESSAGE.PUBLISH / MESSAGE.EXPIRE
// ============================================================================

#[test]
fn publish_with_ttl_buffers_the_message() {
    let result = ProcessorTest::new()
        .when(Command::Publish(buffered_message(60)))
        .then_intents(&[MessageIntent::Published.into()])
        .then_state(|state| {
            let stored = state.messages().get(nth_key(1)).unwrap().unwrap();
            assert_eq!(stored.deadline, test_time() + Duration::seconds(60));
        })
        .run();

    assert_eq!(result.response.unwrap().intent, MessageIntent::Published.into());
}

#[test]
fn publish_without_ttl_expires_immediately() {
    ProcessorTest::new()
        .when(Command::Publish(MessageRecord::new("orderPlaced", "order-42")))
        .then_intents(&[MessageIntent::Published.into(), MessageIntent::Expired.into()])
        .then_state(|state| assert!(state.messages().get(nth_key(1)).unwrap().is_none()))
        .run();
}

#[test]
fn publish_correlates_to_open_subscriptions() {
    ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::Publish(buffered_message(60)))
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].message_key, nth_key(1));
        })
        .run();
}

#[test]
fn buffered_message_stays_available_after_a_failed_send() {
    ProcessorTest::new()
        .with_sender(RecordingCommandSender::new().failing_on(0))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::Publish(buffered_message(60)))
        .when(Command::CreateSubscription(subscription(8, "order-process")))
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].element_instance_key, Key::new(8));
            assert_eq!(commands[0].message_key, nth_key(1));
        })
        .then_state(|state| {
            let first = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert!(first.is_open());
        })
        .run();
}

#[test]
fn failed_send_releases_only_instance_matches() {
    ProcessorTest::new()
        .with_sender(RecordingCommandSender::new().failing_always())
        .given(Command::CreateStartEventSubscription(start_event(10, "invoice-process")))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::Publish(buffered_message(60)))
        .then_sends(|sent| assert_eq!(sent.len(), 2))
        .then_state(|state| {
            let messages = state.messages();
            assert!(messages
                .exist_message_correlation(nth_key(1), "invoice-process")
                .unwrap());
            assert!(!messages
                .exist_message_correlation(nth_key(1), "order-process")
                .unwrap());
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert!(stored.is_open());
        })
        .run();
}

#[test]
fn publish_rejects_empty_name_and_duplicate_message_id() {
    let result = ProcessorTest::new()
        .when(Command::Publish(MessageRecord::new("", "order-42")))
        .run();
    assert_rejected(&result, RejectionType::InvalidArgument);

    let with_id = buffered_message(60).with_message_id("msg-1");
    let result = ProcessorTest::new()
        .given(Command::Publish(with_id.clone()))
        .when(Command::Publish(with_id))
        .run();
    assert_rejected(&result, RejectionType::AlreadyExists);
}

#[test]
fn expiry_removes_messages_past_their_deadline() {
    let mut harness = Harness::new();
    harness.process(Command::Publish(buffered_message(10)));
    harness.process(Command::Publish(buffered_message(60)));

    harness.clock.advance(Duration::seconds(5));
    assert!(harness.process(Command::ExpireMessages { limit: 10 }).events.is_empty());

    harness.clock.advance(Duration::seconds(6));
    let result = harness.process(Command::ExpireMessages { limit: 10 });

    assert_eq!(result.intents(), vec![Intent::from(MessageIntent::Expired)]);
    assert_eq!(result.events[0].key, nth_key(1));
    assert!(harness.state.messages().get(nth_key(1)).unwrap().is_none());
    assert!(harness.state.messages().get(nth_key(2)).unwrap().is_some());
}

#[test]
fn expiry_respects_the_batch_limit() {
    let mut harness = Harness::new();
    for _ in 0..3 {
        harness.process(Command::Publish(buffered_message(1)));
    }
    harness.clock.advance(Duration::seconds(2));

    assert_eq!(harness.process(Command::ExpireMessages { limit: 2 }).events.len(), 2);
    assert_eq!(harness.process(Command::ExpireMessages { limit: 2 }).events.len(), 1);
}

#[test]
fn expired_message_is_not_handed_to_new_subscriptions() {
    let mut harness = Harness::new();
    harness.process(Command::Publish(buffered_message(10)));
    harness.clock.advance(Duration::seconds(11));

    let result = harness.process(Command::CreateSubscription(subscription(7, "order-process")));

    assert_eq!(result.intents(), vec![Intent::from(MessageSubscriptionIntent::Created)]);
    assert_eq!(harness.sender.attempts(), 0);
}

// ============================================================================
// MESSAGE_SUBSCRIPTION.*
// ============================================================================

#[test]
fn created_subscription_picks_up_the_oldest_buffered_message() {
    ProcessorTest::new()
        .given(Command::Publish(buffered_message(60)))
        .given(Command::Publish(buffered_message(60)))
        .when(Command::CreateSubscription(subscription(7, "order-process")))
        .then_intents(&[MessageSubscriptionIntent::Created.into()])
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].message_key, nth_key(1));
        })
        .run();
}

#[test]
fn buffered_message_reaches_each_process_once() {
    ProcessorTest::new()
        .given(Command::Publish(buffered_message(60)))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::CreateSubscription(subscription(8, "order-process")))
        .then_sends(|sent| assert!(sent.is_empty()))
        .run();
}

#[test]
fn create_rejects_empty_correlation_key_and_duplicates() {
    let keyless = MessageSubscriptionRecord::new(
        Key::new(100),
        Key::new(7),
        "order-process",
        "orderPlaced",
        "",
    );
    let result = ProcessorTest::new()
        .when(Command::CreateSubscription(keyless))
        .run();
    assert_rejected(&result, RejectionType::InvalidArgument);

    let result = ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::CreateSubscription(subscription(7, "order-process")))
        .run();
    assert_rejected(&result, RejectionType::AlreadyExists);
}

#[test]
fn acknowledgment_closes_an_interrupting_subscription() {
    let ack = subscription(7, "order-process").with_message(nth_key(1), Variables::empty());

    ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::Correlate(correlation()))
        .when(Command::CorrelateSubscription(ack))
        .then_intents(&[MessageSubscriptionIntent::Correlated.into()])
        .then_result(|result| {
            let correlated = result.events[0].as_message_subscription().unwrap();
            assert_eq!(correlated.message_key, Some(nth_key(1)));
        })
        .then_state(|state| {
            assert!(!state.subscriptions().exists(Key::new(7), "orderPlaced").unwrap());
        })
        .run();
}

#[test]
fn acknowledgment_reopens_a_non_interrupting_subscription_and_hands_it_the_next_message() {
    let waiting = subscription(7, "order-process").non_interrupting();
    let ack = waiting.clone().with_message(nth_key(1), Variables::empty());

    ProcessorTest::new()
        .given(Command::Publish(buffered_message(60)))
        .given(Command::CreateSubscription(waiting))
        .given(Command::Publish(buffered_message(60)))
        .when(Command::CorrelateSubscription(ack))
        .then_intents(&[MessageSubscriptionIntent::Correlated.into()])
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].message_key, nth_key(2));
        })
        .then_state(|state| {
            let stored = state.subscriptions().get(Key::new(7), "orderPlaced").unwrap().unwrap();
            assert_eq!(stored.correlating_message(), Some(nth_key(2)));
        })
        .run();
}

#[test]
fn acknowledgment_of_unknown_or_idle_subscription_is_rejected() {
    let ack = subscription(7, "order-process").with_message(nth_key(1), Variables::empty());

    let result = ProcessorTest::new()
        .when(Command::CorrelateSubscription(ack.clone()))
        .run();
    assert_rejected(&result, RejectionType::NotFound);

    let result = ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::CorrelateSubscription(ack))
        .run();
    assert_rejected(&result, RejectionType::InvalidState);
}

#[test]
fn rejection_offers_the_message_to_the_next_subscription_of_the_process() {
    let refused = subscription(7, "order-process").with_message(nth_key(1), Variables::empty());

    ProcessorTest::new()
        .given(Command::Publish(buffered_message(60)))
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .given(Command::CreateSubscription(subscription(8, "order-process")))
        .when(Command::RejectSubscription(refused))
        .then_intents(&[MessageSubscriptionIntent::Rejected.into()])
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].element_instance_key, Key::new(8));
            assert_eq!(commands[0].message_key, nth_key(1));
        })
        .then_state(|state| {
            let next = state.subscriptions().get(Key::new(8), "orderPlaced").unwrap().unwrap();
            assert_eq!(next.correlating_message(), Some(nth_key(1)));
            assert!(state
                .messages()
                .exist_message_correlation(nth_key(1), "order-process")
                .unwrap());
        })
        .run();
}

#[test]
fn rejection_without_correlation_is_invalid() {
    let refused = subscription(7, "order-process").with_message(nth_key(1), Variables::empty());

    let result = ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::RejectSubscription(refused))
        .run();

    assert_rejected(&result, RejectionType::InvalidState);
}

#[test]
fn delete_closes_the_subscription() {
    ProcessorTest::new()
        .given(Command::CreateSubscription(subscription(7, "order-process")))
        .when(Command::DeleteSubscription(subscription(7, "order-process")))
        .then_intents(&[MessageSubscriptionIntent::Deleted.into()])
        .then_state(|state| {
            assert!(!state.subscriptions().exists(Key::new(7), "orderPlaced").unwrap());
            assert!(state
                .subscriptions()
                .find_subscriptions(&TenantId::default(), "orderPlaced", "order-42")
                .unwrap()
                .is_empty());
        })
        .run();

    let result = ProcessorTest::new()
        .when(Command::DeleteSubscription(subscription(7, "order-process")))
        .run();
    assert_rejected(&result, RejectionType::NotFound);
}

// ============================================================================
// MESSAGE_START_EVENT_SUBSCRIPTION.*
// ============================================================================

#[test]
fn new_start_event_starts_instances_for_buffered_messages() {
    let instantiator = RecordingInstantiator::new();

    ProcessorTest::new()
        .with_instantiator(instantiator.clone())
        .given(Command::Publish(buffered_message(60)))
        .when(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .then_intents(&[MessageStartEventSubscriptionIntent::Created.into()])
        .then_sends(|sent| {
            let commands = process_commands(sent);
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0].process_instance_key, nth_key(2));
        })
        .run();

    assert_eq!(instantiator.triggers()[0].message_key, nth_key(1));
}

#[test]
fn buffered_message_does_not_restart_a_process_it_already_started() {
    ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .given(Command::Publish(buffered_message(60)))
        .given(Command::DeleteStartEventSubscriptions(start_event(10, "order-process")))
        .when(Command::CreateStartEventSubscription(start_event(20, "order-process")))
        .then_sends(|sent| assert!(sent.is_empty()))
        .run();
}

#[test]
fn duplicate_start_event_is_rejected() {
    let result = ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .when(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .run();

    assert_rejected(&result, RejectionType::AlreadyExists);
}

#[test]
fn delete_removes_every_start_event_of_the_definition() {
    let mut cancelled = start_event(10, "order-process");
    cancelled.message_name = "orderCancelled".to_string();

    ProcessorTest::new()
        .given(Command::CreateStartEventSubscription(start_event(10, "order-process")))
        .given(Command::CreateStartEventSubscription(cancelled))
        .when(Command::DeleteStartEventSubscriptions(start_event(10, "order-process")))
        .then_intents(&[
            MessageStartEventSubscriptionIntent::Deleted.into(),
            MessageStartEventSubscriptionIntent::Deleted.into(),
        ])
        .then_state(|state| {
            assert!(state
                .start_event_subscriptions()
                .find_by_process_definition(Key::new(10))
                .unwrap()
                .is_empty());
        })
        .run();

    let result = ProcessorTest::new()
        .when(Command::DeleteStartEventSubscriptions(start_event(10, "order-process")))
        .run();
    assert_rejected(&result, RejectionType::NotFound);
}

// ============================================================================
// PROCESS_MESSAGE_SUBSCRIPTION.CORRELATE
// ============================================================================

#[test]
fn process_partition_acknowledges_the_correlation() {
    let command = ProcessMessageSubscriptionRecord {
        process_instance_key: Key::new(100),
        element_instance_key: Key::new(7),
        bpmn_process_id: "order-process".to_string(),
        message_name: "orderPlaced".to_string(),
        message_key: Key::encode(PartitionId::new(2), 1),
        variables: Variables::empty(),
        correlation_key: "order-42".to_string(),
        tenant_id: TenantId::default(),
    };

    let result = ProcessorTest::new()
        .when(Command::CorrelateProcessSubscription(command))
        .then_intents(&[ProcessMessageSubscriptionIntent::Correlated.into()])
        .then_sends(|sent| {
            let [SentCommand::CorrelateMessageSubscription(ack)] = sent else {
                panic!("expected one acknowledgment, got {sent:?}");
            };
            assert_eq!(ack.element_instance_key, Key::new(7));
            assert_eq!(ack.message_key, Some(Key::encode(PartitionId::new(2), 1)));
            assert_eq!(ack.correlation_key, "order-42");
        })
        .run();

    assert_eq!(result.events[0].key, Key::new(7));
}
