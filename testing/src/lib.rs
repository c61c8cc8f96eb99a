//! # Correlation Testing
//!
//! Testing utilities for the message correlation engine.
//!
//! This crate provides:
//! - Mock implementations of the processing environment
//! - A Given-When-Then [`ProcessorTest`] for the message processors
//! - Property-based testing strategies for records
//!
//! ## Example
//!
//! ```
//! use correlation_core::Key;
//! use correlation_core::processing::Command;
//! use correlation_core::record::{MessageCorrelationRecord, MessageSubscriptionRecord};
//! use correlation_testing::ProcessorTest;
//!
//! let subscription =
//!     MessageSubscriptionRecord::new(Key::new(100), Key::new(7), "order-process", "orderPlaced", "order-42");
//!
//! ProcessorTest::new()
//!     .given(Command::CreateSubscription(subscription))
//!     .when(Command::Correlate(MessageCorrelationRecord::new("orderPlaced", "order-42")))
//!     .then_sends(|sent| assert_eq!(sent.len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, TimeZone, Utc};

pub mod mocks;

/// Property-based testing strategies for correlation records.
pub mod properties {
    use correlation_core::Key;
    use correlation_core::key::PartitionId;
    use correlation_core::record::{MessageCorrelationRecord, MessageSubscriptionRecord};
    use proptest::prelude::*;

    /// Message names like `orderPlaced`.
    pub fn message_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z]{0,11}"
    }

    /// Non-empty correlation keys like `order-42`.
    pub fn correlation_key() -> impl Strategy<Value = String> {
        "[a-z]{1,6}-[0-9]{1,4}"
    }

    /// Synchronous correlation commands.
    pub fn correlation_record() -> impl Strategy<Value = MessageCorrelationRecord> {
        (message_name(), correlation_key())
            .prop_map(|(name, key)| MessageCorrelationRecord::new(name, key))
    }

    /// `count` interrupting subscriptions for the same message, one per
    /// process and element instance, on partition 1.
    pub fn subscriptions(
        count: std::ops::Range<usize>,
    ) -> impl Strategy<Value = (String, String, Vec<MessageSubscriptionRecord>)> {
        (message_name(), correlation_key(), count).prop_map(|(name, key, count)| {
            let records = (0..count)
                .map(|i| {
                    let i = i64::try_from(i).unwrap_or(i64::MAX);
                    MessageSubscriptionRecord::new(
                        Key::encode(PartitionId::new(1), 1_000 + i),
                        Key::encode(PartitionId::new(1), 2_000 + i),
                        format!("process-{i}"),
                        name.clone(),
                        key.clone(),
                    )
                })
                .collect();
            (name, key, records)
        })
    }
}

/// Install a `tracing` subscriber writing to the test output.
///
/// Honors `RUST_LOG`; calling it more than once is harmless.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed instant used by test clocks (2025-01-01 00:00:00 UTC).
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, RecordingCommandSender, RecordingInstantiator, SentCommand};
pub use processor_test::{ProcessorTest, assertions};
