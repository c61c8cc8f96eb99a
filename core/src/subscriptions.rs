//! Accumulator for the subscriptions a message is correlated to in one pass.
//!
//! A correlation pass first collects every match, then notifies each of them.
//! Keeping both phases apart means the state writes of the pass are finished
//! before any command leaves the partition.

use crate::key::Key;
use smallvec::SmallVec;

/// A subscription a message was correlated to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrelatedSubscription {
    /// A message start event; a new process instance was created for it.
    StartEvent {
        /// Definition whose start event matched.
        process_definition_key: Key,
        /// Id of the process.
        bpmn_process_id: String,
        /// The new process instance.
        process_instance_key: Key,
        /// The start event element instance inside the new instance.
        element_instance_key: Key,
    },
    /// An element of a running process instance waiting for the message.
    ProcessInstance {
        /// Owning process instance.
        process_instance_key: Key,
        /// Waiting element instance.
        element_instance_key: Key,
        /// Id of the process.
        bpmn_process_id: String,
    },
}

impl CorrelatedSubscription {
    /// Process instance that receives the message.
    #[must_use]
    pub const fn process_instance_key(&self) -> Key {
        match self {
            Self::StartEvent {
                process_instance_key,
                ..
            }
            | Self::ProcessInstance {
                process_instance_key,
                ..
            } => *process_instance_key,
        }
    }

    /// Element instance that receives the message.
    #[must_use]
    pub const fn element_instance_key(&self) -> Key {
        match self {
            Self::StartEvent {
                element_instance_key,
                ..
            }
            | Self::ProcessInstance {
                element_instance_key,
                ..
            } => *element_instance_key,
        }
    }

    /// Id of the process.
    #[must_use]
    pub fn bpmn_process_id(&self) -> &str {
        match self {
            Self::StartEvent {
                bpmn_process_id, ..
            }
            | Self::ProcessInstance {
                bpmn_process_id, ..
            } => bpmn_process_id,
        }
    }

    /// Whether the match created a new process instance.
    #[must_use]
    pub const fn is_start_event(&self) -> bool {
        matches!(self, Self::StartEvent { .. })
    }
}

/// Ordered, append-only collection of matches for one message.
///
/// # Example
///
/// ```
/// use correlation_core::key::Key;
/// use correlation_core::subscriptions::{CorrelatedSubscription, Subscriptions};
///
/// let mut subscriptions = Subscriptions::new();
/// for element in [7, 8, 9] {
///     subscriptions.add(CorrelatedSubscription::ProcessInstance {
///         process_instance_key: Key::new(100),
///         element_instance_key: Key::new(element),
///         bpmn_process_id: format!("process-{element}"),
///     });
/// }
///
/// let mut attempted = Vec::new();
/// let all_sent = subscriptions.visit_subscriptions(|subscription| {
///     attempted.push(subscription.element_instance_key().get());
///     subscription.element_instance_key() != Key::new(8)
/// });
///
/// assert!(!all_sent);
/// assert_eq!(attempted, vec![7, 8, 9]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscriptions {
    matches: SmallVec<[CorrelatedSubscription; 4]>,
}

impl Subscriptions {
    /// An empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a match.
    pub fn add(&mut self, subscription: CorrelatedSubscription) {
        self.matches.push(subscription);
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Number of matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// The first match, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&CorrelatedSubscription> {
        self.matches.first()
    }

    /// Whether an instance of the process already received the message in
    /// this pass.
    #[must_use]
    pub fn contains_process(&self, bpmn_process_id: &str) -> bool {
        self.matches
            .iter()
            .any(|subscription| subscription.bpmn_process_id() == bpmn_process_id)
    }

    /// Call `visitor` for every match in order and return whether all calls
    /// returned `true`.
    ///
    /// A `false` from one call does not stop the remaining calls.
    pub fn visit_subscriptions<F>(&self, mut visitor: F) -> bool
    where
        F: FnMut(&CorrelatedSubscription) -> bool,
    {
        self.matches
            .iter()
            .fold(true, |all_succeeded, subscription| {
                visitor(subscription) && all_succeeded
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn instance(element: i64, process: &str) -> CorrelatedSubscription {
        CorrelatedSubscription::ProcessInstance {
            process_instance_key: Key::new(100),
            element_instance_key: Key::new(element),
            bpmn_process_id: process.to_string(),
        }
    }

    #[test]
    fn peek_returns_first_added() {
        let mut subscriptions = Subscriptions::new();
        assert!(subscriptions.peek().is_none());

        subscriptions.add(CorrelatedSubscription::StartEvent {
            process_definition_key: Key::new(1),
            bpmn_process_id: "a".to_string(),
            process_instance_key: Key::new(10),
            element_instance_key: Key::new(11),
        });
        subscriptions.add(instance(7, "b"));

        assert_eq!(subscriptions.len(), 2);
        assert_eq!(
            subscriptions.peek().map(CorrelatedSubscription::process_instance_key),
            Some(Key::new(10))
        );
        assert!(subscriptions.peek().is_some_and(CorrelatedSubscription::is_start_event));
        assert!(subscriptions.contains_process("b"));
        assert!(!subscriptions.contains_process("c"));
    }

    #[test]
    fn instance_match_is_not_a_start_event() {
        assert!(!instance(7, "a").is_start_event());
    }

    #[test]
    fn visiting_empty_collection_succeeds() {
        let mut calls = 0;
        assert!(Subscriptions::new().visit_subscriptions(|_| {
            calls += 1;
            false
        }));
        assert_eq!(calls, 0);
    }

    proptest! {
        #[test]
        fn every_visitor_runs_and_result_is_conjunction(outcomes in prop::collection::vec(any::<bool>(), 0..32)) {
            let mut subscriptions = Subscriptions::new();
            for (index, _) in outcomes.iter().enumerate() {
                subscriptions.add(instance(i64::try_from(index).unwrap_or(0), "p"));
            }

            let mut visited = 0_usize;
            let result = subscriptions.visit_subscriptions(|_| {
                let outcome = outcomes[visited];
                visited += 1;
                outcome
            });

            prop_assert_eq!(visited, outcomes.len());
            prop_assert_eq!(result, outcomes.iter().all(|outcome| *outcome));
        }
    }
}
