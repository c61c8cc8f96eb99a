//! # Message Correlation Core
//!
//! The state machine that correlates published messages with the process
//! instances and process definitions waiting for them.
//!
//! ## Core Concepts
//!
//! - **Record**: command or event payload (`MESSAGE.PUBLISHED`, ...)
//! - **State**: messages, instance subscriptions and start event
//!   subscriptions of one partition, on top of a transactional keyed store
//! - **Processor**: handles one command, appends follow-up events and applies
//!   their state changes
//! - **Subscriptions**: the matches of one correlation pass
//! - **Environment**: injected collaborators (clock, keys, process
//!   instantiation, cross-partition transport)
//!
//! ## Architecture Principles
//!
//! - One writer per partition; commands are processed strictly in sequence
//! - Every state change of an event goes through its applier
//! - Cross-partition sends never fail a command
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use correlation_core::environment::{Environment, SystemClock};
//! use correlation_core::key::{Key, PartitionId, PartitionKeyGenerator};
//! use correlation_core::processing::{Command, MessageProcessors};
//! use correlation_core::record::{MessageIntent, MessageRecord, MessageSubscriptionRecord};
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
//! let subscription = MessageSubscriptionRecord::new(
//!     Key::new(100),
//!     Key::new(7),
//!     "order-process",
//!     "orderPlaced",
//!     "order-42",
//! );
//! MessageProcessors::process(Command::CreateSubscription(subscription), &mut state, &mut env)
//!     .unwrap();
//! state.commit().unwrap();
//!
//! let result = MessageProcessors::process(
//!     Command::Publish(MessageRecord::new("orderPlaced", "order-42")),
//!     &mut state,
//!     &mut env,
//! )
//! .unwrap();
//!
//! assert_eq!(result.events[0].intent, MessageIntent::Published.into());
//! assert_eq!(result.sends.attempted, 1);
//! ```

pub mod environment;
pub mod error;
pub mod event;
pub mod key;
pub mod processing;
pub mod record;
pub mod sender;
pub mod state;
pub mod subscriptions;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub use error::{ProcessingError, Rejection, RejectionType};
pub use key::{Key, PartitionId};
pub use processing::{Command, MessageProcessors, ProcessingResult};
pub use subscriptions::{CorrelatedSubscription, Subscriptions};
