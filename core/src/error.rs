//! Processing errors and command rejections.

use crate::event::EventError;
use crate::record::Intent;
use crate::state::store::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure that aborts the command being processed.
///
/// The partition rolls back every write of the command and stops; nothing
/// of the command reaches the log.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The keyed store failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// A process instance could not be created for a start event.
    #[error("Failed to instantiate process '{bpmn_process_id}': {reason}")]
    Instantiation {
        /// Process that was to be started.
        bpmn_process_id: String,
        /// Why it failed.
        reason: String,
    },

    /// A record could not be serialized for the log.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Why a command was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionType {
    /// The command carries values that can never be accepted.
    InvalidArgument,
    /// The entity the command refers to does not exist.
    NotFound,
    /// The entity the command would create exists already.
    AlreadyExists,
    /// The entity is not in a state that allows the command.
    InvalidState,
}

impl RejectionType {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidState => "invalid_state",
        }
    }
}

/// A refused command. Rejections never change state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Intent of the refused command.
    pub intent: Intent,
    /// Category of the refusal.
    pub rejection_type: RejectionType,
    /// Human readable reason.
    pub reason: String,
}

impl Rejection {
    /// Create a rejection.
    #[must_use]
    pub fn new(intent: Intent, rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            intent,
            rejection_type,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rejected ({}): {}",
            self.intent,
            self.rejection_type.as_str(),
            self.reason
        )
    }
}
