//! Activation attempt state

use crate::directory::DirectoryError;
use crate::message::ActivationResponse;

/// Final result of an activation attempt, shared by every requester
pub type ActivationOutcome = Result<ActivationResponse, ActivationError>;

/// Lifecycle of one activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Created, owning handler not yet resolved
    Init,
    /// Handler resolved and queried, waiting for its answer
    AwaitingHandler,
    /// Handler accepted the join
    Completed,
    /// Handler rejected the join, or the owner could not be resolved
    Failed,
    /// No answer before the deadline
    TimedOut,
}

impl AttemptState {
    /// Whether the attempt has an outcome
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Completed | AttemptState::Failed | AttemptState::TimedOut
        )
    }

    pub(super) fn from_outcome(outcome: &ActivationOutcome) -> Self {
        match outcome {
            Ok(_) => AttemptState::Completed,
            Err(ActivationError::Timeout) => AttemptState::TimedOut,
            Err(_) => AttemptState::Failed,
        }
    }
}

/// Error type for activation attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// No handler owns the application
    Unroutable(DirectoryError),
    /// The handler explicitly refused the join
    Rejected(String),
    /// The handler could not be queried or failed to answer
    HandlerFailed(String),
    /// No answer before the deadline
    Timeout,
}

impl std::fmt::Display for ActivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationError::Unroutable(e) => write!(f, "Activation unroutable: {}", e),
            ActivationError::Rejected(reason) => write!(f, "Activation rejected: {}", reason),
            ActivationError::HandlerFailed(reason) => {
                write!(f, "Activation handler failed: {}", reason)
            }
            ActivationError::Timeout => write!(f, "Activation timed out"),
        }
    }
}

impl std::error::Error for ActivationError {}
