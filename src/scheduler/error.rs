//! Error types for the scheduler module

use std::fmt;

use crate::models::{JobId, JobState};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Job configuration failed validation (client-caused)
    InvalidSpec { field: String, reason: String },

    /// Pending queue is full
    CapacityExceeded { limit: usize },

    /// No live or persisted job with this id
    NotFound { job_id: JobId },

    /// Job already reached a terminal state
    AlreadyTerminal { job_id: JobId, state: JobState },

    /// Transition not permitted by the job state machine
    InvalidTransition { from: JobState, to: JobState },

    /// Engine is shutting down and no longer accepts work
    ShuttingDown,

    /// Persistence boundary failure
    StoreError { operation: String, reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSpec { field, reason } => {
                write!(f, "Invalid job spec in '{}': {}", field, reason)
            }
            Self::CapacityExceeded { limit } => {
                write!(f, "Queue capacity exceeded ({} pending jobs)", limit)
            }
            Self::NotFound { job_id } => write!(f, "Job not found: {}", job_id),
            Self::AlreadyTerminal { job_id, state } => {
                write!(f, "Job {} is already {}", job_id, state)
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "Invalid state transition {} -> {}", from, to)
            }
            Self::ShuttingDown => write!(f, "Scheduler is shutting down"),
            Self::StoreError { operation, reason } => {
                write!(f, "Store error during '{}': {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid spec error
    pub fn invalid_spec(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error with context
    pub fn store_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. } | Self::StoreError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_spec_error() {
        let err = SchedulerError::invalid_spec("max_depth", "7 outside [1, 5]");
        assert!(err.to_string().contains("max_depth"));
        assert!(err.to_string().contains("[1, 5]"));
    }

    #[test]
    fn test_already_terminal_error() {
        let err = SchedulerError::AlreadyTerminal {
            job_id: JobId::new(),
            state: JobState::Completed,
        };
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SchedulerError::CapacityExceeded { limit: 10 }.is_recoverable());
        assert!(!SchedulerError::invalid_spec("urls", "empty").is_recoverable());
        assert!(!SchedulerError::ShuttingDown.is_recoverable());
    }
}
