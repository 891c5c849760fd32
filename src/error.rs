//! Unified error handling for the siphon crate
//!
//! Each module keeps its own error type; this module wraps them in a single
//! [`Error`] for use across module boundaries (engine construction, CLI).
//!
//! # Usage
//!
//! ```rust,ignore
//! use siphon::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {}", err);
//!     } else {
//!         eprintln!("Fatal error ({:?}): {}", err.category(), err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::StoreError;
pub use crate::utils::error::{CredentialError, FetchError, StrategyError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Extraction and response-shape errors
    Extraction,
    /// Credential and login errors
    Credential,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Scheduler and lifecycle errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the siphon crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Strategy backend errors
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Scheduler and lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::Strategy(e) => e.is_retryable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Store(StoreError::Backend(_)) => true,
            Self::Store(_) => false,
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) => ErrorCategory::Network,
            Self::Strategy(StrategyError::Fetch(_)) => ErrorCategory::Network,
            Self::Strategy(StrategyError::Credential(_)) => ErrorCategory::Credential,
            Self::Strategy(_) | Self::Json(_) => ErrorCategory::Extraction,
            Self::Scheduler(SchedulerError::InvalidSpec { .. }) => ErrorCategory::Config,
            Self::Scheduler(SchedulerError::StoreError { .. }) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let login = Error::Strategy(StrategyError::Credential(CredentialError::LoginRejected(401)));
        assert_eq!(login.category(), ErrorCategory::Credential);

        let invalid = Error::Scheduler(SchedulerError::invalid_spec("urls", "empty"));
        assert_eq!(invalid.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Fetch(FetchError::Timeout).is_recoverable());
        assert!(!Error::Fetch(FetchError::ClientError(404)).is_recoverable());
        assert!(Error::Scheduler(SchedulerError::CapacityExceeded { limit: 10 }).is_recoverable());
        assert!(!Error::Scheduler(SchedulerError::ShuttingDown).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = StrategyError::Unsupported(String::from("pdf")).into();
        assert!(matches!(unified, Error::Strategy(_)));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("workers must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}
