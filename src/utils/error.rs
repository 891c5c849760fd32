//! Error types for fetching and extraction
//!
//! This module defines the error types raised by the transport and the
//! strategy backends, and how each maps onto a job failure kind.

use thiserror::Error;

use crate::models::FailureKind;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Request failed at the HTTP layer
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Could not reach the target or the proxy
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Target refused the request, likely a ban (403)
    #[error("Request blocked with status {0}")]
    Blocked(u16),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Client error other than 403/429
    #[error("Client error: {0}")]
    ClientError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid proxy address
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    /// Pool has endpoints but none are usable
    #[error("No proxy available")]
    NoProxyAvailable,

    /// Job was cancelled while the fetch was in flight
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Infrastructure failures worth retrying through another proxy
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Connect(_)
                | Self::RateLimit
                | Self::Blocked(_)
                | Self::ServerError(_)
                | Self::Timeout
        )
    }

    /// Whether the failure reflects on the proxy used
    pub fn counts_against_proxy(&self) -> bool {
        self.is_transient()
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Errors from the authentication pre-step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    /// Credential store has nothing for this job
    #[error("No credentials available")]
    Missing,

    /// Stored credentials do not fit the configured method
    #[error("Credential mismatch: {method} requires {expected}")]
    MethodMismatch {
        method: &'static str,
        expected: &'static str,
    },

    /// Login endpoint answered with a non-success status
    #[error("Login rejected with status {0}")]
    LoginRejected(u16),

    /// Login succeeded but produced no session cookie
    #[error("No session artifact after login: {0}")]
    NoSessionArtifact(String),

    /// Login request could not be completed
    #[error("Login request failed: {0}")]
    LoginFailed(String),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Store(String),
}

/// Errors surfaced by strategy backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    /// Fetch failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Authentication pre-step failed
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Response could not be turned into a record
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Backend cannot handle this content
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Backend panicked or otherwise crashed
    #[error("Backend crashed: {0}")]
    Crashed(String),
}

impl StrategyError {
    /// Map onto the job failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch(e) if e.is_transient() || *e == FetchError::NoProxyAvailable => {
                FailureKind::TransientInfra
            }
            Self::Credential(_) => FailureKind::Credential,
            _ => FailureKind::Strategy,
        }
    }

    /// Errors the worker retries with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_transient())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::Cancelled))
    }
}
