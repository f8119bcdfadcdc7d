/*!
 * Error types for the transhub application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 *
 * - `ProviderError`: transport-level failures of an HTTP provider
 * - `BackendError`: what a translation backend reports to the orchestrator
 * - `CatalogError`: catalog parsing, lookup and persistence failures
 * - `PipelineError`: failures that end a run
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Map a non-success HTTP status and body to the matching provider error
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors reported by a translation backend
///
/// The three kinds drive the orchestrator's recovery policy: transient errors
/// are retried, malformed responses are retried and then degraded to
/// per-entry translation, fatal errors abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Rate limit, timeout or temporary service failure
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// The backend replied but the output did not have the expected structure
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Authentication or configuration problem
    #[error("Fatal backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    /// Whether the orchestrator may try the same call again
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

impl From<ProviderError> for BackendError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::RateLimitExceeded(_)
            | ProviderError::ConnectionError(_)
            | ProviderError::Timeout(_)
            | ProviderError::RequestFailed(_) => Self::Transient(error.to_string()),
            ProviderError::ApiError { status_code, .. } if status_code >= 500 || status_code == 408 => {
                Self::Transient(error.to_string())
            }
            ProviderError::ParseError(_) => Self::MalformedResponse(error.to_string()),
            ProviderError::AuthenticationError(_) | ProviderError::ApiError { .. } => {
                Self::Fatal(error.to_string())
            }
        }
    }
}

/// Errors raised by the catalog store and the PO codec
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A translation was applied for a key the catalog does not contain
    #[error("Unknown catalog key: {0:?}")]
    UnknownKey(String),

    /// The catalog text could not be parsed
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Writing the catalog to durable storage failed
    #[error("Failed to persist catalog to {path:?}: {message}")]
    Persistence {
        /// Target path
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Reading a catalog file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that terminate a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The backend reported a non-retryable error
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// Data integrity problem in the catalog
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The run was cancelled from outside
    #[error("Run cancelled")]
    Cancelled,

    /// A suspension point exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<BackendError> for PipelineError {
    fn from(error: BackendError) -> Self {
        Self::Backend(error)
    }
}
