//! Error types for pressbox
//!
//! This module provides error handling for the whole pipeline, including:
//! - The provider-facing taxonomy (rate limiting, rejections, upstream outages, bad payloads)
//! - Stage-level failures (incomplete datasets, generation failures, partial reviews)
//! - A serializable [`ErrorKind`] used in job error history and lifecycle events

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::sports_data::Endpoint;
use crate::types::{Article, DatasetField, ReviewFeedback};

/// Result type alias for pressbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pressbox
///
/// Each variant carries enough context to explain the failure in a job's error
/// history without access to the original request.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pipeline.worker_pool_size")
        key: Option<String>,
    },

    /// The rate limiter could not hand out a token before the configured wait elapsed
    #[error("rate limit exceeded: no token available within {waited:?}")]
    RateLimitExceeded {
        /// How long the caller was prepared to wait
        waited: Duration,
    },

    /// The provider rejected the request (4xx, or an error envelope); never retried
    #[error("{endpoint} request rejected (status {status}): {message}")]
    ClientRequestError {
        /// Endpoint that was called
        endpoint: Endpoint,
        /// HTTP status returned by the provider
        status: u16,
        /// Provider message or body excerpt
        message: String,
    },

    /// The request was never sent because its parameters violate the endpoint contract
    #[error("invalid {endpoint} request: {reason}")]
    InvalidRequest {
        /// Endpoint that would have been called
        endpoint: Endpoint,
        /// Which constraint was violated
        reason: String,
    },

    /// A single attempt failed with a 5xx; only surfaces inside the retry loop
    #[error("{endpoint} returned server error {status}")]
    UpstreamStatus {
        /// Endpoint that was called
        endpoint: Endpoint,
        /// HTTP status returned by the provider
        status: u16,
    },

    /// Transport or server errors persisted through every retry attempt
    #[error("{endpoint} unavailable after {attempts} attempts: {last_error}")]
    UpstreamUnavailable {
        /// Endpoint that was called
        endpoint: Endpoint,
        /// Number of attempts made
        attempts: u32,
        /// Description of the final failure
        last_error: String,
    },

    /// The provider answered, but the payload lacks fields the endpoint guarantees
    #[error("malformed {endpoint} response: {reason}")]
    MalformedResponse {
        /// Endpoint that was called
        endpoint: Endpoint,
        /// What was missing or mistyped
        reason: String,
    },

    /// Subject identifier that carries no numeric provider id
    #[error("invalid subject identifier: {0}")]
    InvalidSubject(String),

    /// An essential dataset field could not be collected
    #[error("incomplete dataset for {subject}: {field} unavailable ({reason})")]
    IncompleteDataset {
        /// Subject identifier being collected
        subject: String,
        /// The essential field that is missing
        field: DatasetField,
        /// Why the field is missing
        reason: String,
        /// Kind of the provider error behind the gap; `None` when the provider returned no data
        cause: Option<ErrorKind>,
    },

    /// The generation capability errored or produced no usable text
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Fact-checking could not resolve any claim; the partial review is attached when available
    #[error("review incomplete: {reason}")]
    ReviewIncomplete {
        /// Why the review could not be completed
        reason: String,
        /// Edited article and feedback produced before the review gave up
        partial: Option<Box<(Article, ReviewFeedback)>>,
    },

    /// A stage did not finish within the configured stage timeout
    #[error("stage timed out after {0:?}")]
    StageTimeout(Duration),

    /// The job was cancelled at a checkpoint
    #[error("job cancelled")]
    Cancelled,

    /// A job state change that would break stage ordering
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current stage name
        from: String,
        /// Requested stage name
        to: String,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Job not known to the orchestrator
    #[error("job not found: {0}")]
    NotFound(String),

    /// A job with this id is already queued or running
    #[error("job already active: {0}")]
    DuplicateJob(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. } => ErrorKind::Config,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Error::ClientRequestError { .. } => ErrorKind::ClientRequestError,
            Error::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Error::UpstreamStatus { .. } | Error::UpstreamUnavailable { .. } => {
                ErrorKind::UpstreamUnavailable
            }
            Error::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Error::InvalidSubject(_) => ErrorKind::InvalidSubject,
            Error::IncompleteDataset { .. } => ErrorKind::IncompleteDataset,
            Error::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Error::ReviewIncomplete { .. } => ErrorKind::ReviewIncomplete,
            Error::StageTimeout(_) => ErrorKind::StageTimeout,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Error::ShuttingDown => ErrorKind::ShuttingDown,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DuplicateJob(_) => ErrorKind::DuplicateJob,
            Error::Network(_) => ErrorKind::Network,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Serializable error classification
///
/// Stored in job error history and lifecycle events where the full [`Error`]
/// (which owns non-cloneable sources) cannot travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid configuration
    Config,
    /// Rate limiter wait budget exhausted
    RateLimitExceeded,
    /// Provider rejected the request
    ClientRequestError,
    /// Request parameters violated the endpoint contract
    InvalidRequest,
    /// Provider unavailable after retries
    UpstreamUnavailable,
    /// Provider payload failed validation
    MalformedResponse,
    /// Subject id could not be parsed
    InvalidSubject,
    /// Essential dataset field missing
    IncompleteDataset,
    /// Generation capability failed
    GenerationFailed,
    /// Review finished only partially
    ReviewIncomplete,
    /// Stage exceeded its time budget
    StageTimeout,
    /// Job cancelled
    Cancelled,
    /// Illegal job state change
    InvalidTransition,
    /// Orchestrator shutting down
    ShuttingDown,
    /// Unknown job
    NotFound,
    /// Job id already in use
    DuplicateJob,
    /// Transport error
    Network,
    /// Encoding or decoding error
    Serialization,
    /// Filesystem error
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::ClientRequestError => "client_request_error",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::InvalidSubject => "invalid_subject",
            ErrorKind::IncompleteDataset => "incomplete_dataset",
            ErrorKind::GenerationFailed => "generation_failed",
            ErrorKind::ReviewIncomplete => "review_incomplete",
            ErrorKind::StageTimeout => "stage_timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::ShuttingDown => "shutting_down",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DuplicateJob => "duplicate_job",
            ErrorKind::Network => "network",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_server_error_and_exhausted_retries_share_a_kind() {
        let single = Error::UpstreamStatus {
            endpoint: Endpoint::Fixtures,
            status: 503,
        };
        let exhausted = Error::UpstreamUnavailable {
            endpoint: Endpoint::Fixtures,
            attempts: 3,
            last_error: "fixtures returned server error 503".to_string(),
        };
        assert_eq!(single.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(exhausted.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn error_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"rate_limit_exceeded\"");
        assert_eq!(ErrorKind::RateLimitExceeded.to_string(), "rate_limit_exceeded");
    }

    #[test]
    fn messages_include_context() {
        let err = Error::IncompleteDataset {
            subject: "fixture-123".to_string(),
            field: DatasetField::Fixture,
            reason: "no fixture returned".to_string(),
            cause: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("fixture-123"), "subject missing from: {msg}");
        assert!(msg.contains("fixture"), "field missing from: {msg}");

        let err = Error::ClientRequestError {
            endpoint: Endpoint::Standings,
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "standings request rejected (status 403): forbidden"
        );
    }

    #[test]
    fn config_shorthand_records_key() {
        match Error::config("pipeline.worker_pool_size", "must be at least 1") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("pipeline.worker_pool_size"));
                assert_eq!(message, "must be at least 1");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
