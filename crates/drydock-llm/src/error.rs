//! Error types for drydock-llm

use crate::extract::ParseFailure;
use std::time::Duration;
use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Provider not initialized or connectivity check failed
    #[error("provider not ready: {0}")]
    NotReady(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Credentials rejected by the backend
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded, optionally with a server-supplied reset hint
    #[error("rate limit exceeded")]
    RateLimited {
        /// Delay suggested by the server, if any
        retry_after: Option<Duration>,
    },

    /// Backend does not support function calling
    #[error("provider '{0}' does not support tool calling")]
    NoToolSupport(String),

    /// All retry attempts exhausted
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Attempts made before giving up
        attempts: u32,
        /// The final error, already sanitized
        last_error: String,
    },

    /// Backend returned no usable content
    #[error("empty response from provider")]
    EmptyResponse,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Schema validation failed
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Structured-output extraction failed
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Whether a retry with backoff may succeed.
    ///
    /// Rate limits, timeouts, and network/5xx failures are transient;
    /// everything else is not worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
