//! Error types for the evolution subsystem.

use std::time::Duration;
use thiserror::Error;

/// Typed failures from the async LLM client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request-scoped deadline expired.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The endpoint answered with a non-success status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The reply body was not the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Transport faults and server errors are worth retrying; client
    /// errors and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout(_) | ClientError::Connection(_) => true,
            ClientError::HttpStatus { status, .. } => *status >= 500,
            ClientError::MalformedResponse(_) => false,
        }
    }
}

/// Public error type of the evolution subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvoError {
    /// A client failure that exhausted its retries.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// No registered model passed the health probe with the required
    /// capabilities.
    #[error("no model available with the required capabilities")]
    NoModelAvailable,

    /// The bridge worker did not become runnable within its deadline.
    #[error("bridge initialization failed: {0}")]
    BridgeInitializationFailed(String),

    /// An operation was submitted before `initialize()`.
    #[error("evolution bridge not initialized")]
    NotInitialized,

    /// The bounded wait on the bridge expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Every generated candidate failed sandbox validation.
    #[error("evolution failed after {attempts} attempt(s): {reason}")]
    EvolutionFailed { attempts: u32, reason: String },

    /// An environment knob or option could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A persisted pattern stream could not be parsed.
    #[error("pattern import failed: {0}")]
    PatternImport(String),
}
