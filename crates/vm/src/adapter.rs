//! The LLM adapter seam between the VM and the evolution subsystem.
//!
//! The VM depends only on this trait; the concrete implementation lives in
//! the evolution crate, which also owns sandbox VM construction. This
//! breaks the cycle between the two without mutual instantiation.

use crate::error::VmError;
use std::time::Duration;
use thiserror::Error;

/// Interface through which the VM requests code generation or repair.
///
/// Implementations block the calling thread for at most `timeout`; the VM
/// invokes them only from the `LLMGEN` and `EVOLVE` executors, after
/// operand decoding and before any result push, so a failure never leaves
/// partial effects behind.
pub trait LlmAdapter: Send + Sync {
    /// Generate assembly code for `prompt`.
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, AdapterError>;

    /// Produce a validated replacement for `code`, which failed with
    /// `error_text`.
    fn evolve(&self, code: &str, error_text: &str, timeout: Duration)
        -> Result<String, AdapterError>;
}

/// Failures an adapter can report back to the VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The service (or the adapter itself) is not usable.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The reply could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// No candidate survived validation.
    #[error("{0}")]
    Failed(String),
}

impl AdapterError {
    /// Lift an adapter failure into the VM taxonomy at instruction `at`.
    pub(crate) fn into_vm_error(self, at: usize) -> VmError {
        match self {
            AdapterError::Unavailable(reason) => VmError::LlmUnavailable { at, reason },
            AdapterError::Timeout(timeout) => VmError::LlmTimeout { at, timeout },
            AdapterError::Malformed(reason) => VmError::LlmMalformed { at, reason },
            AdapterError::Failed(reason) => VmError::EvolutionFailed { at, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_map_to_vm_kinds() {
        assert_eq!(
            AdapterError::Unavailable("down".into())
                .into_vm_error(3)
                .kind(),
            "LLMUnavailable"
        );
        assert_eq!(
            AdapterError::Timeout(Duration::from_secs(1))
                .into_vm_error(3)
                .kind(),
            "LLMTimeout"
        );
        assert_eq!(
            AdapterError::Malformed("bad json".into())
                .into_vm_error(3)
                .kind(),
            "LLMMalformed"
        );
        assert_eq!(
            AdapterError::Failed("no candidate".into())
                .into_vm_error(3)
                .kind(),
            "EvolutionFailed"
        );
    }
}
