//! VM configuration: resource caps and LLM client knobs.

use crate::error::VmError;
use std::time::Duration;

/// Resource bounds and LLM settings for a VM instance.
///
/// Every limit is a hard cap checked on the path that would exceed it;
/// a limit of zero is rejected by [`VmConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Cap on data-stack depth.
    pub max_stack_size: usize,
    /// Cap on control-stack depth.
    pub max_control_depth: usize,
    /// Cap on the number of memory-map entries.
    pub max_memory_entries: usize,
    /// Cap on dispatched instructions per `run` call.
    pub max_execution_steps: u64,
    /// Semantic cap on nested calls. Equal to the control-stack limit by
    /// default; the effective call limit is the smaller of the two.
    pub max_call_depth: usize,
    /// Deadline applied to every LLM invocation.
    pub llm_request_timeout: Duration,
    /// Base URL of the LLM endpoint.
    pub llm_endpoint: String,
    /// Default model identifier.
    pub default_model: String,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1000,
            max_control_depth: 100,
            max_memory_entries: 10_000,
            max_execution_steps: 100_000,
            max_call_depth: 100,
            llm_request_timeout: Duration::from_secs(30),
            llm_endpoint: "http://localhost:11434".to_string(),
            default_model: "llama3.2".to_string(),
        }
    }
}

impl VmConfig {
    /// The tight profile used for sandboxed candidate validation.
    pub fn sandbox() -> Self {
        Self {
            max_stack_size: 100,
            max_control_depth: 20,
            max_memory_entries: 1000,
            max_execution_steps: 1000,
            max_call_depth: 20,
            llm_request_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Rejects unusable configurations. All limits must be positive.
    pub fn validate(&self) -> Result<(), VmError> {
        if self.max_stack_size == 0 {
            return Err(VmError::InvalidConfig {
                option: "max_stack_size",
            });
        }
        if self.max_control_depth == 0 {
            return Err(VmError::InvalidConfig {
                option: "max_control_depth",
            });
        }
        if self.max_memory_entries == 0 {
            return Err(VmError::InvalidConfig {
                option: "max_memory_entries",
            });
        }
        if self.max_execution_steps == 0 {
            return Err(VmError::InvalidConfig {
                option: "max_execution_steps",
            });
        }
        if self.max_call_depth == 0 {
            return Err(VmError::InvalidConfig {
                option: "max_call_depth",
            });
        }
        if self.llm_request_timeout.is_zero() {
            return Err(VmError::InvalidConfig {
                option: "llm_request_timeout",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(VmConfig::default().validate().is_ok());
    }

    #[test]
    fn sandbox_profile() {
        let sandbox = VmConfig::sandbox();
        assert!(sandbox.validate().is_ok());
        assert_eq!(sandbox.max_stack_size, 100);
        assert_eq!(sandbox.max_memory_entries, 1000);
        assert_eq!(sandbox.max_execution_steps, 1000);
        assert_eq!(sandbox.max_call_depth, 20);
        assert_eq!(sandbox.llm_request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_limits_rejected() {
        for (option, config) in [
            (
                "max_stack_size",
                VmConfig {
                    max_stack_size: 0,
                    ..VmConfig::default()
                },
            ),
            (
                "max_control_depth",
                VmConfig {
                    max_control_depth: 0,
                    ..VmConfig::default()
                },
            ),
            (
                "max_memory_entries",
                VmConfig {
                    max_memory_entries: 0,
                    ..VmConfig::default()
                },
            ),
            (
                "max_execution_steps",
                VmConfig {
                    max_execution_steps: 0,
                    ..VmConfig::default()
                },
            ),
            (
                "max_call_depth",
                VmConfig {
                    max_call_depth: 0,
                    ..VmConfig::default()
                },
            ),
            (
                "llm_request_timeout",
                VmConfig {
                    llm_request_timeout: Duration::ZERO,
                    ..VmConfig::default()
                },
            ),
        ] {
            let err = config.validate().unwrap_err();
            assert_eq!(err, VmError::InvalidConfig { option });
        }
    }
}
