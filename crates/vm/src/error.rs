//! Runtime errors for the sovereign VM.
//!
//! Every variant carries a machine-readable kind (the variant itself,
//! mirrored by [`VmError::kind`]) plus enough context for a human message.
//! Variants that arise mid-execution carry `at`, the index of the
//! instruction that failed; the VM leaves the program counter pointing
//! there when it stops.

use std::time::Duration;
use thiserror::Error;

/// Errors that occur during program execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The registry has no descriptor for the fetched mnemonic.
    #[error("unknown opcode '{mnemonic}' at instruction {at}")]
    UnknownOpcode { at: usize, mnemonic: String },

    /// Operand arity or kind does not match the descriptor's signature,
    /// or a stack value has the wrong type for the operation.
    #[error("{message} at instruction {at}")]
    OperandMismatch { at: usize, message: String },

    /// A reserved mnemonic was executed.
    #[error("'{mnemonic}' is reserved and not implemented, at instruction {at}")]
    Unimplemented { at: usize, mnemonic: String },

    /// Pop or read from an empty stack. `stack` is "data" or "control".
    #[error("{stack} stack underflow at instruction {at}")]
    StackUnderflow { at: usize, stack: &'static str },

    /// Push onto a data stack already at capacity.
    #[error("data stack overflow (limit {limit}) at instruction {at}")]
    StackOverflow { at: usize, limit: usize },

    /// CALL would exceed the control-stack or call-depth limit.
    #[error("call depth limit {limit} exceeded at instruction {at}")]
    CallDepthExceeded { at: usize, limit: usize },

    /// STORE of a new key would exceed the memory-entry limit.
    #[error("memory limit {limit} exceeded at instruction {at}")]
    MemoryLimitExceeded { at: usize, limit: usize },

    /// LOAD from an address that holds no value.
    #[error("invalid address '@{address}' at instruction {at}")]
    InvalidAddress { at: usize, address: String },

    /// Integer division by zero.
    #[error("division by zero at instruction {at}")]
    DivisionByZero { at: usize },

    /// Arithmetic result does not fit in i64. Wrapping is not permitted.
    #[error("arithmetic overflow in {op} at instruction {at}")]
    ArithmeticOverflow { at: usize, op: &'static str },

    /// A label reference that did not resolve at runtime. Unreachable for
    /// built-in opcodes (the parser resolves those at load time); reachable
    /// only through runtime-registered descriptors or hand-built programs.
    #[error("undefined label '{label}' at instruction {at}")]
    UndefinedLabel { at: usize, label: String },

    /// The execution-step budget for this run was exhausted.
    #[error("execution exceeded maximum of {limit} steps (at step {steps})")]
    StepLimitExceeded { steps: u64, limit: u64 },

    /// The caller's cancel flag was observed at a dispatch boundary.
    #[error("execution cancelled at instruction {at}")]
    Cancelled { at: usize },

    /// No LLM adapter installed, or the adapter reported the service down.
    #[error("LLM unavailable at instruction {at}: {reason}")]
    LlmUnavailable { at: usize, reason: String },

    /// The bounded wait on an LLM operation expired.
    #[error("LLM request timed out after {timeout:?} at instruction {at}")]
    LlmTimeout { at: usize, timeout: Duration },

    /// The LLM reply could not be interpreted.
    #[error("malformed LLM response at instruction {at}: {reason}")]
    LlmMalformed { at: usize, reason: String },

    /// EVOLVE produced no candidate that passed sandbox validation.
    #[error("evolution failed at instruction {at}: {reason}")]
    EvolutionFailed { at: usize, reason: String },

    /// A VmConfig limit was zero or otherwise unusable.
    #[error("invalid configuration: {option} must be positive")]
    InvalidConfig { option: &'static str },
}

impl VmError {
    /// Stable kind tag for logs and error-pattern categorization.
    pub fn kind(&self) -> &'static str {
        match self {
            VmError::UnknownOpcode { .. } => "UnknownOpcode",
            VmError::OperandMismatch { .. } => "OperandMismatch",
            VmError::Unimplemented { .. } => "Unimplemented",
            VmError::StackUnderflow { .. } => "StackUnderflow",
            VmError::StackOverflow { .. } => "StackOverflow",
            VmError::CallDepthExceeded { .. } => "CallDepthExceeded",
            VmError::MemoryLimitExceeded { .. } => "MemoryLimitExceeded",
            VmError::InvalidAddress { .. } => "InvalidAddress",
            VmError::DivisionByZero { .. } => "DivisionByZero",
            VmError::ArithmeticOverflow { .. } => "ArithmeticOverflow",
            VmError::UndefinedLabel { .. } => "UndefinedLabel",
            VmError::StepLimitExceeded { .. } => "StepLimitExceeded",
            VmError::Cancelled { .. } => "Cancelled",
            VmError::LlmUnavailable { .. } => "LLMUnavailable",
            VmError::LlmTimeout { .. } => "LLMTimeout",
            VmError::LlmMalformed { .. } => "LLMMalformed",
            VmError::EvolutionFailed { .. } => "EvolutionFailed",
            VmError::InvalidConfig { .. } => "InvalidConfig",
        }
    }
}
