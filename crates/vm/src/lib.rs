//! Sovereign virtual machine — dual-stack execution with hard resource
//! bounds and an LLM adapter seam.
//!
//! The VM executes a parsed [`Program`](sovereign_common::Program) with:
//!
//! - A data stack and a control stack with independent caps
//! - A memory map keyed by verbatim address text
//! - Registers `r0`..`r15`
//! - A step budget, cooperative cancellation, and typed errors for every
//!   failure path
//! - An extensible opcode [`Registry`] covering the 32 built-ins
//! - The [`LlmAdapter`] trait, the single suspension point between the
//!   synchronous loop and asynchronous LLM work
//!
//! # Usage
//!
//! ```
//! use sovereign_vm::{Vm, VmConfig};
//!
//! let program = sovereign_assembler::parse("PUSH #10\nPUSH #32\nADD\nHALT").unwrap();
//! let mut vm = Vm::new(VmConfig::default()).unwrap();
//! vm.load(program);
//! vm.run().unwrap();
//! assert_eq!(vm.dump_state().data_stack, vec![sovereign_common::Value::Int(42)]);
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod execute;
pub mod machine;
pub mod registry;

pub use adapter::{AdapterError, LlmAdapter};
pub use config::VmConfig;
pub use error::VmError;
pub use machine::{Frame, StateSnapshot, StepOutcome, Vm};
pub use registry::{Flow, OpDescriptor, OperandSpec, Registry};

use sovereign_common::Program;

/// Convenience: run `program` under `config` and return the final state.
///
/// Used by the evolution sandbox and the CLI; errors are the same typed
/// [`VmError`]s `Vm::run` surfaces, with the failed state discarded.
pub fn run_program(program: &Program, config: VmConfig) -> Result<StateSnapshot, VmError> {
    let mut vm = Vm::new(config)?;
    vm.load(program.clone());
    vm.run()?;
    Ok(vm.dump_state())
}
