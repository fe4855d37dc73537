//! VM state management and the fetch-decode-execute loop.
//!
//! Execution is strictly single-threaded and synchronous; the only
//! suspension point is the LLM adapter, reached from the `LLMGEN` and
//! `EVOLVE` executors. Every resource cap is checked on the path that
//! would exceed it, and a failing instruction leaves the observable state
//! untouched apart from `error_state`, `running`, and the step counter.

use crate::adapter::LlmAdapter;
use crate::config::VmConfig;
use crate::error::VmError;
use crate::registry::{Flow, Registry};
use serde::Serialize;
use sovereign_common::{Operand, Program, Value, REGISTER_COUNT};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A control-stack frame. Carries only the return program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Instruction index to resume at after RET.
    pub return_pc: usize,
}

/// Outcome of a single [`Vm::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An instruction executed; more remain.
    Running,
    /// HALT executed; `running` is now false.
    Halted,
    /// The program counter reached the program length (natural termination).
    Finished,
}

/// Complete mutable state of a VM, created fresh per `run` call.
#[derive(Debug, Clone)]
pub(crate) struct VmState {
    pub data_stack: Vec<Value>,
    pub control_stack: Vec<Frame>,
    pub memory: BTreeMap<String, Value>,
    pub registers: Vec<Value>,
    pub pc: usize,
    pub running: bool,
    pub error_state: Option<String>,
    pub steps: u64,
    pub memory_usage: usize,
}

impl VmState {
    fn new() -> Self {
        Self {
            data_stack: Vec::new(),
            control_stack: Vec::new(),
            memory: BTreeMap::new(),
            registers: vec![Value::Int(0); REGISTER_COUNT as usize],
            pc: 0,
            running: false,
            error_state: None,
            steps: 0,
            memory_usage: 0,
        }
    }
}

/// Deep-copy snapshot of VM state, for debugging and test assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub data_stack: Vec<Value>,
    pub control_stack: Vec<Frame>,
    pub memory: BTreeMap<String, Value>,
    pub registers: Vec<Value>,
    pub program_counter: usize,
    pub running: bool,
    pub error_state: Option<String>,
    pub steps: u64,
    pub memory_usage: usize,
}

/// The sovereign virtual machine.
pub struct Vm {
    config: VmConfig,
    registry: Registry,
    program: Arc<Program>,
    state: VmState,
    adapter: Option<Arc<dyn LlmAdapter>>,
    cancel: Arc<AtomicBool>,
}

impl Vm {
    /// Create a VM with the built-in registry. Rejects invalid configs.
    pub fn new(config: VmConfig) -> Result<Self, VmError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Registry::with_builtins(),
            program: Arc::new(Program::default()),
            state: VmState::new(),
            adapter: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Load a program and reset execution position. The program is
    /// consumed read-only; previous state (stacks, memory) is cleared.
    pub fn load(&mut self, program: Program) {
        debug!(instructions = program.len(), "program loaded");
        self.program = Arc::new(program);
        self.state = VmState::new();
    }

    /// Install the LLM adapter used by `LLMGEN` and `EVOLVE`.
    pub fn set_adapter(&mut self, adapter: Arc<dyn LlmAdapter>) {
        self.adapter = Some(adapter);
    }

    /// Handle for cooperative cancellation; setting it to true makes the
    /// next dispatch fail with `Cancelled`. Partial state stays inspectable.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The active configuration.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The opcode registry, for runtime extension.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Run the loaded program to completion: natural termination, HALT,
    /// or a typed error. State is created fresh for each call.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.state = VmState::new();
        self.state.running = true;
        debug!(instructions = self.program.len(), "run started");
        loop {
            match self.step()? {
                StepOutcome::Running => {}
                StepOutcome::Halted | StepOutcome::Finished => {
                    debug!(steps = self.state.steps, "run finished");
                    return Ok(());
                }
            }
        }
    }

    /// Execute one dispatch. On error the VM stops (`running = false`,
    /// `error_state` populated) and the program counter stays on the
    /// failing instruction.
    pub fn step(&mut self) -> Result<StepOutcome, VmError> {
        if self.state.pc >= self.program.len() {
            self.state.running = false;
            return Ok(StepOutcome::Finished);
        }
        match self.dispatch_one() {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.state.error_state = Some(error.to_string());
                self.state.running = false;
                Err(error)
            }
        }
    }

    fn dispatch_one(&mut self) -> Result<StepOutcome, VmError> {
        let at = self.state.pc;

        if self.cancel.load(Ordering::Relaxed) {
            return Err(VmError::Cancelled { at });
        }

        self.state.steps += 1;
        if self.state.steps >= self.config.max_execution_steps {
            return Err(VmError::StepLimitExceeded {
                steps: self.state.steps,
                limit: self.config.max_execution_steps,
            });
        }

        let program = Arc::clone(&self.program);
        let instr = program
            .get(at)
            .expect("pc bounds checked by step")
            .clone();
        trace!(pc = at, instruction = %instr, "dispatch");

        let executor = {
            let descriptor =
                self.registry
                    .get(&instr.mnemonic)
                    .ok_or_else(|| VmError::UnknownOpcode {
                        at,
                        mnemonic: instr.mnemonic.clone(),
                    })?;
            descriptor.check_operands(&instr, at)?;
            descriptor.executor
        };

        match executor(self, &instr.operands)? {
            Flow::Advance => {
                self.state.pc += 1;
                Ok(StepOutcome::Running)
            }
            Flow::Jump => Ok(StepOutcome::Running),
            Flow::Halt => {
                self.state.running = false;
                Ok(StepOutcome::Halted)
            }
        }
    }

    /// Reset to an equivalent-to-new value: empty state, no program.
    pub fn reset(&mut self) {
        self.program = Arc::new(Program::default());
        self.state = VmState::new();
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Snapshot the complete state for debugging and assertions.
    pub fn dump_state(&self) -> StateSnapshot {
        StateSnapshot {
            data_stack: self.state.data_stack.clone(),
            control_stack: self.state.control_stack.clone(),
            memory: self.state.memory.clone(),
            registers: self.state.registers.clone(),
            program_counter: self.state.pc,
            running: self.state.running,
            error_state: self.state.error_state.clone(),
            steps: self.state.steps,
            memory_usage: self.state.memory_usage,
        }
    }

    // ---- helpers for executors (crate-visible) ----

    pub(crate) fn at(&self) -> usize {
        self.state.pc
    }

    pub(crate) fn set_pc(&mut self, pc: usize) {
        self.state.pc = pc;
    }

    pub(crate) fn adapter(&self) -> Option<Arc<dyn LlmAdapter>> {
        self.adapter.clone()
    }

    pub(crate) fn llm_timeout(&self) -> std::time::Duration {
        self.config.llm_request_timeout
    }

    /// Push onto the data stack, failing before mutation if at capacity.
    pub(crate) fn push_data(&mut self, value: Value) -> Result<(), VmError> {
        if self.state.data_stack.len() >= self.config.max_stack_size {
            return Err(VmError::StackOverflow {
                at: self.at(),
                limit: self.config.max_stack_size,
            });
        }
        self.state.memory_usage += value.size();
        self.state.data_stack.push(value);
        Ok(())
    }

    /// Pop from the data stack.
    pub(crate) fn pop_data(&mut self) -> Result<Value, VmError> {
        let value = self
            .state
            .data_stack
            .pop()
            .ok_or(VmError::StackUnderflow {
                at: self.state.pc,
                stack: "data",
            })?;
        self.state.memory_usage = self.state.memory_usage.saturating_sub(value.size());
        Ok(value)
    }

    /// Fail unless the data stack holds at least `depth` values.
    pub(crate) fn require_data(&self, depth: usize) -> Result<(), VmError> {
        if self.state.data_stack.len() < depth {
            return Err(VmError::StackUnderflow {
                at: self.at(),
                stack: "data",
            });
        }
        Ok(())
    }

    /// Fail unless `extra` more pushes would stay within the stack cap.
    pub(crate) fn require_data_capacity(&self, extra: usize) -> Result<(), VmError> {
        if self.state.data_stack.len() + extra > self.config.max_stack_size {
            return Err(VmError::StackOverflow {
                at: self.at(),
                limit: self.config.max_stack_size,
            });
        }
        Ok(())
    }

    /// The value `depth` entries below the top (0 = top), without popping.
    pub(crate) fn peek_data(&self, depth: usize) -> Result<&Value, VmError> {
        let len = self.state.data_stack.len();
        if depth >= len {
            return Err(VmError::StackUnderflow {
                at: self.at(),
                stack: "data",
            });
        }
        Ok(&self.state.data_stack[len - 1 - depth])
    }

    /// Integer at `depth`, or a typed mismatch naming `op`.
    pub(crate) fn int_at(&self, depth: usize, op: &str) -> Result<i64, VmError> {
        let value = self.peek_data(depth)?;
        value.as_int().ok_or_else(|| VmError::OperandMismatch {
            at: self.at(),
            message: format!("{op} requires an integer, found {}", value.kind_name()),
        })
    }

    /// String at `depth`, or a typed mismatch naming `op`.
    pub(crate) fn str_at(&self, depth: usize, op: &str) -> Result<&str, VmError> {
        let at = self.at();
        let value = self.peek_data(depth)?;
        match value {
            Value::Str(s) => Ok(s),
            other => Err(VmError::OperandMismatch {
                at,
                message: format!("{op} requires a string, found {}", other.kind_name()),
            }),
        }
    }

    /// Pop two operands and push the result. Callers validate first, so
    /// this cannot fail mid-way.
    pub(crate) fn pop2_push(&mut self, result: Value) -> Result<(), VmError> {
        self.pop_data()?;
        self.pop_data()?;
        self.push_data(result)
    }

    /// In-place access for SWAP.
    pub(crate) fn data_stack_mut(&mut self) -> &mut Vec<Value> {
        &mut self.state.data_stack
    }

    /// Drop every data-stack value.
    pub(crate) fn clear_data(&mut self) {
        let freed: usize = self.state.data_stack.iter().map(Value::size).sum();
        self.state.memory_usage = self.state.memory_usage.saturating_sub(freed);
        self.state.data_stack.clear();
    }

    /// Push a call frame, enforcing both the control-stack and call-depth
    /// caps (the effective limit is the smaller of the two).
    pub(crate) fn push_frame(&mut self, return_pc: usize) -> Result<(), VmError> {
        let limit = self.config.max_control_depth.min(self.config.max_call_depth);
        if self.state.control_stack.len() >= limit {
            return Err(VmError::CallDepthExceeded {
                at: self.at(),
                limit,
            });
        }
        self.state.control_stack.push(Frame { return_pc });
        Ok(())
    }

    /// Pop a call frame.
    pub(crate) fn pop_frame(&mut self) -> Result<Frame, VmError> {
        self.state
            .control_stack
            .pop()
            .ok_or(VmError::StackUnderflow {
                at: self.state.pc,
                stack: "control",
            })
    }

    /// Read memory, failing `InvalidAddress` when the key is absent.
    pub(crate) fn memory_load(&self, address: &str) -> Result<Value, VmError> {
        self.state
            .memory
            .get(address)
            .cloned()
            .ok_or_else(|| VmError::InvalidAddress {
                at: self.at(),
                address: address.to_string(),
            })
    }

    /// Mnemonic of the instruction at the current program counter.
    pub(crate) fn current_mnemonic(&self) -> String {
        self.program
            .get(self.state.pc)
            .map(|i| i.mnemonic.clone())
            .unwrap_or_default()
    }

    /// Fail `MemoryLimitExceeded` if writing `address` would add a new key
    /// beyond the entry cap. Checks only; no mutation.
    pub(crate) fn memory_reserve(&self, address: &str) -> Result<(), VmError> {
        if !self.state.memory.contains_key(address)
            && self.state.memory.len() >= self.config.max_memory_entries
        {
            return Err(VmError::MemoryLimitExceeded {
                at: self.at(),
                limit: self.config.max_memory_entries,
            });
        }
        Ok(())
    }

    /// Write memory, enforcing the entry cap for new keys.
    pub(crate) fn memory_store(&mut self, address: &str, value: Value) -> Result<(), VmError> {
        let existing = self.state.memory.get(address).map(Value::size);
        if existing.is_none() && self.state.memory.len() >= self.config.max_memory_entries {
            return Err(VmError::MemoryLimitExceeded {
                at: self.at(),
                limit: self.config.max_memory_entries,
            });
        }
        self.state.memory_usage = self
            .state
            .memory_usage
            .saturating_sub(existing.unwrap_or(0))
            + value.size();
        self.state.memory.insert(address.to_string(), value);
        Ok(())
    }

    /// Decode an operand to a runtime value. Registers read their current
    /// contents (default 0); label references stay textual.
    pub(crate) fn operand_value(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Register(n) => self
                .state
                .registers
                .get(*n as usize)
                .cloned()
                .unwrap_or(Value::Int(0)),
            Operand::Immediate(v) => Value::Int(*v),
            Operand::Address(a) => Value::Addr(a.clone()),
            Operand::StringLiteral(s) => Value::Str(s.clone()),
            Operand::LabelRef(name) => Value::Label(name.clone()),
        }
    }

    /// Resolve a control-flow target. Built-in targets were validated at
    /// parse time; `UndefinedLabel` remains reachable for hand-built
    /// programs and custom descriptors.
    pub(crate) fn branch_target(&self, operand: &Operand, op: &str) -> Result<usize, VmError> {
        match operand {
            Operand::LabelRef(name) => {
                self.program
                    .label_index(name)
                    .ok_or_else(|| VmError::UndefinedLabel {
                        at: self.at(),
                        label: name.clone(),
                    })
            }
            other => Err(VmError::OperandMismatch {
                at: self.at(),
                message: format!(
                    "{op} requires a label reference, found {}",
                    other.kind().name()
                ),
            }),
        }
    }
}
