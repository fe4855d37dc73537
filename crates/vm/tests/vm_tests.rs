//! Integration tests for the sovereign VM: end-to-end programs, bound
//! enforcement under tiny configs, failure-state preservation, registry
//! extension, and property suites.

use proptest::prelude::*;
use sovereign_assembler::parse;
use sovereign_common::{OpCategory, Operand, Value};
use sovereign_vm::{
    AdapterError, Flow, LlmAdapter, OpDescriptor, StepOutcome, Vm, VmConfig, VmError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn vm_with(source: &str, config: VmConfig) -> Vm {
    let program = parse(source).unwrap();
    let mut vm = Vm::new(config).unwrap();
    vm.load(program);
    vm
}

fn run(source: &str) -> Vm {
    let mut vm = vm_with(source, VmConfig::default());
    vm.run().unwrap();
    vm
}

// ---- End-to-end programs ----

#[test]
fn arithmetic_sanity() {
    let vm = run("PUSH #10\nPUSH #32\nADD\nHALT");
    let snapshot = vm.dump_state();
    assert_eq!(snapshot.data_stack, vec![Value::Int(42)]);
    assert!(!snapshot.running);
    assert_eq!(snapshot.error_state, None);
}

#[test]
fn division_by_zero_preserves_operands() {
    let mut vm = vm_with("PUSH #10\nPUSH #0\nDIV\nHALT", VmConfig::default());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::DivisionByZero { at: 2 }));

    let snapshot = vm.dump_state();
    // The failing op left its operands untouched and the PC on DIV.
    assert_eq!(snapshot.data_stack, vec![Value::Int(10), Value::Int(0)]);
    assert_eq!(snapshot.program_counter, 2);
    assert!(!snapshot.running);
    assert!(snapshot.error_state.unwrap().contains("division by zero"));
}

#[test]
fn call_return_discipline() {
    let vm = run("CALL f\nHALT\nf:\nPUSH #7\nRET");
    let snapshot = vm.dump_state();
    assert_eq!(snapshot.data_stack, vec![Value::Int(7)]);
    assert!(snapshot.control_stack.is_empty());
    assert!(!snapshot.running);
}

#[test]
fn step_limit_enforcement() {
    let config = VmConfig {
        max_execution_steps: 4,
        ..VmConfig::default()
    };
    let mut vm = vm_with("loop:\nPUSH #1\nPOP\nJMP loop", config);
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::StepLimitExceeded { steps: 4, limit: 4 }));
    assert_eq!(vm.dump_state().data_stack, vec![]);
}

#[test]
fn memory_roundtrip() {
    let vm = run("PUSH #99\nSTORE @x\nLOAD @x\nHALT");
    let snapshot = vm.dump_state();
    assert_eq!(snapshot.data_stack, vec![Value::Int(99)]);
    assert_eq!(snapshot.memory.len(), 1);
    assert_eq!(snapshot.memory.get("x"), Some(&Value::Int(99)));
}

// ---- Bound enforcement under tiny configs ----

fn tiny() -> VmConfig {
    VmConfig {
        max_stack_size: 3,
        max_control_depth: 2,
        max_memory_entries: 2,
        max_execution_steps: 64,
        max_call_depth: 2,
        ..VmConfig::default()
    }
}

#[test]
fn stack_overflow_checked_before_push() {
    let mut vm = vm_with("PUSH #1\nPUSH #2\nPUSH #3\nPUSH #4", tiny());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::StackOverflow { at: 3, limit: 3 }));
    // Failed push left exactly three values.
    assert_eq!(vm.dump_state().data_stack.len(), 3);
}

#[test]
fn stack_underflow_on_empty_pop() {
    let mut vm = vm_with("POP", tiny());
    let err = vm.run().unwrap_err();
    assert!(matches!(
        err,
        VmError::StackUnderflow {
            at: 0,
            stack: "data"
        }
    ));
}

#[test]
fn call_depth_exceeded() {
    let mut vm = vm_with("f:\nCALL f", tiny());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::CallDepthExceeded { limit: 2, .. }));
    assert_eq!(vm.dump_state().control_stack.len(), 2);
}

#[test]
fn ret_without_call_is_control_underflow() {
    let mut vm = vm_with("RET", tiny());
    let err = vm.run().unwrap_err();
    assert!(matches!(
        err,
        VmError::StackUnderflow {
            stack: "control",
            ..
        }
    ));
}

#[test]
fn memory_limit_exceeded_leaves_operand() {
    let source = "PUSH #1\nSTORE @a\nPUSH #2\nSTORE @b\nPUSH #3\nSTORE @c";
    let mut vm = vm_with(source, tiny());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::MemoryLimitExceeded { limit: 2, .. }));
    let snapshot = vm.dump_state();
    assert_eq!(snapshot.memory.len(), 2);
    // The value that could not be stored is still on the stack.
    assert_eq!(snapshot.data_stack, vec![Value::Int(3)]);
}

#[test]
fn overwriting_store_is_not_a_new_entry() {
    let source = "PUSH #1\nSTORE @a\nPUSH #2\nSTORE @b\nPUSH #3\nSTORE @a";
    let mut vm = vm_with(source, tiny());
    vm.run().unwrap();
    assert_eq!(vm.dump_state().memory.get("a"), Some(&Value::Int(3)));
}

// ---- Dispatch errors ----

#[test]
fn unknown_opcode_at_dispatch() {
    let mut vm = vm_with("FROB #1", VmConfig::default());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::UnknownOpcode { at: 0, .. }));
}

#[test]
fn operand_arity_mismatch() {
    let mut vm = vm_with("PUSH", VmConfig::default());
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::OperandMismatch { .. }));
}

#[test]
fn operand_kind_mismatch() {
    // JMP requires a label reference; the registry rejects an address.
    // Only reachable through a hand-built program, so build one.
    let bad = sovereign_common::Program::new(
        vec![sovereign_common::Instruction::new(
            "JMP",
            vec![Operand::Address("ff".into())],
        )],
        std::collections::BTreeMap::new(),
    );
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(bad);
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::OperandMismatch { .. }));
}

#[test]
fn undefined_label_reachable_only_for_hand_built_programs() {
    let bad = sovereign_common::Program::new(
        vec![sovereign_common::Instruction::new(
            "JMP",
            vec![Operand::LabelRef("ghost".into())],
        )],
        std::collections::BTreeMap::new(),
    );
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    vm.load(bad);
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::UndefinedLabel { at: 0, .. }));
}

// ---- Cancellation ----

#[test]
fn cancel_flag_fails_at_dispatch_boundary() {
    let mut vm = vm_with("loop:\nPUSH #1\nPOP\nJMP loop", VmConfig::default());
    vm.cancel_handle().store(true, Ordering::Relaxed);
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::Cancelled { at: 0 }));
    // Partial state remains inspectable.
    let snapshot = vm.dump_state();
    assert!(!snapshot.running);
    assert!(snapshot.error_state.unwrap().contains("cancelled"));
}

// ---- step() outcomes ----

#[test]
fn step_reports_running_halted_finished() {
    let mut vm = vm_with("PUSH #1\nHALT", VmConfig::default());
    assert_eq!(vm.step().unwrap(), StepOutcome::Running);
    assert_eq!(vm.step().unwrap(), StepOutcome::Halted);

    let mut vm = vm_with("PUSH #1", VmConfig::default());
    assert_eq!(vm.step().unwrap(), StepOutcome::Running);
    assert_eq!(vm.step().unwrap(), StepOutcome::Finished);
}

#[test]
fn reset_clears_program_and_state() {
    let mut vm = run("PUSH #1\nSTORE @k");
    vm.reset();
    let snapshot = vm.dump_state();
    assert!(snapshot.data_stack.is_empty());
    assert!(snapshot.memory.is_empty());
    assert_eq!(snapshot.steps, 0);
    // Nothing left to execute.
    assert_eq!(vm.step().unwrap(), StepOutcome::Finished);
}

// ---- Registry extension ----

#[test]
fn runtime_registered_descriptor_dispatches() {
    let mut vm = vm_with("NOOPX\nPUSH #1", VmConfig::default());
    vm.registry_mut().register(OpDescriptor {
        name: "noopx".into(),
        category: OpCategory::Stack,
        min_operands: 0,
        max_operands: 0,
        signature: vec![],
        executor: |_vm, _ops| Ok(Flow::Advance),
    });
    vm.run().unwrap();
    assert_eq!(vm.dump_state().data_stack, vec![Value::Int(1)]);
}

// ---- LLM opcodes against a mock adapter ----

struct MockAdapter {
    reply: Result<String, AdapterError>,
}

impl LlmAdapter for MockAdapter {
    fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, AdapterError> {
        self.reply.clone()
    }

    fn evolve(
        &self,
        _code: &str,
        _error_text: &str,
        _timeout: Duration,
    ) -> Result<String, AdapterError> {
        self.reply.clone()
    }
}

fn adapter(reply: Result<&str, AdapterError>) -> Arc<MockAdapter> {
    Arc::new(MockAdapter {
        reply: reply.map(str::to_string),
    })
}

#[test]
fn llmgen_pushes_generated_code() {
    let mut vm = vm_with("LLMGEN \"add two numbers\"\nHALT", VmConfig::default());
    vm.set_adapter(adapter(Ok("PUSH #1\nPUSH #1\nADD\nHALT")));
    vm.run().unwrap();
    assert_eq!(
        vm.dump_state().data_stack,
        vec![Value::Str("PUSH #1\nPUSH #1\nADD\nHALT".into())]
    );
}

#[test]
fn evolve_with_operand_context_pops_code_pushes_candidate() {
    let mut vm = vm_with(
        "PUSH \"PUSH #10\\nPUSH #0\\nDIV\\nHALT\"\nEVOLVE \"Division by zero\"\nHALT",
        VmConfig::default(),
    );
    vm.set_adapter(adapter(Ok("PUSH #1\nPUSH #1\nADD\nHALT")));
    vm.run().unwrap();
    assert_eq!(
        vm.dump_state().data_stack,
        vec![Value::Str("PUSH #1\nPUSH #1\nADD\nHALT".into())]
    );
}

#[test]
fn evolve_without_operand_pops_description_then_code() {
    let mut vm = vm_with(
        "PUSH \"bad code\"\nPUSH \"stack underflow\"\nEVOLVE\nHALT",
        VmConfig::default(),
    );
    vm.set_adapter(adapter(Ok("fixed")));
    vm.run().unwrap();
    assert_eq!(vm.dump_state().data_stack, vec![Value::Str("fixed".into())]);
}

#[test]
fn llm_timeout_rolls_back_operand_stack() {
    let mut vm = vm_with(
        "PUSH \"bad code\"\nEVOLVE \"stack underflow\"",
        VmConfig::default(),
    );
    vm.set_adapter(adapter(Err(AdapterError::Timeout(Duration::from_secs(30)))));
    let err = vm.run().unwrap_err();
    assert!(matches!(err, VmError::LlmTimeout { at: 1, .. }));
    // No partial pushes; the operand is exactly as before the instruction.
    assert_eq!(
        vm.dump_state().data_stack,
        vec![Value::Str("bad code".into())]
    );
}

#[test]
fn llm_malformed_and_failed_map_to_kinds() {
    let mut vm = vm_with("LLMGEN \"x\"", VmConfig::default());
    vm.set_adapter(adapter(Err(AdapterError::Malformed("not json".into()))));
    assert!(matches!(
        vm.run().unwrap_err(),
        VmError::LlmMalformed { .. }
    ));

    let mut vm = vm_with("PUSH \"c\"\nEVOLVE \"e\"", VmConfig::default());
    vm.set_adapter(adapter(Err(AdapterError::Failed(
        "no candidate passed validation".into(),
    ))));
    assert!(matches!(
        vm.run().unwrap_err(),
        VmError::EvolutionFailed { .. }
    ));
}

// ---- Failure-state preservation ----

#[test]
fn failing_instruction_preserves_observable_state() {
    // Set up some state, then fail in different ways; everything except
    // error_state, running, and the step counter must be unchanged.
    let cases = [
        "PUSH #5\nSTORE @m\nPUSH #1\nLOAD @nope",
        "PUSH #5\nSTORE @m\nPUSH #1\nFREAD",
        "PUSH #5\nSTORE @m\nPUSH #1\nRET",
        "PUSH #5\nSTORE @m\nPUSH #1\nFROB",
    ];
    for source in cases {
        let mut vm = vm_with(source, VmConfig::default());
        let err = vm.run().unwrap_err();
        let after = vm.dump_state();
        assert_eq!(after.data_stack, vec![Value::Int(1)], "{source}");
        assert_eq!(after.memory.get("m"), Some(&Value::Int(5)), "{source}");
        assert!(after.control_stack.is_empty(), "{source}");
        assert_eq!(after.program_counter, 3, "{source}: pc on failing instr");
        assert!(!after.running);
        assert_eq!(after.error_state, Some(err.to_string()));
    }
}

// ---- Property suites ----

proptest! {
    /// n pushes followed by n pops return values in reverse order.
    #[test]
    fn lifo_discipline(values in proptest::collection::vec(any::<i64>(), 1..50)) {
        let mut source = String::new();
        for v in &values {
            source.push_str(&format!("PUSH #{v}\n"));
        }
        let mut vm = vm_with(&source, VmConfig::default());
        vm.run().unwrap();

        let snapshot = vm.dump_state();
        let expected: Vec<Value> = values.iter().map(|&v| Value::Int(v)).collect();
        prop_assert_eq!(snapshot.data_stack, expected);
    }

    /// Random stack/arithmetic programs under a tiny config never exceed
    /// the caps at any dispatched step, and fail only into the taxonomy.
    #[test]
    fn bounded_fuzz_stays_within_caps(
        ops in proptest::collection::vec(0u8..7, 0..40),
    ) {
        let mut source = String::new();
        for op in &ops {
            source.push_str(match op {
                0 => "PUSH #3\n",
                1 => "PUSH #-2\n",
                2 => "ADD\n",
                3 => "MUL\n",
                4 => "DUP\n",
                5 => "SWAP\n",
                _ => "POP\n",
            });
        }
        let config = VmConfig {
            max_stack_size: 4,
            max_control_depth: 2,
            max_memory_entries: 2,
            max_execution_steps: 32,
            max_call_depth: 2,
            ..VmConfig::default()
        };
        let mut vm = vm_with(&source, config.clone());

        loop {
            match vm.step() {
                Ok(StepOutcome::Running) => {}
                Ok(_) => break,
                Err(err) => {
                    let kind = err.kind();
                    prop_assert!(
                        matches!(
                            kind,
                            "StackUnderflow" | "StackOverflow" | "OperandMismatch"
                                | "ArithmeticOverflow" | "StepLimitExceeded"
                        ),
                        "unexpected kind {kind}"
                    );
                    break;
                }
            }
            let snapshot = vm.dump_state();
            prop_assert!(snapshot.data_stack.len() <= config.max_stack_size);
            prop_assert!(snapshot.control_stack.len() <= config.max_control_depth);
            prop_assert!(snapshot.memory.len() <= config.max_memory_entries);
            prop_assert!(snapshot.steps <= config.max_execution_steps);
        }
    }

    /// Well-structured CALL/RET graphs leave the control stack balanced.
    #[test]
    fn balanced_call_graphs(calls in proptest::collection::vec(0usize..4, 0..12)) {
        // Four leaf functions, then a main section invoking them.
        let mut source = String::from("JMP main\n");
        for f in 0..4 {
            source.push_str(&format!("f{f}:\nPUSH #{f}\nPOP\nRET\n"));
        }
        source.push_str("main:\n");
        for f in &calls {
            source.push_str(&format!("CALL f{f}\n"));
        }
        source.push_str("HALT\n");

        let mut vm = vm_with(&source, VmConfig::default());
        vm.run().unwrap();
        let snapshot = vm.dump_state();
        prop_assert!(snapshot.control_stack.is_empty());
        prop_assert!(snapshot.data_stack.is_empty());
        prop_assert!(!snapshot.running);
    }
}
