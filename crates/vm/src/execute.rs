//! Built-in opcode executors and the descriptor table.
//!
//! Executors validate everything they need before the first mutation, so
//! a failing instruction leaves the observable VM state unchanged. Binary
//! operations take left = deeper-in-stack, right = top-of-stack.

use crate::error::VmError;
use crate::machine::Vm;
use crate::registry::{Flow, OpDescriptor, OperandSpec, Registry};
use sovereign_common::{Opcode, Operand, OperandKind, Value, ALL_OPCODES};

const LABEL_ONLY: OperandSpec = OperandSpec::OneOf(&[OperandKind::LabelRef]);
const ADDRESS_ONLY: OperandSpec = OperandSpec::OneOf(&[OperandKind::Address]);
const STRING_ONLY: OperandSpec = OperandSpec::OneOf(&[OperandKind::StringLiteral]);

/// Install all 32 built-in descriptors into `registry`.
pub(crate) fn install_builtins(registry: &mut Registry) {
    for &op in &ALL_OPCODES {
        registry.register(descriptor_for(op));
    }
}

/// First operand, guarded so a custom descriptor wired to the wrong
/// executor fails typed instead of panicking.
fn first_operand<'a>(vm: &Vm, ops: &'a [Operand], op: &str) -> Result<&'a Operand, VmError> {
    ops.first().ok_or_else(|| VmError::OperandMismatch {
        at: vm.at(),
        message: format!("{op} requires an operand"),
    })
}

fn address_operand(vm: &Vm, ops: &[Operand], op: &str) -> Result<String, VmError> {
    match first_operand(vm, ops, op)? {
        Operand::Address(address) => Ok(address.clone()),
        other => Err(VmError::OperandMismatch {
            at: vm.at(),
            message: format!("{op} requires an address, found {}", other.kind().name()),
        }),
    }
}

fn string_operand(vm: &Vm, ops: &[Operand], op: &str) -> Result<String, VmError> {
    match first_operand(vm, ops, op)? {
        Operand::StringLiteral(text) => Ok(text.clone()),
        other => Err(VmError::OperandMismatch {
            at: vm.at(),
            message: format!(
                "{op} requires a string literal, found {}",
                other.kind().name()
            ),
        }),
    }
}

fn descriptor_for(op: Opcode) -> OpDescriptor {
    let (min, max, signature, executor): (usize, usize, Vec<OperandSpec>, _) = match op {
        Opcode::Push => (1, 1, vec![OperandSpec::Any], exec_push as _),
        Opcode::Pop => (0, 0, vec![], exec_pop as _),
        Opcode::Dup => (0, 0, vec![], exec_dup as _),
        Opcode::Swap => (0, 0, vec![], exec_swap as _),
        Opcode::Rot => (0, 0, vec![], exec_rot as _),
        Opcode::Over => (0, 0, vec![], exec_over as _),
        Opcode::Drop => (0, 0, vec![], exec_drop as _),
        Opcode::Clear => (0, 0, vec![], exec_clear as _),
        Opcode::Add => (0, 0, vec![], exec_add as _),
        Opcode::Sub => (0, 0, vec![], exec_sub as _),
        Opcode::Mul => (0, 0, vec![], exec_mul as _),
        Opcode::Div => (0, 0, vec![], exec_div as _),
        Opcode::And => (0, 0, vec![], exec_and as _),
        Opcode::Or => (0, 0, vec![], exec_or as _),
        Opcode::Xor => (0, 0, vec![], exec_xor as _),
        Opcode::Not => (0, 0, vec![], exec_not as _),
        Opcode::Jmp => (1, 1, vec![LABEL_ONLY], exec_jmp as _),
        Opcode::Jz => (1, 1, vec![LABEL_ONLY], exec_jz as _),
        Opcode::Jnz => (1, 1, vec![LABEL_ONLY], exec_jnz as _),
        Opcode::Call => (1, 1, vec![LABEL_ONLY], exec_call as _),
        Opcode::Ret => (0, 0, vec![], exec_ret as _),
        Opcode::Fork => (1, 1, vec![LABEL_ONLY], exec_unimplemented as _),
        Opcode::Join => (0, 0, vec![], exec_unimplemented as _),
        Opcode::Halt => (0, 0, vec![], exec_halt as _),
        Opcode::Load => (1, 1, vec![ADDRESS_ONLY], exec_load as _),
        Opcode::Store => (1, 1, vec![ADDRESS_ONLY], exec_store as _),
        Opcode::FOpen => (1, 1, vec![STRING_ONLY], exec_unimplemented as _),
        Opcode::FRead => (0, 0, vec![], exec_unimplemented as _),
        Opcode::FWrite => (0, 0, vec![], exec_unimplemented as _),
        Opcode::FClose => (0, 0, vec![], exec_unimplemented as _),
        Opcode::LlmGen => (1, 1, vec![STRING_ONLY], exec_llmgen as _),
        Opcode::Evolve => (0, 1, vec![STRING_ONLY], exec_evolve as _),
    };
    OpDescriptor {
        name: op.mnemonic().to_string(),
        category: op.category(),
        min_operands: min,
        max_operands: max,
        signature,
        executor,
    }
}

// ---- stack operations ----

fn exec_push(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let value = vm.operand_value(first_operand(vm, ops, "PUSH")?);
    vm.push_data(value)?;
    Ok(Flow::Advance)
}

fn exec_pop(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.pop_data()?;
    Ok(Flow::Advance)
}

fn exec_dup(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.require_data(1)?;
    vm.require_data_capacity(1)?;
    let top = vm.peek_data(0)?.clone();
    vm.push_data(top)?;
    Ok(Flow::Advance)
}

fn exec_swap(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.require_data(2)?;
    let stack = vm.data_stack_mut();
    let len = stack.len();
    stack.swap(len - 1, len - 2);
    Ok(Flow::Advance)
}

/// (x, y, z) with z on top becomes (z, x, y): the old top sinks two slots.
fn exec_rot(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.require_data(3)?;
    let a = vm.pop_data()?;
    let b = vm.pop_data()?;
    let c = vm.pop_data()?;
    vm.push_data(a)?;
    vm.push_data(c)?;
    vm.push_data(b)?;
    Ok(Flow::Advance)
}

fn exec_over(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.require_data(2)?;
    vm.require_data_capacity(1)?;
    let second = vm.peek_data(1)?.clone();
    vm.push_data(second)?;
    Ok(Flow::Advance)
}

fn exec_drop(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.pop_data()?;
    Ok(Flow::Advance)
}

fn exec_clear(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    vm.clear_data();
    Ok(Flow::Advance)
}

// ---- arithmetic / logic ----

fn exec_add(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let left = vm.int_at(1, "ADD")?;
    let right = vm.int_at(0, "ADD")?;
    let result = left
        .checked_add(right)
        .ok_or(VmError::ArithmeticOverflow { at, op: "ADD" })?;
    vm.pop2_push(Value::Int(result))?;
    Ok(Flow::Advance)
}

fn exec_sub(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let left = vm.int_at(1, "SUB")?;
    let right = vm.int_at(0, "SUB")?;
    let result = left
        .checked_sub(right)
        .ok_or(VmError::ArithmeticOverflow { at, op: "SUB" })?;
    vm.pop2_push(Value::Int(result))?;
    Ok(Flow::Advance)
}

fn exec_mul(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let left = vm.int_at(1, "MUL")?;
    let right = vm.int_at(0, "MUL")?;
    let result = left
        .checked_mul(right)
        .ok_or(VmError::ArithmeticOverflow { at, op: "MUL" })?;
    vm.pop2_push(Value::Int(result))?;
    Ok(Flow::Advance)
}

/// Integer division truncating toward zero. Divisor zero and the lone
/// overflowing case (i64::MIN / -1) are typed failures.
fn exec_div(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let left = vm.int_at(1, "DIV")?;
    let right = vm.int_at(0, "DIV")?;
    if right == 0 {
        return Err(VmError::DivisionByZero { at });
    }
    let result = left
        .checked_div(right)
        .ok_or(VmError::ArithmeticOverflow { at, op: "DIV" })?;
    vm.pop2_push(Value::Int(result))?;
    Ok(Flow::Advance)
}

fn exec_and(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let left = vm.int_at(1, "AND")?;
    let right = vm.int_at(0, "AND")?;
    vm.pop2_push(Value::Int(left & right))?;
    Ok(Flow::Advance)
}

fn exec_or(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let left = vm.int_at(1, "OR")?;
    let right = vm.int_at(0, "OR")?;
    vm.pop2_push(Value::Int(left | right))?;
    Ok(Flow::Advance)
}

fn exec_xor(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let left = vm.int_at(1, "XOR")?;
    let right = vm.int_at(0, "XOR")?;
    vm.pop2_push(Value::Int(left ^ right))?;
    Ok(Flow::Advance)
}

fn exec_not(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let value = vm.int_at(0, "NOT")?;
    vm.pop_data()?;
    vm.push_data(Value::Int(!value))?;
    Ok(Flow::Advance)
}

// ---- control flow ----

fn exec_jmp(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let target = vm.branch_target(first_operand(vm, ops, "JMP")?, "JMP")?;
    vm.set_pc(target);
    Ok(Flow::Jump)
}

/// Conditional jumps consume the test value in both outcomes.
fn exec_jz(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let target = vm.branch_target(first_operand(vm, ops, "JZ")?, "JZ")?;
    let test = vm.int_at(0, "JZ")?;
    vm.pop_data()?;
    if test == 0 {
        vm.set_pc(target);
        Ok(Flow::Jump)
    } else {
        Ok(Flow::Advance)
    }
}

fn exec_jnz(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let target = vm.branch_target(first_operand(vm, ops, "JNZ")?, "JNZ")?;
    let test = vm.int_at(0, "JNZ")?;
    vm.pop_data()?;
    if test != 0 {
        vm.set_pc(target);
        Ok(Flow::Jump)
    } else {
        Ok(Flow::Advance)
    }
}

fn exec_call(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let target = vm.branch_target(first_operand(vm, ops, "CALL")?, "CALL")?;
    let return_pc = vm.at() + 1;
    vm.push_frame(return_pc)?;
    vm.set_pc(target);
    Ok(Flow::Jump)
}

fn exec_ret(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let frame = vm.pop_frame()?;
    vm.set_pc(frame.return_pc);
    Ok(Flow::Jump)
}

fn exec_halt(_vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    Ok(Flow::Halt)
}

/// Shared executor for the reserved mnemonics.
fn exec_unimplemented(vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let mnemonic = vm.current_mnemonic();
    Err(VmError::Unimplemented { at, mnemonic })
}

// ---- memory / IO ----

fn exec_load(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let address = address_operand(vm, ops, "LOAD")?;
    let value = vm.memory_load(&address)?;
    vm.push_data(value)?;
    Ok(Flow::Advance)
}

fn exec_store(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let address = address_operand(vm, ops, "STORE")?;
    vm.require_data(1)?;
    // Reserve the slot before popping so a full memory map leaves the
    // operand on the stack.
    vm.memory_reserve(&address)?;
    let value = vm.pop_data()?;
    vm.memory_store(&address, value)?;
    Ok(Flow::Advance)
}

fn exec_llmgen(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let prompt = string_operand(vm, ops, "LLMGEN")?;
    let adapter = vm.adapter().ok_or_else(|| VmError::LlmUnavailable {
        at,
        reason: "no LLM adapter installed".to_string(),
    })?;
    vm.require_data_capacity(1)?;
    let code = adapter
        .generate(&prompt, vm.llm_timeout())
        .map_err(|e| e.into_vm_error(at))?;
    vm.push_data(Value::Str(code))?;
    Ok(Flow::Advance)
}

/// EVOLVE pops the erroneous code string; the failure description comes
/// from the string-literal operand when present, otherwise from the stack
/// top (with the code beneath it). Pops commit only after the adapter
/// returns a candidate, so faults and timeouts leave the stack unchanged.
fn exec_evolve(vm: &mut Vm, ops: &[Operand]) -> Result<Flow, VmError> {
    let at = vm.at();
    let adapter = vm.adapter().ok_or_else(|| VmError::LlmUnavailable {
        at,
        reason: "no LLM adapter installed".to_string(),
    })?;

    let (error_text, code, consumed) = match ops.first() {
        Some(Operand::StringLiteral(context)) => {
            let code = vm.str_at(0, "EVOLVE")?.to_string();
            (context.clone(), code, 1)
        }
        _ => {
            let error_text = vm.str_at(0, "EVOLVE")?.to_string();
            let code = vm.str_at(1, "EVOLVE")?.to_string();
            (error_text, code, 2)
        }
    };

    let candidate = adapter
        .evolve(&code, &error_text, vm.llm_timeout())
        .map_err(|e| e.into_vm_error(at))?;

    for _ in 0..consumed {
        vm.pop_data()?;
    }
    vm.push_data(Value::Str(candidate))?;
    Ok(Flow::Advance)
}
