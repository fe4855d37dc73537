//! Opcode definitions for the sovereign instruction set.
//!
//! The base instruction set is 32 mnemonics in 4 categories of 8:
//! stack manipulation, arithmetic/logic, control flow, and memory/IO.
//! The reserved mnemonics (`FORK`, `JOIN`, and the four file ops) parse
//! normally and fail with an unimplemented error when executed.

/// Categories of opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    Stack,
    Arithmetic,
    Control,
    Memory,
}

impl OpCategory {
    /// Lowercase category name used in listings.
    pub fn name(&self) -> &'static str {
        match self {
            OpCategory::Stack => "stack",
            OpCategory::Arithmetic => "arithmetic",
            OpCategory::Control => "control",
            OpCategory::Memory => "memory",
        }
    }
}

/// Identifies a built-in operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Stack
    Push,
    Pop,
    Dup,
    Swap,
    Rot,
    Over,
    Drop,
    Clear,
    // Arithmetic / logic
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
    // Control flow
    Jmp,
    Jz,
    Jnz,
    Call,
    Ret,
    Fork,
    Join,
    Halt,
    // Memory / IO
    Load,
    Store,
    FOpen,
    FRead,
    FWrite,
    FClose,
    LlmGen,
    Evolve,
}

/// All built-in opcodes, in definition order. Useful for exhaustive testing
/// and for constructing the default registry.
pub const ALL_OPCODES: [Opcode; 32] = [
    Opcode::Push,
    Opcode::Pop,
    Opcode::Dup,
    Opcode::Swap,
    Opcode::Rot,
    Opcode::Over,
    Opcode::Drop,
    Opcode::Clear,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Not,
    Opcode::Jmp,
    Opcode::Jz,
    Opcode::Jnz,
    Opcode::Call,
    Opcode::Ret,
    Opcode::Fork,
    Opcode::Join,
    Opcode::Halt,
    Opcode::Load,
    Opcode::Store,
    Opcode::FOpen,
    Opcode::FRead,
    Opcode::FWrite,
    Opcode::FClose,
    Opcode::LlmGen,
    Opcode::Evolve,
];

impl Opcode {
    /// Returns the canonical uppercase mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::Rot => "ROT",
            Opcode::Over => "OVER",
            Opcode::Drop => "DROP",
            Opcode::Clear => "CLEAR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Not => "NOT",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Fork => "FORK",
            Opcode::Join => "JOIN",
            Opcode::Halt => "HALT",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::FOpen => "FOPEN",
            Opcode::FRead => "FREAD",
            Opcode::FWrite => "FWRITE",
            Opcode::FClose => "FCLOSE",
            Opcode::LlmGen => "LLMGEN",
            Opcode::Evolve => "EVOLVE",
        }
    }

    /// Returns the category this opcode belongs to.
    pub fn category(&self) -> OpCategory {
        match self {
            Opcode::Push
            | Opcode::Pop
            | Opcode::Dup
            | Opcode::Swap
            | Opcode::Rot
            | Opcode::Over
            | Opcode::Drop
            | Opcode::Clear => OpCategory::Stack,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Not => OpCategory::Arithmetic,
            Opcode::Jmp
            | Opcode::Jz
            | Opcode::Jnz
            | Opcode::Call
            | Opcode::Ret
            | Opcode::Fork
            | Opcode::Join
            | Opcode::Halt => OpCategory::Control,
            Opcode::Load
            | Opcode::Store
            | Opcode::FOpen
            | Opcode::FRead
            | Opcode::FWrite
            | Opcode::FClose
            | Opcode::LlmGen
            | Opcode::Evolve => OpCategory::Memory,
        }
    }

    /// Looks up an opcode by mnemonic, case-insensitively.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        let upper = name.to_ascii_uppercase();
        ALL_OPCODES.iter().find(|op| op.mnemonic() == upper).copied()
    }

    /// True for mnemonics that are reserved but not implemented.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Opcode::Fork
                | Opcode::Join
                | Opcode::FOpen
                | Opcode::FRead
                | Opcode::FWrite
                | Opcode::FClose
        )
    }
}
