//! Instruction operands and their source-text forms.
//!
//! Each operand kind is distinguished by its prefix in assembly text:
//! `r<n>` register, `#<n>` immediate, `@<hex>` address, `"..."` string
//! literal, and a bare lowercase identifier for a label reference.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of general-purpose registers (`r0`..`r15`).
pub const REGISTER_COUNT: u8 = 16;

/// A single instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register reference, index in `0..16`.
    Register(u8),
    /// Signed 64-bit immediate.
    Immediate(i64),
    /// Memory address key; the hex digits are preserved verbatim.
    Address(String),
    /// String literal (unescaped form).
    StringLiteral(String),
    /// Reference to a label by name.
    LabelRef(String),
}

/// The kind of an operand, used by opcode signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Register,
    Immediate,
    Address,
    StringLiteral,
    LabelRef,
}

impl Operand {
    /// Returns the kind of this operand.
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Register,
            Operand::Immediate(_) => OperandKind::Immediate,
            Operand::Address(_) => OperandKind::Address,
            Operand::StringLiteral(_) => OperandKind::StringLiteral,
            Operand::LabelRef(_) => OperandKind::LabelRef,
        }
    }
}

impl OperandKind {
    /// Human-readable name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            OperandKind::Register => "register",
            OperandKind::Immediate => "immediate",
            OperandKind::Address => "address",
            OperandKind::StringLiteral => "string literal",
            OperandKind::LabelRef => "label reference",
        }
    }
}

/// Escape a string for canonical source form (`\\`, `\"`, `\n`, `\t`).
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(n) => write!(f, "r{n}"),
            Operand::Immediate(v) => write!(f, "#{v}"),
            Operand::Address(a) => write!(f, "@{a}"),
            Operand::StringLiteral(s) => write!(f, "\"{}\"", escape(s)),
            Operand::LabelRef(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Operand::Register(0).kind(), OperandKind::Register);
        assert_eq!(Operand::Immediate(-1).kind(), OperandKind::Immediate);
        assert_eq!(Operand::Address("ff".into()).kind(), OperandKind::Address);
        assert_eq!(
            Operand::StringLiteral("x".into()).kind(),
            OperandKind::StringLiteral
        );
        assert_eq!(Operand::LabelRef("x".into()).kind(), OperandKind::LabelRef);
    }

    #[test]
    fn display_register() {
        assert_eq!(Operand::Register(15).to_string(), "r15");
    }

    #[test]
    fn display_immediate_signed() {
        assert_eq!(Operand::Immediate(42).to_string(), "#42");
        assert_eq!(Operand::Immediate(-7).to_string(), "#-7");
    }

    #[test]
    fn display_address_verbatim() {
        assert_eq!(Operand::Address("FF00".into()).to_string(), "@FF00");
        assert_eq!(Operand::Address("0ff".into()).to_string(), "@0ff");
    }

    #[test]
    fn display_string_escapes() {
        let op = Operand::StringLiteral("a\"b\\c\nd\te".into());
        assert_eq!(op.to_string(), "\"a\\\"b\\\\c\\nd\\te\"");
    }

    #[test]
    fn display_label_ref_bare() {
        assert_eq!(Operand::LabelRef("loop".into()).to_string(), "loop");
    }

    #[test]
    fn escape_roundtrip_plain() {
        assert_eq!(escape("plain text"), "plain text");
    }
}
