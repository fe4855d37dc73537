//! Runtime value representation for the sovereign VM.
//!
//! Values are what live on the data stack, in registers, and in the
//! memory map during execution.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime value representation.
///
/// Arithmetic and logic operations require the `Int` variant; applying
/// them to anything else is a typed runtime failure, never a panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Signed 64-bit integer.
    Int(i64),
    /// Interned string.
    Str(String),
    /// Memory address, kept as the verbatim hexadecimal text of its key.
    /// Two addresses are equal iff their text is equal; no normalization.
    Addr(String),
    /// Label reference by name.
    Label(String),
}

impl Value {
    /// Returns the variant name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Addr(_) => "address",
            Value::Label(_) => "label",
        }
    }

    /// Accounting size of this value, used by the VM's memory-usage counter.
    pub fn size(&self) -> usize {
        match self {
            Value::Int(_) => 8,
            Value::Str(s) => s.len(),
            Value::Addr(a) => a.len(),
            Value::Label(l) => l.len(),
        }
    }

    /// Returns the integer payload, or `None` for non-integer values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, or `None` for non-string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{}\"", crate::operand::escape(s)),
            Value::Addr(a) => write!(f, "@{a}"),
            Value::Label(l) => write!(f, "{l}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
