//! Instruction representation: an uppercase mnemonic plus its operands.

use crate::operand::Operand;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single parsed instruction.
///
/// The mnemonic is stored canonicalized to uppercase; operands preserve
/// their source order. Instructions compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Canonical uppercase mnemonic.
    pub mnemonic: String,
    /// Operands in source order.
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Create a new instruction, canonicalizing the mnemonic to uppercase.
    pub fn new(mnemonic: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            mnemonic: mnemonic.into().to_ascii_uppercase(),
            operands,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for op in &self.operands {
            write!(f, " {op}")?;
        }
        Ok(())
    }
}
