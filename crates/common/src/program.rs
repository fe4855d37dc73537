//! Program representation: an ordered instruction list plus a label map.
//!
//! A `Program` is immutable after parsing. Labels map to the index of the
//! instruction that follows them; a label at the very end of the source
//! maps to `len()`, i.e. natural termination.

use crate::instruction::Instruction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete program: instructions in source order and resolved labels.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: BTreeMap<String, usize>,
}

impl Program {
    /// Create a program from instructions and a label map.
    ///
    /// The parser guarantees every label index is in `0..=instructions.len()`
    /// and every label reference resolves; programs built by hand get the
    /// same read-only interface but no such guarantee.
    pub fn new(instructions: Vec<Instruction>, labels: BTreeMap<String, usize>) -> Self {
        Self {
            instructions,
            labels,
        }
    }

    /// The instruction at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// All instructions in source order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Resolves a label name to its instruction index.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// The label map, keyed by name.
    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
