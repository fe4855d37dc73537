//! Opcode registry: mnemonic → operation descriptor.
//!
//! Descriptors carry the canonical name, category, operand signature, and
//! an executor function. The registry is populated with the 32 built-ins
//! by [`Registry::with_builtins`] and stays extensible at runtime, so
//! embedders can add mnemonics without touching the dispatch loop.

use crate::error::VmError;
use crate::machine::Vm;
use sovereign_common::{Instruction, OpCategory, Operand, OperandKind};
use std::collections::BTreeMap;

/// What the dispatch loop does after an executor returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance the program counter by one.
    Advance,
    /// The executor set the program counter itself.
    Jump,
    /// Stop execution; `running` becomes false.
    Halt,
}

/// Accepted operand kinds for one signature position.
#[derive(Debug, Clone, Copy)]
pub enum OperandSpec {
    /// Any operand kind is accepted.
    Any,
    /// Only the listed kinds are accepted.
    OneOf(&'static [OperandKind]),
}

impl OperandSpec {
    fn admits(&self, kind: OperandKind) -> bool {
        match self {
            OperandSpec::Any => true,
            OperandSpec::OneOf(kinds) => kinds.contains(&kind),
        }
    }
}

/// Executor signature: mutate the VM through its bounded helpers and
/// report how the program counter should move.
pub type Executor = fn(&mut Vm, &[Operand]) -> Result<Flow, VmError>;

/// A registered operation.
#[derive(Clone)]
pub struct OpDescriptor {
    /// Canonical uppercase mnemonic.
    pub name: String,
    /// Category used by listings.
    pub category: OpCategory,
    /// Minimum operand count.
    pub min_operands: usize,
    /// Maximum operand count; `signature.len() == max_operands`.
    pub max_operands: usize,
    /// Accepted operand kinds per position.
    pub signature: Vec<OperandSpec>,
    /// The operation itself.
    pub executor: Executor,
}

impl std::fmt::Debug for OpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("min_operands", &self.min_operands)
            .field("max_operands", &self.max_operands)
            .finish_non_exhaustive()
    }
}

impl OpDescriptor {
    /// Validate `instr`'s operands against this descriptor's signature.
    pub(crate) fn check_operands(&self, instr: &Instruction, at: usize) -> Result<(), VmError> {
        let count = instr.operands.len();
        if count < self.min_operands || count > self.max_operands {
            let expected = if self.min_operands == self.max_operands {
                format!("{}", self.min_operands)
            } else {
                format!("{}..{}", self.min_operands, self.max_operands)
            };
            return Err(VmError::OperandMismatch {
                at,
                message: format!("{} expects {expected} operand(s), found {count}", self.name),
            });
        }
        for (index, operand) in instr.operands.iter().enumerate() {
            let spec = &self.signature[index];
            if !spec.admits(operand.kind()) {
                return Err(VmError::OperandMismatch {
                    at,
                    message: format!(
                        "{} operand {} must not be a {}",
                        self.name,
                        index + 1,
                        operand.kind().name()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Mnemonic → descriptor map. Lookup is case-insensitive; names are
/// canonicalized to uppercase on registration.
pub struct Registry {
    ops: BTreeMap<String, OpDescriptor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            ops: BTreeMap::new(),
        }
    }

    /// A registry holding exactly the 32 built-in operations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::execute::install_builtins(&mut registry);
        registry
    }

    /// Look up a descriptor by mnemonic, case-insensitively.
    pub fn get(&self, mnemonic: &str) -> Option<&OpDescriptor> {
        self.ops.get(&mnemonic.to_ascii_uppercase())
    }

    /// Register a descriptor, replacing any previous one with the same
    /// canonical name.
    pub fn register(&mut self, mut descriptor: OpDescriptor) {
        descriptor.name = descriptor.name.to_ascii_uppercase();
        self.ops.insert(descriptor.name.clone(), descriptor);
    }

    /// List descriptors, optionally filtered by category, in name order.
    pub fn list(&self, category: Option<OpCategory>) -> Vec<&OpDescriptor> {
        self.ops
            .values()
            .filter(|d| category.map_or(true, |c| d.category == c))
            .collect()
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if no operations are registered.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sovereign_common::OpCategory;

    fn nop_executor(_vm: &mut Vm, _ops: &[Operand]) -> Result<Flow, VmError> {
        Ok(Flow::Advance)
    }

    #[test]
    fn builtins_cover_all_32() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.len(), 32);
        for &op in &sovereign_common::ALL_OPCODES {
            assert!(
                registry.get(op.mnemonic()).is_some(),
                "missing builtin {}",
                op.mnemonic()
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = Registry::with_builtins();
        assert!(registry.get("push").is_some());
        assert!(registry.get("Push").is_some());
        assert!(registry.get("frob").is_none());
    }

    #[test]
    fn list_filters_by_category() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.list(None).len(), 32);
        for category in [
            OpCategory::Stack,
            OpCategory::Arithmetic,
            OpCategory::Control,
            OpCategory::Memory,
        ] {
            let ops = registry.list(Some(category));
            assert_eq!(ops.len(), 8, "{category:?}");
            assert!(ops.iter().all(|d| d.category == category));
        }
    }

    #[test]
    fn register_canonicalizes_and_replaces() {
        let mut registry = Registry::new();
        registry.register(OpDescriptor {
            name: "noop".into(),
            category: OpCategory::Stack,
            min_operands: 0,
            max_operands: 0,
            signature: vec![],
            executor: nop_executor,
        });
        assert!(registry.get("NOOP").is_some());
        assert_eq!(registry.len(), 1);

        registry.register(OpDescriptor {
            name: "NOOP".into(),
            category: OpCategory::Control,
            min_operands: 0,
            max_operands: 0,
            signature: vec![],
            executor: nop_executor,
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("noop").unwrap().category, OpCategory::Control);
    }

    #[test]
    fn operand_check_arity() {
        let registry = Registry::with_builtins();
        let desc = registry.get("PUSH").unwrap();
        let instr = Instruction::new("PUSH", vec![]);
        let err = desc.check_operands(&instr, 5).unwrap_err();
        assert!(matches!(err, VmError::OperandMismatch { at: 5, .. }));
    }

    #[test]
    fn operand_check_kind() {
        let registry = Registry::with_builtins();
        let desc = registry.get("JMP").unwrap();
        let instr = Instruction::new("JMP", vec![Operand::Immediate(3)]);
        let err = desc.check_operands(&instr, 0).unwrap_err();
        assert!(matches!(err, VmError::OperandMismatch { .. }));
    }

    #[test]
    fn evolve_accepts_zero_or_one_operand() {
        let registry = Registry::with_builtins();
        let desc = registry.get("EVOLVE").unwrap();
        assert!(desc
            .check_operands(&Instruction::new("EVOLVE", vec![]), 0)
            .is_ok());
        assert!(desc
            .check_operands(
                &Instruction::new("EVOLVE", vec![Operand::StringLiteral("ctx".into())]),
                0
            )
            .is_ok());
        assert!(desc
            .check_operands(
                &Instruction::new(
                    "EVOLVE",
                    vec![
                        Operand::StringLiteral("a".into()),
                        Operand::StringLiteral("b".into())
                    ]
                ),
                0
            )
            .is_err());
    }
}
