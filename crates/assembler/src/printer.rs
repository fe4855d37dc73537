//! Canonical printer: [`Program`] → assembly text.
//!
//! The output reparses to a structurally equal program
//! (`parse(canonicalize(parse(s))) == parse(s)`). Labels are printed on
//! their own line; instructions are indented two spaces. Operand kinds are
//! preserved exactly.

use sovereign_common::Program;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Print a program in canonical source form.
pub fn canonicalize(program: &Program) -> String {
    // Labels grouped by target index; BTreeMap iteration keeps names sorted,
    // which makes the output deterministic.
    let mut labels_at: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (name, &index) in program.labels() {
        labels_at.entry(index).or_default().push(name);
    }

    let mut out = String::new();
    for index in 0..=program.len() {
        if let Some(names) = labels_at.get(&index) {
            for name in names {
                let _ = writeln!(out, "{name}:");
            }
        }
        if let Some(instr) = program.get(index) {
            let _ = writeln!(out, "  {instr}");
        }
    }
    out
}
