//! Parser for sovereign assembly: tokens → [`Program`].
//!
//! Two passes. The first pass walks the lines, binding every label to the
//! index of the next instruction (forward references are legal) and
//! collecting raw instructions. The second pass checks every label
//! reference against the collected label map, so unresolved references are
//! parse-time failures and the VM never sees them for built-in opcodes.

use crate::error::ParseError;
use crate::lexer::{is_label_name, tokenize_line, Token, TokenKind};
use sovereign_common::{Instruction, Operand, Program};
use std::collections::BTreeMap;

/// An instruction plus the source positions needed for diagnostics.
struct RawInstruction {
    line: usize,
    mnemonic: String,
    operands: Vec<(Operand, usize)>,
}

/// Parse a complete source string into a [`Program`].
pub(crate) fn parse_program(source: &str) -> Result<Program, ParseError> {
    let mut labels: BTreeMap<String, usize> = BTreeMap::new();
    let mut raw: Vec<RawInstruction> = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line_num = idx + 1;
        let tokens = tokenize_line(line, line_num)?;
        let mut rest = tokens.as_slice();

        // Leading label definitions bind to the next instruction index.
        while let Some(Token {
            kind: TokenKind::Label(name),
            column,
        }) = rest.first()
        {
            if labels.contains_key(name) {
                return Err(ParseError::new(
                    line_num,
                    *column,
                    format!("duplicate label '{name}'"),
                ));
            }
            labels.insert(name.clone(), raw.len());
            rest = &rest[1..];
        }

        let Some(first) = rest.first() else {
            continue;
        };

        let mnemonic = match &first.kind {
            TokenKind::Word(word) if word.bytes().all(|b| b.is_ascii_alphabetic()) => {
                word.to_ascii_uppercase()
            }
            TokenKind::Word(word) => {
                return Err(ParseError::new(
                    line_num,
                    first.column,
                    format!("invalid opcode '{word}' (letters only)"),
                ));
            }
            other => {
                return Err(ParseError::new(
                    line_num,
                    first.column,
                    format!("expected opcode, found {}", describe(other)),
                ));
            }
        };

        let mut operands = Vec::with_capacity(rest.len() - 1);
        for token in &rest[1..] {
            let operand = match &token.kind {
                TokenKind::Register(n) => Operand::Register(*n),
                TokenKind::Immediate(v) => Operand::Immediate(*v),
                TokenKind::Address(a) => Operand::Address(a.clone()),
                TokenKind::Str(s) => Operand::StringLiteral(s.clone()),
                TokenKind::Word(word) => {
                    if !is_label_name(word) {
                        return Err(ParseError::new(
                            line_num,
                            token.column,
                            format!("invalid label reference '{word}'"),
                        ));
                    }
                    Operand::LabelRef(word.clone())
                }
                TokenKind::Label(name) => {
                    return Err(ParseError::new(
                        line_num,
                        token.column,
                        format!("label '{name}:' not allowed in operand position"),
                    ));
                }
            };
            operands.push((operand, token.column));
        }

        raw.push(RawInstruction {
            line: line_num,
            mnemonic,
            operands,
        });
    }

    // Second pass: every label reference must resolve.
    let mut instructions = Vec::with_capacity(raw.len());
    for instr in raw {
        for (operand, column) in &instr.operands {
            if let Operand::LabelRef(name) = operand {
                if !labels.contains_key(name) {
                    return Err(ParseError::new(
                        instr.line,
                        *column,
                        format!("undefined label '{name}'"),
                    ));
                }
            }
        }
        instructions.push(Instruction {
            mnemonic: instr.mnemonic,
            operands: instr.operands.into_iter().map(|(op, _)| op).collect(),
        });
    }

    Ok(Program::new(instructions, labels))
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Label(name) => format!("label '{name}:'"),
        TokenKind::Word(word) => format!("'{word}'"),
        TokenKind::Register(n) => format!("register 'r{n}'"),
        TokenKind::Immediate(v) => format!("immediate '#{v}'"),
        TokenKind::Address(a) => format!("address '@{a}'"),
        TokenKind::Str(_) => "string literal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_empty_program() {
        let program = parse_program("").unwrap();
        assert!(program.is_empty());
        assert!(program.labels().is_empty());
    }

    #[test]
    fn mnemonic_is_uppercased() {
        let program = parse_program("push #1\nhAlT").unwrap();
        assert_eq!(program.get(0).unwrap().mnemonic, "PUSH");
        assert_eq!(program.get(1).unwrap().mnemonic, "HALT");
    }

    #[test]
    fn labels_bind_to_next_instruction() {
        let program = parse_program("PUSH #1\nloop:\nPUSH #2\nJMP loop").unwrap();
        assert_eq!(program.label_index("loop"), Some(1));
    }

    #[test]
    fn label_and_instruction_on_one_line() {
        let program = parse_program("start: PUSH #1\nJMP start").unwrap();
        assert_eq!(program.label_index("start"), Some(0));
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn forward_reference_is_legal() {
        let program = parse_program("JMP end\nPUSH #1\nend:\nHALT").unwrap();
        assert_eq!(program.label_index("end"), Some(2));
    }

    #[test]
    fn trailing_label_binds_past_the_end() {
        let program = parse_program("PUSH #1\ndone:").unwrap();
        assert_eq!(program.label_index("done"), Some(1));
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let err = parse_program("dup:\nPUSH #1\ndup:\nHALT").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("duplicate label"));
    }

    #[test]
    fn undefined_label_reference_is_an_error() {
        let err = parse_program("JMP missing\nHALT").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("undefined label 'missing'"));
    }

    #[test]
    fn opcode_must_be_letters_only() {
        let err = parse_program("PUSH2 #1").unwrap_err();
        assert!(err.message.contains("invalid opcode"));
    }

    #[test]
    fn operand_line_starting_with_register_is_an_error() {
        let err = parse_program("r0 PUSH").unwrap_err();
        assert!(err.message.contains("expected opcode"));
    }

    #[test]
    fn uppercase_word_in_operand_position_is_an_error() {
        // Label references must match [a-z_][a-z0-9_]*.
        let err = parse_program("loop:\nJMP Loop").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("invalid label reference"));
    }

    #[test]
    fn all_operand_kinds() {
        let program =
            parse_program("target:\nTEST r3 #-9 @be0f \"hi\" target").unwrap();
        let instr = program.get(0).unwrap();
        assert_eq!(
            instr.operands,
            vec![
                Operand::Register(3),
                Operand::Immediate(-9),
                Operand::Address("be0f".into()),
                Operand::StringLiteral("hi".into()),
                Operand::LabelRef("target".into()),
            ]
        );
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let source = "\n; leading comment\nPUSH #1 ; trailing\n\n   \nHALT\n";
        let program = parse_program(source).unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn unknown_mnemonics_parse() {
        // Unknown opcodes are a dispatch-time failure, not a parse failure;
        // the registry is runtime-extensible.
        let program = parse_program("FROBNICATE #1").unwrap();
        assert_eq!(program.get(0).unwrap().mnemonic, "FROBNICATE");
    }
}
