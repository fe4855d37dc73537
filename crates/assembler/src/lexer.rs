//! Tokenizer for sovereign assembly text.
//!
//! Works one line at a time. Operands are recognized by their prefix:
//! `r<n>` register, `#<n>` immediate, `@<hex>` address, `"..."` string.
//! Everything else that looks like an identifier becomes a [`TokenKind::Word`]
//! and is classified by the parser (mnemonic vs. label reference).

use crate::error::ParseError;

/// A single token with its 1-based source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// A label definition, `name:`. The colon is consumed.
    Label(String),
    /// An identifier: opcode mnemonic or label reference, verbatim case.
    Word(String),
    /// Register operand `r0`..`r15`.
    Register(u8),
    /// Immediate operand `#<signed decimal>`.
    Immediate(i64),
    /// Address operand `@<hex>`; digits preserved verbatim.
    Address(String),
    /// String literal, unescaped.
    Str(String),
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// True iff `name` is a valid label name: `[a-z_][a-z0-9_]*`.
pub(crate) fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Tokenize a single line of assembly.
///
/// Returns an empty Vec for blank and comment-only lines. Comments start
/// with `;` and extend to end of line.
pub(crate) fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == ';' {
            break;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let column = i + 1;
        match c {
            '#' => {
                i += 1;
                let start = i;
                if i < chars.len() && chars[i] == '-' {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.is_empty() || text == "-" {
                    return Err(ParseError::new(
                        line_num,
                        column,
                        "expected decimal digits after '#'",
                    ));
                }
                if i < chars.len() && is_word_char(chars[i]) {
                    return Err(ParseError::new(
                        line_num,
                        column,
                        format!("invalid immediate '#{text}{}'", chars[i]),
                    ));
                }
                let value: i64 = text.parse().map_err(|_| {
                    ParseError::new(line_num, column, format!("immediate '#{text}' out of range"))
                })?;
                tokens.push(Token {
                    kind: TokenKind::Immediate(value),
                    column,
                });
            }

            '@' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.is_empty() {
                    return Err(ParseError::new(
                        line_num,
                        column,
                        "expected address key after '@'",
                    ));
                }
                if i < chars.len() && is_word_char(chars[i]) {
                    return Err(ParseError::new(
                        line_num,
                        column,
                        format!("invalid address '@{text}{}'", chars[i]),
                    ));
                }
                tokens.push(Token {
                    kind: TokenKind::Address(text),
                    column,
                });
            }

            '"' => {
                i += 1;
                let mut text = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(ParseError::new(
                            line_num,
                            column,
                            "unterminated string literal",
                        ));
                    }
                    match chars[i] {
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\\' => {
                            i += 1;
                            let escaped = chars.get(i).copied().ok_or_else(|| {
                                ParseError::new(
                                    line_num,
                                    column,
                                    "unterminated string literal",
                                )
                            })?;
                            match escaped {
                                '\\' => text.push('\\'),
                                '"' => text.push('"'),
                                'n' => text.push('\n'),
                                't' => text.push('\t'),
                                other => {
                                    return Err(ParseError::new(
                                        line_num,
                                        i + 1,
                                        format!("invalid escape '\\{other}'"),
                                    ))
                                }
                            }
                            i += 1;
                        }
                        other => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    column,
                });
            }

            c if is_word_start(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                if i < chars.len() && chars[i] == ':' {
                    i += 1;
                    if !is_label_name(&word) {
                        return Err(ParseError::new(
                            line_num,
                            column,
                            format!("invalid label name '{word}'"),
                        ));
                    }
                    tokens.push(Token {
                        kind: TokenKind::Label(word),
                        column,
                    });
                } else if let Some(digits) = register_digits(&word) {
                    let index: u8 = digits.parse().map_err(|_| {
                        ParseError::new(line_num, column, format!("invalid register '{word}'"))
                    })?;
                    if index >= sovereign_common::REGISTER_COUNT {
                        return Err(ParseError::new(
                            line_num,
                            column,
                            format!("register '{word}' out of range (r0..r15)"),
                        ));
                    }
                    tokens.push(Token {
                        kind: TokenKind::Register(index),
                        column,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Word(word),
                        column,
                    });
                }
            }

            other => {
                return Err(ParseError::new(
                    line_num,
                    column,
                    format!("unexpected character '{other}'"),
                ));
            }
        }
    }

    Ok(tokens)
}

/// If `word` has the register shape `r<decimal>`, return the digit part.
fn register_digits(word: &str) -> Option<&str> {
    let digits = word.strip_prefix('r')?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn empty_line() {
        assert_eq!(tokenize_line("", 1).unwrap(), vec![]);
        assert_eq!(tokenize_line("   \t ", 1).unwrap(), vec![]);
    }

    #[test]
    fn comment_only() {
        assert_eq!(tokenize_line("; nothing here", 1).unwrap(), vec![]);
    }

    #[test]
    fn word_with_trailing_comment() {
        assert_eq!(
            kinds("HALT ; stop"),
            vec![TokenKind::Word("HALT".to_string())]
        );
    }

    #[test]
    fn registers() {
        assert_eq!(kinds("r0 r15"), vec![TokenKind::Register(0), TokenKind::Register(15)]);
    }

    #[test]
    fn register_out_of_range() {
        let err = tokenize_line("r16", 2).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn register_like_words_are_words() {
        // `rot` and `r2x` do not match `r<decimal>` and stay identifiers.
        assert_eq!(kinds("rot"), vec![TokenKind::Word("rot".to_string())]);
        assert_eq!(kinds("r2x"), vec![TokenKind::Word("r2x".to_string())]);
    }

    #[test]
    fn immediates() {
        assert_eq!(
            kinds("#42 #-7 #0"),
            vec![
                TokenKind::Immediate(42),
                TokenKind::Immediate(-7),
                TokenKind::Immediate(0)
            ]
        );
    }

    #[test]
    fn immediate_errors() {
        assert!(tokenize_line("#", 1).is_err());
        assert!(tokenize_line("#-", 1).is_err());
        assert!(tokenize_line("#12abc", 1).is_err());
        // One past i64::MAX.
        assert!(tokenize_line("#9223372036854775808", 1).is_err());
    }

    #[test]
    fn immediate_i64_bounds() {
        assert_eq!(
            kinds("#9223372036854775807"),
            vec![TokenKind::Immediate(i64::MAX)]
        );
        assert_eq!(
            kinds("#-9223372036854775808"),
            vec![TokenKind::Immediate(i64::MIN)]
        );
    }

    #[test]
    fn addresses_preserve_case() {
        assert_eq!(
            kinds("@ff00 @FF00 @0a @x"),
            vec![
                TokenKind::Address("ff00".to_string()),
                TokenKind::Address("FF00".to_string()),
                TokenKind::Address("0a".to_string()),
                TokenKind::Address("x".to_string())
            ]
        );
    }

    #[test]
    fn address_errors() {
        assert!(tokenize_line("@", 1).is_err());
        assert!(tokenize_line("@ff_00", 1).is_err());
    }

    #[test]
    fn string_literals() {
        assert_eq!(
            kinds(r#""hello world""#),
            vec![TokenKind::Str("hello world".to_string())]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\nd\te""#),
            vec![TokenKind::Str("a\"b\\c\nd\te".to_string())]
        );
    }

    #[test]
    fn string_unterminated() {
        let err = tokenize_line("\"open", 4).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn string_invalid_escape() {
        assert!(tokenize_line(r#""\q""#, 1).is_err());
    }

    #[test]
    fn semicolon_inside_string_is_not_a_comment() {
        assert_eq!(kinds(r#""a;b""#), vec![TokenKind::Str("a;b".to_string())]);
    }

    #[test]
    fn labels() {
        assert_eq!(
            kinds("loop: PUSH #1"),
            vec![
                TokenKind::Label("loop".to_string()),
                TokenKind::Word("PUSH".to_string()),
                TokenKind::Immediate(1)
            ]
        );
    }

    #[test]
    fn label_name_must_be_lowercase() {
        assert!(tokenize_line("Loop:", 1).is_err());
        assert!(tokenize_line("1st:", 1).is_err());
        assert!(tokenize_line("_ok:", 1).is_ok());
        assert!(tokenize_line("f2:", 1).is_ok());
    }

    #[test]
    fn columns_are_one_based() {
        let tokens = tokenize_line("  PUSH #1", 1).unwrap();
        assert_eq!(tokens[0].column, 3);
        assert_eq!(tokens[1].column, 8);
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize_line("PUSH $1", 1).unwrap_err();
        assert_eq!(err.column, 6);
        assert!(err.message.contains("unexpected character"));
    }
}
