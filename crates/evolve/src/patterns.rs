//! Error-pattern store: categorization, similarity matching, success
//! statistics, and NDJSON persistence.
//!
//! Each observed failure is categorized by a keyword table over the error
//! text and matched against stored patterns by Jaccard word overlap. A
//! match above 0.6 in the same category reinforces the existing pattern;
//! anything else becomes a new one. Validation outcomes feed a
//! frequency-weighted running mean per pattern.

use crate::error::EvoError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Similarity threshold for reinforcing an existing pattern.
const MATCH_THRESHOLD: f64 = 0.6;

/// Stored pattern text is capped at this many characters.
const PATTERN_TEXT_CAP: usize = 100;

/// Categories of observed failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    StackUnderflow,
    DivisionByZero,
    InvalidAddress,
    UnknownOpcode,
    CallDepthExceeded,
    StepLimitExceeded,
    #[serde(rename = "LLMUnavailable")]
    LlmUnavailable,
    ParseFailure,
    Unknown,
}

/// Keyword fragments mapped to categories, checked in order. Earlier
/// entries take precedence, so the more specific fragments come first.
const CATEGORY_KEYWORDS: &[(&str, ErrorCategory)] = &[
    ("parse", ErrorCategory::ParseFailure),
    ("syntax", ErrorCategory::ParseFailure),
    ("division by zero", ErrorCategory::DivisionByZero),
    ("divide", ErrorCategory::DivisionByZero),
    ("call depth", ErrorCategory::CallDepthExceeded),
    ("recursion", ErrorCategory::CallDepthExceeded),
    ("underflow", ErrorCategory::StackUnderflow),
    ("invalid address", ErrorCategory::InvalidAddress),
    ("address", ErrorCategory::InvalidAddress),
    ("unknown opcode", ErrorCategory::UnknownOpcode),
    ("opcode", ErrorCategory::UnknownOpcode),
    ("step", ErrorCategory::StepLimitExceeded),
    ("llm", ErrorCategory::LlmUnavailable),
    ("unavailable", ErrorCategory::LlmUnavailable),
];

/// Categorize an error message by keyword fragment.
pub fn categorize(error_text: &str) -> ErrorCategory {
    let lower = error_text.to_lowercase();
    for (fragment, category) in CATEGORY_KEYWORDS {
        if lower.contains(fragment) {
            return *category;
        }
    }
    ErrorCategory::Unknown
}

/// Jaccard similarity over lowercased whitespace tokens.
fn jaccard(a: &str, b: &str) -> f64 {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let set_a: HashSet<&str> = lower_a.split_whitespace().collect();
    let set_b: HashSet<&str> = lower_b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// A recognized failure shape with its repair statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    /// Category tag.
    pub category: ErrorCategory,
    /// Representative message text (truncated).
    pub pattern: String,
    /// How many times this pattern has been observed.
    pub frequency: u64,
    /// Running mean of validation outcomes, in [0, 1].
    #[serde(rename = "success_rate")]
    pub fix_success_rate: f64,
    /// Candidate sources that previously passed validation.
    pub fix_templates: Vec<String>,
}

/// The store itself. Owned by one evolution engine; instances are
/// independent.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: Vec<ErrorPattern>,
}

impl PatternStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `error_text`. Reinforces the best
    /// matching pattern (same category, similarity above the threshold)
    /// or inserts a new one. Returns the pattern's index.
    pub fn observe(&mut self, error_text: &str) -> usize {
        let category = categorize(error_text);

        let mut best: Option<(usize, f64)> = None;
        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.category != category {
                continue;
            }
            let score = jaccard(&pattern.pattern, error_text);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((index, score));
            }
        }

        if let Some((index, score)) = best {
            if score > MATCH_THRESHOLD {
                self.patterns[index].frequency += 1;
                return index;
            }
        }

        self.patterns.push(ErrorPattern {
            category,
            pattern: error_text.chars().take(PATTERN_TEXT_CAP).collect(),
            frequency: 1,
            fix_success_rate: 0.0,
            fix_templates: Vec::new(),
        });
        self.patterns.len() - 1
    }

    /// Fold a validation outcome into the pattern's running mean. On
    /// success the accepted candidate joins the fix templates.
    pub fn record_outcome(&mut self, index: usize, success: bool, template: Option<&str>) {
        let Some(pattern) = self.patterns.get_mut(index) else {
            return;
        };
        let n = pattern.frequency.max(1) as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        pattern.fix_success_rate = (pattern.fix_success_rate * (n - 1.0) + outcome) / n;
        if success {
            if let Some(template) = template {
                if !pattern.fix_templates.iter().any(|t| t == template) {
                    pattern.fix_templates.push(template.to_string());
                }
            }
        }
    }

    /// Fix templates of the pattern best matching `error_text`, for
    /// prompt enrichment. Empty when nothing matches.
    pub fn templates_for(&self, error_text: &str) -> Vec<String> {
        let category = categorize(error_text);
        self.patterns
            .iter()
            .filter(|p| p.category == category)
            .map(|p| (p, jaccard(&p.pattern, error_text)))
            .filter(|(_, score)| *score > MATCH_THRESHOLD)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(p, _)| p.fix_templates.clone())
            .unwrap_or_default()
    }

    /// Pattern at `index`.
    pub fn get(&self, index: usize) -> Option<&ErrorPattern> {
        self.patterns.get(index)
    }

    /// All patterns, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorPattern> {
        self.patterns.iter()
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if the store has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Export as newline-delimited JSON, one pattern per line.
    pub fn export_ndjson(&self) -> String {
        let mut out = String::new();
        for pattern in &self.patterns {
            match serde_json::to_string(pattern) {
                Ok(line) => {
                    let _ = writeln!(out, "{line}");
                }
                Err(_) => continue,
            }
        }
        out
    }

    /// Additive import: merges by (category, pattern text), combining
    /// frequencies, frequency-weighted success rates, and templates.
    /// Returns the number of lines consumed.
    pub fn import_ndjson(&mut self, stream: &str) -> Result<usize, EvoError> {
        let mut imported = 0;
        for (line_no, line) in stream.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let incoming: ErrorPattern = serde_json::from_str(line)
                .map_err(|e| EvoError::PatternImport(format!("line {}: {e}", line_no + 1)))?;
            self.merge(incoming);
            imported += 1;
        }
        Ok(imported)
    }

    fn merge(&mut self, incoming: ErrorPattern) {
        let existing = self
            .patterns
            .iter_mut()
            .find(|p| p.category == incoming.category && p.pattern == incoming.pattern);
        match existing {
            Some(pattern) => {
                let total = pattern.frequency + incoming.frequency;
                if total > 0 {
                    pattern.fix_success_rate = (pattern.fix_success_rate
                        * pattern.frequency as f64
                        + incoming.fix_success_rate * incoming.frequency as f64)
                        / total as f64;
                }
                pattern.frequency = total;
                for template in incoming.fix_templates {
                    if !pattern.fix_templates.contains(&template) {
                        pattern.fix_templates.push(template);
                    }
                }
            }
            None => self.patterns.push(incoming),
        }
    }
}
