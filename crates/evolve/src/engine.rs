//! The evolution engine: error-driven candidate generation with
//! sandboxed validation.
//!
//! On `evolve`, the engine categorizes the failure, pulls prior fix
//! templates from the pattern store, selects a capable model, and asks it
//! for replacement code. Candidates run inside a sandbox VM under a tight
//! configuration; a weighted score decides acceptance, and outcomes feed
//! back into the store's statistics.

use crate::client::{ClientConfig, LlmClient};
use crate::error::EvoError;
use crate::models::{Capability, ModelRegistry};
use crate::patterns::{categorize, ErrorCategory, PatternStore};
use serde::Serialize;
use sovereign_vm::{VmConfig, VmError};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Client settings (endpoint, model, timeout, retries).
    pub client: ClientConfig,
    /// Sandbox profile for candidate validation.
    pub sandbox: VmConfig,
    /// Candidates generated per `evolve` call before giving up.
    pub max_attempts: u32,
    /// Cap on the attempt history; oldest entries are dropped.
    pub history_cap: Option<usize>,
    /// A candidate is accepted iff its score exceeds this.
    pub accept_threshold: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            sandbox: VmConfig::sandbox(),
            max_attempts: 3,
            history_cap: Some(256),
            accept_threshold: 0.7,
        }
    }
}

/// One recorded evolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionAttempt {
    /// When the candidate was evaluated.
    pub timestamp: SystemTime,
    /// The input code under repair.
    pub code: String,
    /// The triggering error text.
    pub error: String,
    /// The generated candidate.
    pub candidate: String,
    /// Whether the candidate passed validation.
    pub validated: bool,
    /// The candidate's quality score in [0, 1].
    pub score: f64,
    /// The model that produced it.
    pub model: String,
}

/// Breakdown of a sandbox validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateEvaluation {
    /// The candidate parsed.
    pub parsed: bool,
    /// The sandbox run terminated without error.
    pub clean: bool,
    /// The sandbox failure had the same category as the original error.
    pub reproduced_category: bool,
    /// The failure, if any, was not a resource-bound violation.
    pub within_bounds: bool,
    /// Weighted sum of the above.
    pub score: f64,
    /// `score > accept_threshold`.
    pub accepted: bool,
}

/// Aggregate statistics over the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvolutionStats {
    pub total_attempts: u64,
    pub accepted: u64,
    pub success_rate: f64,
    pub unique_patterns: usize,
}

/// Engine over any [`LlmClient`] implementation.
pub struct EvolutionEngine<C> {
    client: C,
    models: ModelRegistry,
    patterns: Mutex<PatternStore>,
    history: Mutex<Vec<EvolutionAttempt>>,
    config: EvolutionConfig,
}

impl<C: LlmClient> EvolutionEngine<C> {
    /// Build an engine owning its pattern store and history.
    pub fn new(client: C, models: ModelRegistry, config: EvolutionConfig) -> Self {
        Self {
            client,
            models,
            patterns: Mutex::new(PatternStore::new()),
            history: Mutex::new(Vec::new()),
            config,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Generate assembly for `prompt` using a code-generation-capable
    /// model. Markdown fences in the reply are stripped.
    pub async fn generate_code(&self, prompt: &str) -> Result<String, EvoError> {
        let model = self
            .models
            .resolve(&[Capability::CodeGeneration], false, &self.client)
            .await
            .ok_or(EvoError::NoModelAvailable)?;
        let reply = self
            .client
            .chat(&model, &generation_prompt(prompt), Some(0.3))
            .await?;
        Ok(strip_code_fences(&reply.content))
    }

    /// Evolve `code` after it failed with `error_text`. Returns the first
    /// candidate that passes sandbox validation.
    pub async fn evolve(&self, code: &str, error_text: &str) -> Result<String, EvoError> {
        let category = categorize(error_text);
        let (pattern_index, templates) = {
            let mut store = self.patterns.lock().expect("pattern store lock poisoned");
            let index = store.observe(error_text);
            (index, store.templates_for(error_text))
        };

        let model = self
            .models
            .resolve(
                &[Capability::CodeGeneration, Capability::ErrorAnalysis],
                false,
                &self.client,
            )
            .await
            .ok_or(EvoError::NoModelAvailable)?;

        let prompt = repair_prompt(code, error_text, &templates);
        let mut last_reason = "no candidate generated".to_string();

        for attempt in 1..=self.config.max_attempts {
            let reply = match self.client.chat(&model, &prompt, Some(0.3)).await {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(attempt, %error, "candidate generation failed");
                    last_reason = error.to_string();
                    continue;
                }
            };
            let candidate = strip_code_fences(&reply.content);
            let evaluation = self.validate_candidate(&candidate, category);
            debug!(
                attempt,
                score = evaluation.score,
                accepted = evaluation.accepted,
                "candidate evaluated"
            );

            self.push_history(EvolutionAttempt {
                timestamp: SystemTime::now(),
                code: code.to_string(),
                error: error_text.to_string(),
                candidate: candidate.clone(),
                validated: evaluation.accepted,
                score: evaluation.score,
                model: model.clone(),
            });

            if evaluation.accepted {
                self.patterns
                    .lock()
                    .expect("pattern store lock poisoned")
                    .record_outcome(pattern_index, true, Some(&candidate));
                info!(model = %model, attempt, "evolution accepted a candidate");
                return Ok(candidate);
            }
            last_reason = format!("best candidate scored {:.2}", evaluation.score);
        }

        self.patterns
            .lock()
            .expect("pattern store lock poisoned")
            .record_outcome(pattern_index, false, None);
        Err(EvoError::EvolutionFailed {
            attempts: self.config.max_attempts,
            reason: last_reason,
        })
    }

    /// Score a candidate inside a sandbox VM. Parse failure is score 0.
    /// Otherwise the score weighs: parsing (0.25), clean termination
    /// (0.35), not reproducing the original category (0.25), and staying
    /// within resource bounds (0.15).
    pub fn validate_candidate(
        &self,
        candidate: &str,
        original: ErrorCategory,
    ) -> CandidateEvaluation {
        let program = match sovereign_assembler::parse(candidate) {
            Ok(program) => program,
            Err(_) => {
                return CandidateEvaluation {
                    parsed: false,
                    clean: false,
                    reproduced_category: false,
                    within_bounds: false,
                    score: 0.0,
                    accepted: false,
                };
            }
        };

        // Sandbox VMs carry no adapter: nested LLM opcodes fail
        // LLMUnavailable instead of recursing into the service, and the
        // sandbox's counters are independent of any outer VM.
        let (clean, reproduced_category, within_bounds) =
            match sovereign_vm::run_program(&program, self.config.sandbox.clone()) {
                Ok(_) => (true, false, true),
                Err(error) => {
                    let reproduced = categorize(&error.to_string()) == original;
                    let within = !matches!(
                        error,
                        VmError::StepLimitExceeded { .. }
                            | VmError::StackOverflow { .. }
                            | VmError::MemoryLimitExceeded { .. }
                            | VmError::CallDepthExceeded { .. }
                    );
                    (false, reproduced, within)
                }
            };

        let score = 0.25
            + if clean { 0.35 } else { 0.0 }
            + if reproduced_category { 0.0 } else { 0.25 }
            + if within_bounds { 0.15 } else { 0.0 };
        CandidateEvaluation {
            parsed: true,
            clean,
            reproduced_category,
            within_bounds,
            score,
            accepted: score > self.config.accept_threshold,
        }
    }

    fn push_history(&self, attempt: EvolutionAttempt) {
        let mut history = self.history.lock().expect("history lock poisoned");
        history.push(attempt);
        if let Some(cap) = self.config.history_cap {
            while history.len() > cap {
                history.remove(0);
            }
        }
    }

    /// A copy of the attempt history, oldest first.
    pub fn history(&self) -> Vec<EvolutionAttempt> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> EvolutionStats {
        let history = self.history.lock().expect("history lock poisoned");
        let total = history.len() as u64;
        let accepted = history.iter().filter(|a| a.validated).count() as u64;
        EvolutionStats {
            total_attempts: total,
            accepted,
            success_rate: if total == 0 {
                0.0
            } else {
                accepted as f64 / total as f64
            },
            unique_patterns: self
                .patterns
                .lock()
                .expect("pattern store lock poisoned")
                .len(),
        }
    }

    /// Export the pattern store as NDJSON.
    pub fn export_patterns(&self) -> String {
        self.patterns
            .lock()
            .expect("pattern store lock poisoned")
            .export_ndjson()
    }

    /// Additive pattern import; see [`PatternStore::import_ndjson`].
    pub fn import_patterns(&self, stream: &str) -> Result<usize, EvoError> {
        self.patterns
            .lock()
            .expect("pattern store lock poisoned")
            .import_ndjson(stream)
    }

    /// Success rate of the pattern matching `error_text`, if one exists.
    pub fn pattern_success_rate(&self, error_text: &str) -> Option<f64> {
        let store = self.patterns.lock().expect("pattern store lock poisoned");
        let category = categorize(error_text);
        let rate = store
            .iter()
            .find(|p| p.category == category)
            .map(|p| p.fix_success_rate);
        rate
    }
}

/// Prompt wrapper for plain generation, asking for raw assembly only.
fn generation_prompt(request: &str) -> String {
    format!(
        "You are a code generation assistant for a stack-based assembly \
         language. Generate only valid assembly code. Do not include \
         explanations or markdown formatting.\n\nRequest: {request}\n\nCode:"
    )
}

/// Prompt wrapper for repair, enriched with prior successful fixes.
fn repair_prompt(code: &str, error_text: &str, templates: &[String]) -> String {
    let mut prompt = format!(
        "Fix the following stack-based assembly code.\n\n\
         Original code:\n{code}\n\nError: {error_text}\n"
    );
    if !templates.is_empty() {
        prompt.push_str("\nFixes that worked for similar errors:\n");
        for template in templates.iter().take(3) {
            prompt.push_str(template);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nGenerate the corrected assembly code only:");
    prompt
}

/// Drop a leading/trailing markdown code fence if present.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().map_or(false, |l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_plain_text_untouched() {
        assert_eq!(strip_code_fences("PUSH #1\nHALT"), "PUSH #1\nHALT");
        assert_eq!(strip_code_fences("  PUSH #1\n"), "PUSH #1");
    }

    #[test]
    fn strip_fences_removes_markers() {
        assert_eq!(
            strip_code_fences("```\nPUSH #1\nHALT\n```"),
            "PUSH #1\nHALT"
        );
        assert_eq!(
            strip_code_fences("```asm\nPUSH #1\nHALT\n```"),
            "PUSH #1\nHALT"
        );
    }

    #[test]
    fn repair_prompt_includes_templates() {
        let prompt = repair_prompt("POP", "data stack underflow", &["PUSH #1\nPOP".to_string()]);
        assert!(prompt.contains("Original code:\nPOP"));
        assert!(prompt.contains("Error: data stack underflow"));
        assert!(prompt.contains("PUSH #1\nPOP"));
    }

    #[test]
    fn repair_prompt_omits_template_section_when_empty() {
        let prompt = repair_prompt("POP", "data stack underflow", &[]);
        assert!(!prompt.contains("similar errors"));
    }
}
