//! Sovereign evolution subsystem — error-driven code repair over a local
//! LLM service.
//!
//! Components:
//!
//! - [`OllamaClient`] — async HTTP client for the Ollama chat protocol,
//!   with pooling, retries, and typed failures
//! - [`ModelRegistry`] — capability-based model selection with fallback
//!   chains and health probes
//! - [`PatternStore`] — observed error patterns with similarity matching
//!   and success statistics, persistable as NDJSON
//! - [`EvolutionEngine`] — candidate generation plus sandboxed validation
//! - [`Bridge`] — the sync/async boundary: one background worker owning a
//!   tokio event loop, with bounded waits everywhere
//! - [`Evolution`] — the facade tying it together; implements the VM's
//!   [`LlmAdapter`] trait so a VM can reach `LLMGEN`/`EVOLVE` through it
//!
//! The facade owns its collaborators; independent instances (for tests or
//! embedders) never share state.

pub mod bridge;
pub mod client;
pub mod engine;
pub mod error;
pub mod models;
pub mod patterns;

pub use bridge::Bridge;
pub use client::{ChatResponse, ClientConfig, LlmClient, OllamaClient};
pub use engine::{
    CandidateEvaluation, EvolutionAttempt, EvolutionConfig, EvolutionEngine, EvolutionStats,
};
pub use error::{ClientError, EvoError};
pub use models::{Capability, ModelProfile, ModelRegistry};
pub use patterns::{categorize, ErrorCategory, ErrorPattern, PatternStore};

use sovereign_vm::{AdapterError, LlmAdapter};
use std::sync::Arc;
use std::time::Duration;

/// The evolution subsystem facade.
///
/// Construct with [`Evolution::new`], call [`Evolution::initialize`] to
/// start the bridge worker, and hand the instance (via `Arc`) to a VM as
/// its LLM adapter. [`Evolution::shutdown`] stops the worker and closes
/// the connection pool.
pub struct Evolution {
    bridge: Bridge,
    engine: Arc<EvolutionEngine<OllamaClient>>,
}

impl Evolution {
    /// Build the subsystem from configuration. The bridge stays cold
    /// until [`Evolution::initialize`].
    pub fn new(config: EvolutionConfig) -> Result<Self, EvoError> {
        let client = OllamaClient::new(config.client.clone())?;
        let mut models = ModelRegistry::with_defaults();
        if !models.contains(&config.client.default_model) {
            // An endpoint-configured model we don't know gets a baseline
            // profile so selection can still reach it.
            models.register(ModelProfile::new(
                config.client.default_model.clone(),
                &[Capability::CodeGeneration, Capability::InstructionFollowing],
            ));
        }
        Ok(Self {
            bridge: Bridge::new(),
            engine: Arc::new(EvolutionEngine::new(client, models, config)),
        })
    }

    /// Build with configuration from the environment knobs
    /// (`OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLAMA_TIMEOUT`,
    /// `OLLAMA_MAX_RETRIES`).
    pub fn from_env() -> Result<Self, EvoError> {
        let config = EvolutionConfig {
            client: ClientConfig::from_env()?,
            ..EvolutionConfig::default()
        };
        Self::new(config)
    }

    /// Start the background worker. Bounded; never busy-waits.
    pub fn initialize(&mut self) -> Result<(), EvoError> {
        self.bridge.initialize()
    }

    /// Stop the worker and join it.
    pub fn shutdown(&mut self) {
        self.bridge.shutdown();
    }

    /// Synchronously generate code, waiting at most `timeout`.
    pub fn generate_code(&self, prompt: &str, timeout: Duration) -> Result<String, EvoError> {
        let engine = Arc::clone(&self.engine);
        let prompt = prompt.to_string();
        self.bridge
            .run(async move { engine.generate_code(&prompt).await }, timeout)?
    }

    /// Synchronously evolve failing code, waiting at most `timeout`.
    pub fn evolve(
        &self,
        code: &str,
        error_text: &str,
        timeout: Duration,
    ) -> Result<String, EvoError> {
        let engine = Arc::clone(&self.engine);
        let code = code.to_string();
        let error_text = error_text.to_string();
        self.bridge
            .run(async move { engine.evolve(&code, &error_text).await }, timeout)?
    }

    /// Export learned patterns as NDJSON.
    pub fn export_patterns(&self) -> String {
        self.engine.export_patterns()
    }

    /// Additive NDJSON pattern import.
    pub fn import_patterns(&self, stream: &str) -> Result<usize, EvoError> {
        self.engine.import_patterns(stream)
    }

    /// Aggregate evolution statistics.
    pub fn stats(&self) -> EvolutionStats {
        self.engine.stats()
    }
}

fn to_adapter_error(error: EvoError) -> AdapterError {
    match error {
        EvoError::Timeout(duration) => AdapterError::Timeout(duration),
        EvoError::Client(ClientError::Timeout(duration)) => AdapterError::Timeout(duration),
        EvoError::Client(ClientError::MalformedResponse(reason)) => AdapterError::Malformed(reason),
        EvoError::PatternImport(reason) => AdapterError::Malformed(reason),
        EvoError::EvolutionFailed { .. } => AdapterError::Failed(error.to_string()),
        other => AdapterError::Unavailable(other.to_string()),
    }
}

impl LlmAdapter for Evolution {
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, AdapterError> {
        self.generate_code(prompt, timeout)
            .map_err(to_adapter_error)
    }

    fn evolve(
        &self,
        code: &str,
        error_text: &str,
        timeout: Duration,
    ) -> Result<String, AdapterError> {
        Evolution::evolve(self, code, error_text, timeout).map_err(to_adapter_error)
    }
}
