//! Capability-based model registry with per-capability fallback chains.
//!
//! Selection is deterministic: the first registered model whose
//! capability set covers the request wins, with `FastInference` models
//! promoted only when the caller asks for speed. `resolve` walks the
//! chain probing the endpoint and yields `None` iff every candidate
//! fails its probe.

use crate::client::LlmClient;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Capabilities a model can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CodeGeneration,
    ErrorAnalysis,
    InstructionFollowing,
    Reasoning,
    LongContext,
    FastInference,
}

/// A registered model and what it can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    /// Model identifier as the endpoint knows it (tag optional).
    pub id: String,
    /// Advertised capability set.
    pub capabilities: HashSet<Capability>,
}

impl ModelProfile {
    /// Build a profile from an id and capability list.
    pub fn new(id: impl Into<String>, capabilities: &[Capability]) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    fn covers(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    fn is_fast(&self) -> bool {
        self.capabilities.contains(&Capability::FastInference)
    }
}

/// Insertion-ordered model registry. Instances are independent; there is
/// no process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    profiles: Vec<ModelProfile>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock profile table, ordered by preference.
    pub fn with_defaults() -> Self {
        use Capability::*;
        let mut registry = Self::new();
        registry.register(ModelProfile::new(
            "qwen2.5-coder",
            &[CodeGeneration, ErrorAnalysis, Reasoning],
        ));
        registry.register(ModelProfile::new(
            "llama3.2",
            &[CodeGeneration, InstructionFollowing, FastInference],
        ));
        registry.register(ModelProfile::new(
            "codellama",
            &[CodeGeneration, ErrorAnalysis],
        ));
        registry.register(ModelProfile::new(
            "deepseek-coder-v2",
            &[CodeGeneration, ErrorAnalysis, LongContext],
        ));
        registry.register(ModelProfile::new(
            "mistral",
            &[InstructionFollowing, Reasoning, FastInference],
        ));
        registry.register(ModelProfile::new(
            "llama3.2:1b",
            &[InstructionFollowing, FastInference],
        ));
        registry
    }

    /// Register a profile; a profile with the same id is replaced in
    /// place, keeping its position in the chain.
    pub fn register(&mut self, profile: ModelProfile) {
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile;
        } else {
            self.profiles.push(profile);
        }
    }

    /// True iff a profile with this id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.profiles.iter().any(|p| p.id == id)
    }

    /// All registered profiles in chain order.
    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }

    /// The fallback chain for `required`: every covering model, in
    /// registration order, with fast models first iff `prefer_fast`.
    pub fn candidates(&self, required: &[Capability], prefer_fast: bool) -> Vec<&ModelProfile> {
        let mut matches: Vec<&ModelProfile> =
            self.profiles.iter().filter(|p| p.covers(required)).collect();
        if prefer_fast {
            // Stable: registration order is preserved within each group.
            matches.sort_by_key(|p| !p.is_fast());
        }
        matches
    }

    /// The primary selection: head of the fallback chain.
    pub fn select(&self, required: &[Capability], prefer_fast: bool) -> Option<&ModelProfile> {
        self.candidates(required, prefer_fast).into_iter().next()
    }

    /// Walk the fallback chain, probing each candidate against the
    /// endpoint's installed-model list. `None` iff no candidate survives.
    pub async fn resolve<C: LlmClient>(
        &self,
        required: &[Capability],
        prefer_fast: bool,
        client: &C,
    ) -> Option<String> {
        let installed = match client.list_models().await {
            Ok(models) => models,
            Err(error) => {
                warn!(%error, "model discovery failed");
                return None;
            }
        };
        for profile in self.candidates(required, prefer_fast) {
            let available = installed
                .iter()
                .any(|m| m == &profile.id || m.split(':').next() == Some(profile.id.as_str()));
            if available {
                debug!(model = %profile.id, "model resolved");
                return Some(profile.id.clone());
            }
        }
        warn!(?required, "no candidate model passed its probe");
        None
    }
}
