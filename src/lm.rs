//! Language-model boundary.
//!
//! Callers pick a [`ModelTier`]; the backend maps it to a concrete model.
pub mod command;
pub mod gemini;

use crate::config::{ModelBackend, ModelSettings};
use anyhow::Result;

pub use command::CommandModel;
pub use gemini::GeminiModel;

/// Capability tier requested for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Lighter, cheaper model.
    Standard,
    /// Higher-capability model, used for full content rewrites.
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Absent when the backend does not report usage.
    pub usage: Option<TokenUsage>,
}

pub trait LanguageModel {
    fn complete(&self, tier: ModelTier, prompt: &str) -> Result<Completion>;
}

/// Model names per tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    pub standard: String,
    pub advanced: String,
}

impl ModelNames {
    pub fn for_tier(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.standard,
            ModelTier::Advanced => &self.advanced,
        }
    }
}

/// Build the configured backend.
pub fn from_settings(settings: &ModelSettings) -> Box<dyn LanguageModel> {
    let names = ModelNames {
        standard: settings.standard_model.clone(),
        advanced: settings.advanced_model.clone(),
    };
    match &settings.backend {
        ModelBackend::Gemini { api_key } => {
            Box::new(GeminiModel::new(api_key.clone(), names, settings.timeout))
        }
        ModelBackend::Command { command } => {
            Box::new(CommandModel::new(command.clone(), names, settings.timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[cfg(unix)]
    #[test]
    fn command_backend_honors_configured_timeout() {
        let settings = ModelSettings {
            backend: ModelBackend::Command {
                command: "sh -c \"sleep 30\"".to_string(),
            },
            standard_model: "small".to_string(),
            advanced_model: "large".to_string(),
            timeout: Duration::from_secs(1),
        };
        let model = from_settings(&settings);
        let start = Instant::now();
        assert!(model.complete(ModelTier::Standard, "hello").is_err());
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
