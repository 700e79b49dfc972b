//! Environment-driven configuration for the store and model collaborators.
//!
//! Every value is resolved through a lookup function so the same code path
//! serves the process environment and tests. Missing required values are a
//! hard startup failure; nothing degrades silently.
use std::time::Duration;
use thiserror::Error;

pub const CONFLUENCE_URL: &str = "CONFLUENCE_URL";
pub const CONFLUENCE_USERNAME: &str = "CONFLUENCE_USERNAME";
pub const CONFLUENCE_API_TOKEN: &str = "CONFLUENCE_API_TOKEN";
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const LM_COMMAND: &str = "STEWARD_LM_COMMAND";
pub const STANDARD_MODEL: &str = "STEWARD_STANDARD_MODEL";
pub const ADVANCED_MODEL: &str = "STEWARD_ADVANCED_MODEL";
pub const STORE_TIMEOUT_SECS: &str = "STEWARD_STORE_TIMEOUT_SECS";
pub const LM_TIMEOUT_SECS: &str = "STEWARD_LM_TIMEOUT_SECS";

const DEFAULT_STANDARD_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ADVANCED_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LM_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variables not set: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("{name} must be a positive number of seconds (got {value:?})")]
    InvalidTimeout { name: &'static str, value: String },
}

/// Document store endpoint and credentials.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
    /// Ceiling on total wall time for one store operation.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    Gemini { api_key: String },
    /// Local command; prompt on stdin, completion on stdout.
    Command { command: String },
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: ModelBackend,
    pub standard_model: String,
    pub advanced_model: String,
    pub timeout: Duration,
}

impl StoreSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let base_url = required(&lookup, CONFLUENCE_URL, &mut missing);
        let username = required(&lookup, CONFLUENCE_USERNAME, &mut missing);
        let api_token = required(&lookup, CONFLUENCE_API_TOKEN, &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let timeout = timeout_secs(&lookup, STORE_TIMEOUT_SECS, DEFAULT_STORE_TIMEOUT_SECS)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            api_token,
            timeout,
        })
    }
}

impl ModelSettings {
    /// Resolve the model backend. A command from the CLI flag wins over
    /// `STEWARD_LM_COMMAND`; without either, the Gemini key is required.
    pub fn from_lookup<F>(lookup: F, command_override: Option<&str>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let command = command_override
            .map(str::to_string)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| non_empty(&lookup, LM_COMMAND));
        let backend = match command {
            Some(command) => ModelBackend::Command { command },
            None => {
                let mut missing = Vec::new();
                let api_key = required(&lookup, GEMINI_API_KEY, &mut missing);
                if !missing.is_empty() {
                    return Err(ConfigError::Missing(missing));
                }
                ModelBackend::Gemini { api_key }
            }
        };
        Ok(Self {
            backend,
            standard_model: non_empty(&lookup, STANDARD_MODEL)
                .unwrap_or_else(|| DEFAULT_STANDARD_MODEL.to_string()),
            advanced_model: non_empty(&lookup, ADVANCED_MODEL)
                .unwrap_or_else(|| DEFAULT_ADVANCED_MODEL.to_string()),
            timeout: timeout_secs(&lookup, LM_TIMEOUT_SECS, DEFAULT_LM_TIMEOUT_SECS)?,
        })
    }
}

/// Load both collaborators together so every missing name lands in one
/// diagnostic.
pub fn load_all<F>(
    lookup: F,
    command_override: Option<&str>,
) -> Result<(StoreSettings, ModelSettings), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let store = StoreSettings::from_lookup(&lookup);
    let model = ModelSettings::from_lookup(&lookup, command_override);
    match (store, model) {
        (Ok(store), Ok(model)) => Ok((store, model)),
        (Err(ConfigError::Missing(mut names)), Err(ConfigError::Missing(more))) => {
            names.extend(more);
            Err(ConfigError::Missing(names))
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    }
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required<F>(lookup: &F, name: &'static str, missing: &mut Vec<&'static str>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        Some(value) => value,
        None => {
            missing.push(name);
            String::new()
        }
    }
}

fn timeout_secs<F>(lookup: &F, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, name) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout { name, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
