//! LLM integration for the intent oracle.
//!
//! Supports:
//! - **Groq**: OpenAI-compatible endpoint, default backend
//! - **OpenAI**: direct API access
//!
//! Both speak the `/chat/completions` dialect, so a single
//! `OpenAiCompatProvider` serves them.

pub mod oracle;
pub mod provider;

pub use oracle::LlmOracle;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAi,
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "NEXUS_LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected groq or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl LlmConfig {
    /// Read `NEXUS_LLM_BACKEND` (default groq), the backend's API key
    /// (required), and optional `NEXUS_LLM_MODEL` / `NEXUS_LLM_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = std::env::var("NEXUS_LLM_BACKEND")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(LlmBackend::Groq);

        let key_var = backend.api_key_var();
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: key_var.to_string(),
                hint: format!("API key for the {} scoring oracle", backend.name()),
            })?;

        let model = std::env::var("NEXUS_LLM_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());
        let base_url = std::env::var("NEXUS_LLM_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| backend.default_base_url().to_string());

        Ok(Self {
            backend,
            api_key: SecretString::from(api_key),
            model,
            base_url,
            timeout: Duration::from_secs(60),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatProvider::new(
        config.backend.name(),
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
        config.timeout,
    )?;
    tracing::info!("Using {} (model: {})", config.backend.name(), config.model);
    Ok(Arc::new(provider))
}
