//! Language model providers.
//!
//! Synthesis only needs "prompt in, raw text out"; the providers here adapt
//! that to the OpenAI Responses API and to Ollama's chat API.

pub mod ollama;
pub mod openai;

use crate::config::{ModelConfig, ProviderKind};
use crate::error::LlmError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOptions {
    pub model: String,
    pub reasoning_effort: Option<String>,
    pub verbosity: Option<String>,
}

impl From<&ModelConfig> for LlmOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.name.clone(),
            reasoning_effort: config.reasoning_effort.clone(),
            verbosity: config.verbosity.clone(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Raw completion text for `prompt`.
    async fn complete(&self, prompt: &str, opts: &LlmOptions) -> Result<String, LlmError>;
}

/// Build the provider selected in the configuration.
pub fn provider_from_config(config: &ModelConfig) -> Result<Arc<dyn LlmProvider>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .context("Failed to create HTTP client")?;

    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(
            http,
            non_empty(&config.base_url),
            config.api_key.clone(),
            config.timeout_seconds,
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(
            http,
            non_empty(&config.base_url),
            config.temperature,
            config.timeout_seconds,
        )),
    };

    Ok(provider)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Map a reqwest failure onto [`LlmError`].
pub(crate) fn transport_error(e: reqwest::Error, url: &str, timeout_seconds: u64) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(timeout_seconds)
    } else {
        LlmError::Transport {
            url: url.to_string(),
            source: e,
        }
    }
}
