//! Ollama chat API provider for local models.

use super::{transport_error, LlmOptions, LlmProvider};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// System prompt sent ahead of every user prompt.
const SYSTEM_PROMPT: &str = r#"You are a careful market analyst.
Only use numbers that appear in the user's message.
When asked for JSON, output only valid JSON, no explanations or markdown."#;

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaProvider {
    http: reqwest::Client,
    base_url: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl OllamaProvider {
    pub fn new(
        http: reqwest::Client,
        base_url: Option<String>,
        temperature: f32,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
            timeout_seconds,
        }
    }

    fn request(&self, prompt: &str, opts: &LlmOptions) -> OllamaChatRequest {
        OllamaChatRequest {
            model: opts.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, prompt: &str, opts: &LlmOptions) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.request(prompt, opts);

        debug!("Sending chat request to Ollama model {}", opts.model);

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, &url, self.timeout_seconds))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        Ok(chat_response.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_has_system_and_user_messages() {
        let provider = OllamaProvider::new(reqwest::Client::new(), None, 0.1, 30);
        let opts = LlmOptions {
            model: "llama3.2:latest".to_string(),
            reasoning_effort: None,
            verbosity: None,
        };
        let request = provider.request("analyze", &opts);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "analyze");
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_default_base_url() {
        let provider = OllamaProvider::new(reqwest::Client::new(), None, 0.1, 30);
        assert_eq!(provider.base_url, "http://localhost:11434");
    }
}
