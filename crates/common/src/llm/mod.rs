//! Chat completion abstraction
//!
//! Every LLM call in the pipeline is a single request/response round-trip
//! over an ordered list of role-tagged messages.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::retry::{self, with_retry};
use async_trait::async_trait;
use backoff::Error as BackoffError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait for chat completion providers
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the generated text for the given conversation
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    base_url: String,
    timeout: Duration,
    retry_budget: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "OpenAI completion API key required".to_string(),
        })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout,
            retry_budget: Duration::from_millis(config.retry_budget_ms),
        })
    }

    async fn make_request(
        &self,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, BackoffError<AppError>> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| retry::send_error("completion", self.timeout, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(retry::status_error(
                status,
                AppError::CompletionError {
                    message: format!("LLM API error {}: {}", status, body),
                },
            ));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            BackoffError::permanent(AppError::CompletionError {
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| {
                BackoffError::permanent(AppError::CompletionError {
                    message: "Empty response from LLM".to_string(),
                })
            })
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    #[tracing::instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        with_retry("completion", self.retry_budget, || self.make_request(messages)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline completion client
///
/// Echoes a prefix of the last user message so that every pipeline stage
/// produces a visible, deterministic result without network access.
pub struct MockCompletionClient;

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let excerpt: String = last_user.trim().chars().take(160).collect();
        Ok(format!(
            "[Mock response - LLM API key not configured] {}",
            excerpt
        ))
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completion client based on configuration
pub fn create_completion_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatClient::new(config)?)),
        "mock" => Ok(Arc::new(MockCompletionClient)),
        other => Err(AppError::Configuration {
            message: format!("Unknown completion provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
    }

    #[test]
    fn test_request_omits_unset_temperature() {
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let client = MockCompletionClient;
        let reply = client
            .complete(&[
                ChatMessage::system("system prompt"),
                ChatMessage::user("Is Professor Smith hard?"),
            ])
            .await
            .unwrap();
        assert!(reply.contains("Is Professor Smith hard?"));
        assert!(!reply.contains("system prompt"));
    }

    #[test]
    fn test_openai_requires_key() {
        assert!(OpenAIChatClient::new(&LlmConfig::default()).is_err());
    }
}
