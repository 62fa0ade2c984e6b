//! Abstractions for generating text through a hosted chat-completions deployment.
//!
//! Both the query formulation step and the estimation step send a single user-role message
//! and read back `choices[0].message.content`. The trait keeps the pipeline testable without
//! a live deployment.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was unreachable.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Completion request failed: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Content of the single user message.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by generative-text providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a response and return its text trimmed of surrounding whitespace.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Chat-completions client authenticated with an `api-key` header.
pub struct AzureOpenAiClient {
    pub(crate) http: Client,
    pub(crate) endpoint: String,
    pub(crate) api_key: String,
}

impl AzureOpenAiClient {
    /// Create a client for the full chat-completions URL of a deployment.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent("rusty-estimator/completion")
            .build()
            .map_err(|error| CompletionError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from the global configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, CompletionError> {
        Self::new(&config.openai_endpoint, &config.openai_api_key)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = json!({
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint
                ))
            })?;

        tracing::debug!(status = %response.status(), "Completion response received");
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::InvalidResponse("response carried no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> AzureOpenAiClient {
        AzureOpenAiClient::new(&server.url("/openai/deployments/gpt/chat/completions"), "llm-key")
            .expect("client")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "Write a query".into(),
            max_tokens: 150,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn sends_single_user_message_and_trims_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/gpt/chat/completions")
                    .header("api-key", "llm-key")
                    .json_body(json!({
                        "messages": [{ "role": "user", "content": "Write a query" }],
                        "max_tokens": 150,
                        "temperature": 0.5
                    }));
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "  booking portal tasks \n" } }]
                }));
            })
            .await;

        let text = client(&server).complete(request()).await.expect("completion");

        mock.assert();
        assert_eq!(text, "booking portal tasks");
    }

    #[tokio::test]
    async fn non_success_status_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("rate limited");
            })
            .await;

        let error = client(&server)
            .complete(request())
            .await
            .expect_err("error status");
        assert!(
            matches!(error, CompletionError::GenerationFailed(ref message) if message.contains("429"))
        );
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .complete(request())
            .await
            .expect_err("no choices");
        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }
}
