//! OpenAI-compatible completion backend.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions`. The bearer token is whatever the token source
//! hands out (usually a static API key).

use async_trait::async_trait;
use askgate_core::credential::BearerToken;
use askgate_core::error::CompletionError;
use askgate_core::message::RequestId;
use askgate_core::prompt::AssembledPrompt;
use askgate_core::provider::{CompletionBackend, CompletionParams, GeneratedText};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::http_client;

pub struct OpenAiCompatBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(),
        }
    }

    fn to_api_messages(prompt: &AssembledPrompt) -> Vec<ApiMessage> {
        prompt
            .segments()
            .iter()
            .map(|s| ApiMessage {
                role: s.role.as_str().to_string(),
                content: Some(s.text.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        token: &BearerToken,
        prompt: &AssembledPrompt,
        params: &CompletionParams,
        request_id: &RequestId,
    ) -> Result<GeneratedText, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": params.model,
            "messages": Self::to_api_messages(prompt),
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "stream": false,
        });

        debug!(request_id = %request_id, model = %params.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose())
            .header("X-Request-ID", request_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(request_id = %request_id, status, body = %error_body, "Provider returned error");
            return Err(CompletionError::Upstream {
                status_code: status,
                message: error_body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        let api_response: ApiResponse = serde_json::from_slice(&bytes)
            .map_err(|e| CompletionError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::InvalidResponse("No choices in response".into()))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| CompletionError::InvalidResponse("Choice has no content".into()))?;

        Ok(GeneratedText { text })
    }
}

// --- API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
