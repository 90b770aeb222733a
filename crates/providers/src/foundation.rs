//! Foundation-models completion backend.
//!
//! Wire format: `modelUri` + `completionOptions` + `messages[{role, text}]`,
//! answer at `result.alternatives[0].message.text`. The folder id goes both
//! into the model URI and the `x-folder-id` header.

use async_trait::async_trait;
use askgate_core::credential::BearerToken;
use askgate_core::error::CompletionError;
use askgate_core::message::RequestId;
use askgate_core::prompt::AssembledPrompt;
use askgate_core::provider::{CompletionBackend, CompletionParams, GeneratedText};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::http_client;

pub struct FoundationBackend {
    api_url: String,
    folder_id: String,
    client: reqwest::Client,
}

impl FoundationBackend {
    pub fn new(api_url: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            folder_id: folder_id.into(),
            client: http_client(),
        }
    }

    /// `gpt://{folder}/{model}` unless the model is already a full URI.
    fn model_uri(&self, model: &str) -> String {
        if model.contains("://") {
            model.to_string()
        } else {
            format!("gpt://{}/{}", self.folder_id, model)
        }
    }

    fn to_request(&self, prompt: &AssembledPrompt, params: &CompletionParams) -> ApiRequest {
        ApiRequest {
            model_uri: self.model_uri(&params.model),
            completion_options: ApiOptions {
                stream: false,
                temperature: params.temperature,
                max_tokens: params.max_tokens.to_string(),
            },
            messages: prompt
                .segments()
                .iter()
                .map(|s| ApiMessage {
                    role: s.role.as_str().to_string(),
                    text: s.text.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl CompletionBackend for FoundationBackend {
    fn name(&self) -> &str {
        "foundation"
    }

    async fn generate(
        &self,
        token: &BearerToken,
        prompt: &AssembledPrompt,
        params: &CompletionParams,
        request_id: &RequestId,
    ) -> Result<GeneratedText, CompletionError> {
        let body = self.to_request(prompt, params);

        debug!(
            request_id = %request_id,
            model = %body.model_uri,
            segments = body.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token.expose())
            .header("x-folder-id", &self.folder_id)
            .header("X-Request-ID", request_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(request_id = %request_id, status, body = %error_body, "Completion endpoint returned error");
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

        let alternative = api_response
            .result
            .alternatives
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::InvalidResponse("No alternatives in response".into()))?;

        Ok(GeneratedText {
            text: alternative.message.text,
        })
    }
}

// --- API types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    model_uri: String,
    completion_options: ApiOptions,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiOptions {
    stream: bool,
    temperature: f32,
    // int64 values travel as strings in this API's JSON mapping
    max_tokens: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: ApiResult,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    alternatives: Vec<ApiAlternative>,
}

#[derive(Debug, Deserialize)]
struct ApiAlternative {
    message: ApiMessage,
}
