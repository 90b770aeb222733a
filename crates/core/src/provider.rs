//! Completion backend trait — the abstraction over the upstream LLM API.
//!
//! A backend knows one wire format. Retry, backoff and response
//! validation live above it in `askgate_providers::CompletionClient`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::BearerToken;
use crate::error::CompletionError;
use crate::message::RequestId;
use crate::prompt::AssembledPrompt;

/// Generation parameters. Always supplied by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Model name (e.g., "yandexgpt-lite", "gpt-4o-mini")
    pub model: String,

    /// Temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

/// The raw text a backend extracted from the upstream response.
///
/// May still be empty; [`CompletionResult::from_generated`] decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText {
    pub text: String,
}

/// A validated, non-empty answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionResult {
    answer_text: String,
}

impl CompletionResult {
    /// Accept generated text only if it carries an answer.
    pub fn from_generated(generated: GeneratedText) -> Result<Self, CompletionError> {
        let trimmed = generated.text.trim();
        if trimmed.is_empty() {
            return Err(CompletionError::InvalidResponse(
                "completion text is empty".into(),
            ));
        }
        Ok(Self {
            answer_text: trimmed.to_string(),
        })
    }

    pub fn answer_text(&self) -> &str {
        &self.answer_text
    }

    pub fn into_answer(self) -> String {
        self.answer_text
    }
}

/// The core completion backend trait.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A human-readable name (e.g., "foundation", "openai").
    fn name(&self) -> &str;

    /// Send one completion request. Non-2xx statuses map to
    /// [`CompletionError::Upstream`]; undecodable bodies map to
    /// [`CompletionError::InvalidResponse`].
    async fn generate(
        &self,
        token: &BearerToken,
        prompt: &AssembledPrompt,
        params: &CompletionParams,
        request_id: &RequestId,
    ) -> Result<GeneratedText, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_invalid() {
        let err = CompletionResult::from_generated(GeneratedText { text: " \n".into() })
            .unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[test]
    fn answer_is_trimmed() {
        let result = CompletionResult::from_generated(GeneratedText {
            text: "  Refunds take 14 days.\n".into(),
        })
        .unwrap();
        assert_eq!(result.answer_text(), "Refunds take 14 days.");
    }
}
