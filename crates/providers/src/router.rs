//! Selects the completion backend and builds the client from configuration.

use askgate_config::{AppConfig, CompletionConfig};
use askgate_core::provider::{CompletionBackend, CompletionParams};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::client::CompletionClient;
use crate::foundation::FoundationBackend;
use crate::openai_compat::OpenAiCompatBackend;
use crate::retry::RetryPolicy;

/// The wire-format backend named by `completion.backend`.
pub fn build_backend(config: &CompletionConfig) -> Arc<dyn CompletionBackend> {
    match config.backend.as_str() {
        "openai" => Arc::new(OpenAiCompatBackend::new(&config.api_url)),
        _ => {
            let folder_id = config.folder_id.clone().unwrap_or_default();
            if folder_id.is_empty() {
                warn!("completion.folder_id is not set; completion requests will be rejected upstream");
            }
            Arc::new(FoundationBackend::new(&config.api_url, folder_id))
        }
    }
}

/// Generation parameters from configuration.
pub fn completion_params(config: &CompletionConfig) -> CompletionParams {
    CompletionParams {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Build the completion client from configuration.
pub fn build_from_config(config: &AppConfig) -> CompletionClient {
    let completion = &config.completion;
    CompletionClient::new(
        build_backend(completion),
        RetryPolicy::from_config(&completion.retry),
        Duration::from_secs(completion.timeout_secs),
    )
}
