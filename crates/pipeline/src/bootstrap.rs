//! Builds every collaborator and the pipeline from configuration.

use askgate_config::{AppConfig, MAX_ASSERTION_TTL_SECS, MAX_SAFETY_MARGIN_SECS};
use askgate_core::credential::TokenSource;
use askgate_core::error::{Error, Result, StorageError};
use askgate_core::safety::Detector;
use askgate_core::store::ConversationStore;
use askgate_memory::{InMemoryTurnStore, SqliteTurnStore};
use askgate_providers::{HttpDetector, HttpIssuer, HttpModerator, HttpRetriever};
use askgate_security::{CredentialCache, HmacJwtSigner, PatternDetector, SafetyGate, StaticToken};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assembler::{AssemblerConfig, ContextAssembler};
use crate::pipeline::RequestPipeline;

/// Open the configured conversation store.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ConversationStore>> {
    let retention = chrono::Duration::days(i64::from(config.memory.retention_days));
    match config.memory.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryTurnStore::new(retention))),
        _ => {
            let path = config.memory.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            let store = SqliteTurnStore::new(&path.to_string_lossy(), retention).await?;
            Ok(Arc::new(store))
        }
    }
}

/// The injection detector named by `safety.detector`.
pub fn build_detector(config: &AppConfig) -> Result<Arc<dyn Detector>> {
    match config.safety.detector.as_str() {
        "builtin" => {
            let detector = PatternDetector::new().map_err(|e| Error::Config {
                message: format!("built-in injection patterns: {e}"),
            })?;
            Ok(Arc::new(detector))
        }
        _ => Ok(Arc::new(HttpDetector::new(&config.safety.detector_url))),
    }
}

/// Clamped to `max` so that adding it to a timestamp cannot overflow.
fn bounded_seconds(secs: u64, max: u64) -> chrono::Duration {
    let secs = i64::try_from(secs.min(max)).unwrap_or(0);
    chrono::Duration::try_seconds(secs).unwrap_or_else(chrono::Duration::zero)
}

/// Service-account credentials for the foundation backend, the static
/// API key for the OpenAI-compatible one.
pub fn build_token_source(config: &AppConfig) -> Arc<dyn TokenSource> {
    match config.completion.backend.as_str() {
        "openai" => Arc::new(StaticToken::new(config.completion.api_key.clone())),
        _ => {
            let creds = &config.credentials;
            Arc::new(CredentialCache::new(
                Arc::new(HmacJwtSigner::from_config(creds)),
                Arc::new(HttpIssuer::new(
                    &creds.issuer_url,
                    Duration::from_secs(creds.timeout_secs),
                )),
                bounded_seconds(creds.safety_margin_secs, MAX_SAFETY_MARGIN_SECS),
                bounded_seconds(creds.assertion_ttl_secs, MAX_ASSERTION_TTL_SECS),
            ))
        }
    }
}

pub fn build_safety_gate(config: &AppConfig) -> Result<SafetyGate> {
    Ok(SafetyGate::new(
        build_detector(config)?,
        Arc::new(HttpModerator::new(&config.safety.moderator_url)),
        Duration::from_secs(config.safety.detector_timeout_secs),
        Duration::from_secs(config.safety.moderator_timeout_secs),
    ))
}

/// Build the pipeline around an already-open store.
pub fn build_pipeline_with_store(
    config: &AppConfig,
    store: Arc<dyn ConversationStore>,
) -> Result<RequestPipeline> {
    let assembler = ContextAssembler::new(
        Arc::new(HttpRetriever::new(&config.retrieval.url)),
        store.clone(),
        AssemblerConfig::from_config(config),
    );

    let pipeline = RequestPipeline::new(
        store,
        build_safety_gate(config)?,
        assembler,
        build_token_source(config),
        askgate_providers::build_from_config(config),
        askgate_providers::completion_params(&config.completion),
        config.safety.blocked_message.clone(),
    );

    info!(
        backend = %config.completion.backend,
        detector = %config.safety.detector,
        memory = %config.memory.backend,
        credentials_configured = pipeline.credentials_configured(),
        "Request pipeline ready"
    );
    Ok(pipeline)
}

/// Open the store and build the pipeline.
pub async fn build_pipeline(config: &AppConfig) -> Result<RequestPipeline> {
    let store = open_store(config).await?;
    build_pipeline_with_store(config, store)
}
