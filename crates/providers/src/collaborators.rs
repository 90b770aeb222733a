//! HTTP clients for the screening and retrieval services.
//!
//! Each service is a small JSON-over-HTTP API. Responses are decoded into
//! typed structs; a body that does not match is a
//! [`CollaboratorError::MalformedResponse`], never a defaulted value.
//! Timeouts are applied by the caller (safety gate, context assembler).

use async_trait::async_trait;
use askgate_core::error::CollaboratorError;
use askgate_core::retrieval::{RetrievedContext, Retriever};
use askgate_core::safety::{DetectOutcome, Detector, ModerationOutcome, Moderator};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A shared reqwest client.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("askgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<R, CollaboratorError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| CollaboratorError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!(url, status = status.as_u16(), "Collaborator returned error");
        return Err(CollaboratorError::Status {
            status_code: status.as_u16(),
            message,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CollaboratorError::Network(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))
}

async fn probe(client: &reqwest::Client, base_url: &str) -> Result<bool, CollaboratorError> {
    let response = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .map_err(|e| CollaboratorError::Network(e.to_string()))?;
    Ok(response.status().is_success())
}

#[derive(Serialize)]
struct TextBody<'a> {
    text: &'a str,
}

/// Client for the injection detector service (`POST /detect`).
pub struct HttpDetector {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDetector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn name(&self) -> &str {
        "security"
    }

    async fn detect(&self, text: &str) -> Result<DetectOutcome, CollaboratorError> {
        let url = format!("{}/detect", self.base_url);
        let outcome: DetectOutcome = post_json(&self.client, &url, &TextBody { text }).await?;
        debug!(is_injection = outcome.is_injection, "Detector answered");
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        probe(&self.client, &self.base_url).await
    }
}

/// Client for the moderation service (`POST /moderate`).
pub struct HttpModerator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpModerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Moderator for HttpModerator {
    fn name(&self) -> &str {
        "moderation"
    }

    async fn moderate(&self, text: &str) -> Result<ModerationOutcome, CollaboratorError> {
        let url = format!("{}/moderate", self.base_url);
        let outcome: ModerationOutcome = post_json(&self.client, &url, &TextBody { text }).await?;
        debug!(malicious = outcome.malicious, raw = %outcome.raw, "Moderator answered");
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        probe(&self.client, &self.base_url).await
    }
}

/// Client for the retrieval service (`POST /context`).
pub struct HttpRetriever {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(),
        }
    }
}

#[derive(Serialize)]
struct ContextBody<'a> {
    query: &'a str,
    k: usize,
    max_chars: usize,
}

#[derive(serde::Deserialize)]
struct ContextResponse {
    context: String,
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "retrieval"
    }

    async fn context(
        &self,
        query: &str,
        k: usize,
        max_chars: usize,
    ) -> Result<RetrievedContext, CollaboratorError> {
        let url = format!("{}/context", self.base_url);
        let body = ContextBody {
            query,
            k,
            max_chars,
        };
        let response: ContextResponse = post_json(&self.client, &url, &body).await?;
        debug!(chars = response.context.chars().count(), "Retriever answered");
        Ok(RetrievedContext {
            context: response.context,
        })
    }

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        probe(&self.client, &self.base_url).await
    }
}
