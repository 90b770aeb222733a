//! Token issuer client.
//!
//! Exchanges a signed assertion for a short-lived bearer token:
//! `POST {url} {"jwt": ...}` → `{"iamToken", "expiresAt"?, "ttlSeconds"?}`.

use async_trait::async_trait;
use askgate_core::credential::{BearerToken, IssuedToken, Issuer, SignedAssertion};
use askgate_core::error::CredentialError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collaborators::http_client;

/// Lifetime assumed when the issuer reports neither a TTL nor an expiry.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3500;

pub struct HttpIssuer {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpIssuer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: http_client(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    iam_token: String,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    ttl_seconds: Option<u64>,
}

impl TokenResponse {
    fn ttl_at(&self, now: DateTime<Utc>) -> Result<u64, CredentialError> {
        if let Some(ttl) = self.ttl_seconds {
            return Ok(ttl);
        }
        match &self.expires_at {
            Some(raw) => {
                let expires = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                    CredentialError::MalformedResponse(format!("expiresAt '{raw}': {e}"))
                })?;
                let remaining = (expires.with_timezone(&Utc) - now).num_seconds();
                Ok(u64::try_from(remaining).unwrap_or(0))
            }
            None => Ok(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

#[async_trait]
impl Issuer for HttpIssuer {
    fn audience(&self) -> &str {
        &self.url
    }

    async fn exchange(&self, assertion: &SignedAssertion) -> Result<IssuedToken, CredentialError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "jwt": assertion.0 }))
            .send()
            .await
            .map_err(|e| CredentialError::IssuerUnreachable(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Issuer rejected assertion");
            return Err(CredentialError::IssuerRejected {
                status_code: status,
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CredentialError::IssuerUnreachable(e.to_string()))?;
        let body: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?;

        if body.iam_token.trim().is_empty() {
            return Err(CredentialError::MalformedResponse("iamToken is empty".into()));
        }

        let ttl_seconds = body.ttl_at(Utc::now())?;
        debug!(ttl_seconds, "Issuer granted token");
        Ok(IssuedToken {
            token: BearerToken::new(body.iam_token),
            ttl_seconds,
        })
    }
}
