//! The process-wide bearer credential cache.
//!
//! Concurrent callers that find no fresh credential collapse into a single
//! refresh: the first one installs a shared refresh future, the rest await
//! clones of it. Everyone gets the same token or the same error. Failures
//! are not cached.

use async_trait::async_trait;
use askgate_core::credential::{
    AssertionClaims, BearerToken, CachedCredential, Issuer, Signer, TokenSource,
};
use askgate_core::error::CredentialError;
use chrono::{Duration, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Lower bound for the refresh margin.
pub const MIN_SAFETY_MARGIN: Duration = Duration::seconds(60);

/// Upper bound for an issued token's lifetime (one day).
const MAX_TOKEN_TTL_SECS: u64 = 86_400;

type RefreshFuture = Shared<BoxFuture<'static, Result<CachedCredential, CredentialError>>>;

#[derive(Default)]
struct State {
    cached: Option<CachedCredential>,
    /// Refresh in progress, tagged with its generation.
    inflight: Option<(u64, RefreshFuture)>,
    generation: u64,
}

struct Inner {
    signer: Arc<dyn Signer>,
    issuer: Arc<dyn Issuer>,
    safety_margin: Duration,
    assertion_ttl: Duration,
    state: Mutex<State>,
}

/// Owns the single shared credential. Cheap to clone.
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Inner>,
}

impl CredentialCache {
    /// `safety_margin` is clamped to at least [`MIN_SAFETY_MARGIN`].
    pub fn new(
        signer: Arc<dyn Signer>,
        issuer: Arc<dyn Issuer>,
        safety_margin: Duration,
        assertion_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                signer,
                issuer,
                safety_margin: safety_margin.max(MIN_SAFETY_MARGIN),
                assertion_ttl,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn safety_margin(&self) -> Duration {
        self.inner.safety_margin
    }

    /// A fresh token, refreshing it first if needed.
    pub async fn get_token(&self) -> Result<BearerToken, CredentialError> {
        let (generation, refresh) = {
            let mut state = self.lock();
            if let Some(cached) = &state.cached {
                if cached.is_fresh(Utc::now(), self.inner.safety_margin) {
                    return Ok(cached.token.clone());
                }
            }
            match &state.inflight {
                Some((generation, refresh)) => (*generation, refresh.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let refresh = Self::refresh(self.inner.clone()).boxed().shared();
                    state.inflight = Some((generation, refresh.clone()));
                    debug!(generation, "Starting credential refresh");
                    (generation, refresh)
                }
            }
        };

        let result = refresh.await;

        let mut state = self.lock();
        if matches!(&state.inflight, Some((current, _)) if *current == generation) {
            state.inflight = None;
            match &result {
                Ok(credential) => state.cached = Some(credential.clone()),
                Err(e) => warn!(error = %e, "Credential refresh failed"),
            }
        }
        result.map(|credential| credential.token)
    }

    /// Drop the cached credential; the next caller refreshes.
    pub fn invalidate(&self) {
        if self.lock().cached.take().is_some() {
            info!("Cached credential invalidated");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.signer.is_configured()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn refresh(inner: Arc<Inner>) -> Result<CachedCredential, CredentialError> {
        if !inner.signer.is_configured() {
            return Err(CredentialError::NotConfigured(
                "service account key material is missing".into(),
            ));
        }

        let now = Utc::now();
        let principal = inner.signer.principal().to_string();
        let claims = AssertionClaims {
            issuer: principal.clone(),
            subject: principal,
            audience: inner.issuer.audience().to_string(),
            issued_at: now,
            expires_at: now + inner.assertion_ttl,
        };

        let assertion = inner.signer.sign(&claims)?;
        let issued = inner.issuer.exchange(&assertion).await?;

        let ttl = Duration::seconds(issued.ttl_seconds.min(MAX_TOKEN_TTL_SECS) as i64);
        if ttl <= inner.safety_margin {
            warn!(
                ttl_seconds = issued.ttl_seconds,
                margin_seconds = inner.safety_margin.num_seconds(),
                "Issued token lives shorter than the refresh margin"
            );
        }

        let expires_at = Utc::now() + ttl;
        info!(%expires_at, "Credential refreshed");
        Ok(CachedCredential {
            token: issued.token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenSource for CredentialCache {
    async fn token(&self) -> Result<BearerToken, CredentialError> {
        self.get_token().await
    }

    fn invalidate(&self) {
        CredentialCache::invalidate(self);
    }

    fn is_configured(&self) -> bool {
        CredentialCache::is_configured(self)
    }
}

/// A fixed API key, for OpenAI-compatible backends.
pub struct StaticToken {
    token: Option<BearerToken>,
}

impl StaticToken {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            token: api_key.filter(|k| !k.is_empty()).map(BearerToken::new),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<BearerToken, CredentialError> {
        self.token
            .clone()
            .ok_or_else(|| CredentialError::NotConfigured("completion.api_key is not set".into()))
    }

    fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}
