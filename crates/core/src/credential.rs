//! Credential types and the two external capabilities used to mint them.
//!
//! A [`Signer`] turns assertion claims into a signed blob; an [`Issuer`]
//! exchanges that blob for a short-lived bearer token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// A bearer token for the completion API. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// The process-wide cached credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredential {
    pub token: BearerToken,
    pub expires_at: DateTime<Utc>,
}

impl CachedCredential {
    /// Usable at `now` if it does not expire within `margin`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }
}

/// Claims of the self-signed assertion presented to the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionClaims {
    pub issuer: String,
    pub subject: String,
    pub audience: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An opaque signed credential blob.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAssertion(pub String);

impl std::fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignedAssertion([REDACTED])")
    }
}

/// What the issuer hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: BearerToken,
    pub ttl_seconds: u64,
}

/// Signs assertion claims. Cryptographic details are the implementor's.
pub trait Signer: Send + Sync {
    /// Issuer and subject identity the signer speaks for.
    fn principal(&self) -> &str;

    /// Whether key material is present.
    fn is_configured(&self) -> bool;

    fn sign(&self, claims: &AssertionClaims) -> Result<SignedAssertion, CredentialError>;
}

/// Exchanges a signed assertion for a bearer token.
#[async_trait]
pub trait Issuer: Send + Sync {
    /// The audience assertions must be addressed to.
    fn audience(&self) -> &str;

    async fn exchange(&self, assertion: &SignedAssertion) -> Result<IssuedToken, CredentialError>;
}

/// Hands out the bearer token for the completion call.
///
/// The request pipeline depends on this seam only; the single-flight
/// credential cache and a static API key both implement it.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<BearerToken, CredentialError>;

    /// Forget any cached token; the next call obtains a new one.
    fn invalidate(&self) {}

    fn is_configured(&self) -> bool;
}
