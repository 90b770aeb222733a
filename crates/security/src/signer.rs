//! HS256 assertion signer.
//!
//! Produces a compact JWS: `base64url(header).base64url(claims).base64url(mac)`
//! with HMAC-SHA256 over the first two parts. Other algorithms plug in
//! through the [`Signer`] trait.

use askgate_config::CredentialsConfig;
use askgate_core::credential::{AssertionClaims, SignedAssertion, Signer};
use askgate_core::error::CredentialError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct HmacJwtSigner {
    principal: String,
    key_id: String,
    key: Option<Vec<u8>>,
}

impl HmacJwtSigner {
    pub fn new(
        principal: impl Into<String>,
        key_id: impl Into<String>,
        key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            principal: principal.into(),
            key_id: key_id.into(),
            key: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::new(
            config.service_account_id.clone().unwrap_or_default(),
            config.key_id.clone().unwrap_or_default(),
            config.signing_key.as_ref().map(|k| k.as_bytes().to_vec()),
        )
    }
}

impl Signer for HmacJwtSigner {
    fn principal(&self) -> &str {
        &self.principal
    }

    fn is_configured(&self) -> bool {
        self.key.is_some() && !self.principal.is_empty() && !self.key_id.is_empty()
    }

    fn sign(&self, claims: &AssertionClaims) -> Result<SignedAssertion, CredentialError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| CredentialError::NotConfigured("signing key is not set".into()))?;

        let header = serde_json::json!({
            "alg": "HS256",
            "typ": "JWT",
            "kid": self.key_id,
        });
        let payload = serde_json::json!({
            "iss": claims.issuer,
            "sub": claims.subject,
            "aud": claims.audience,
            "iat": claims.issued_at.timestamp(),
            "exp": claims.expires_at.timestamp(),
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        );

        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| CredentialError::Signer(e.to_string()))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(SignedAssertion(format!("{signing_input}.{signature}")))
    }
}
