//! Security primitives for askgate — the credential cache, assertion
//! signing, and question screening.
//!
//! Provides:
//! - **Credentials**: single-flight [`CredentialCache`] and a [`StaticToken`] source
//! - **Signing**: HS256 [`HmacJwtSigner`]
//! - **Screening**: fail-closed [`SafetyGate`] and the built-in [`PatternDetector`]

pub mod credential;
pub mod gate;
pub mod patterns;
pub mod signer;

pub use credential::{CredentialCache, MIN_SAFETY_MARGIN, StaticToken};
pub use gate::SafetyGate;
pub use patterns::PatternDetector;
pub use signer::HmacJwtSigner;
