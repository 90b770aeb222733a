//! # askgate Core
//!
//! Domain types, traits, and error definitions for the askgate question
//! gateway. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (detector, moderator, retriever, issuer,
//! signer, completion backend) and the conversation store is a trait here.
//! Implementations live in their respective crates, so the request
//! pipeline can be tested end to end with in-process stubs.

pub mod credential;
pub mod error;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod retrieval;
pub mod safety;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use credential::{
    AssertionClaims, BearerToken, CachedCredential, IssuedToken, Issuer, SignedAssertion, Signer,
    TokenSource,
};
pub use error::{
    CollaboratorError, CompletionError, CredentialError, Error, Result, StorageError,
};
pub use message::{ConversationTurn, Question, RequestId, Role, TurnRole};
pub use prompt::{AssembledPrompt, PromptSegment, SegmentKind};
pub use provider::{CompletionBackend, CompletionParams, CompletionResult, GeneratedText};
pub use retrieval::{RetrievedContext, Retriever};
pub use safety::{BlockReason, DetectOutcome, Detector, ModerationOutcome, Moderator, SafetyVerdict};
pub use store::ConversationStore;
