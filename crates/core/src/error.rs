//! Error types for the askgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the
//! classified union that reaches the HTTP boundary.

use thiserror::Error;

/// The top-level error type for a gateway request.
///
/// Every pipeline stage returns one of these variants. Safety blocks are
/// not errors (they are a normal outcome), and fail-open collaborators
/// (the retriever) never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// The request itself is invalid. No collaborator was called.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The bearer credential for the completion API could not be obtained.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The upstream completion call failed after the retry budget.
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    /// The conversation store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure to obtain a bearer credential.
///
/// `Clone` so that one in-flight refresh can hand the same error to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("Credentials not configured: {0}")]
    NotConfigured(String),

    #[error("Assertion signing failed: {0}")]
    Signer(String),

    #[error("Issuer unreachable: {0}")]
    IssuerUnreachable(String),

    #[error("Issuer rejected the assertion (status: {status_code}): {message}")]
    IssuerRejected { status_code: u16, message: String },

    #[error("Malformed issuer response: {0}")]
    MalformedResponse(String),
}

/// Transport-level failure of a screening or retrieval collaborator.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    Timeout {
        collaborator: String,
        timeout_ms: u64,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure of the upstream completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned status {status_code}: {message}")]
    Upstream { status_code: u16, message: String },

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// The HTTP status behind this error, if the upstream answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
