//! Collaborator and completion clients for askgate.
//!
//! Implements the `askgate_core` collaborator traits over HTTP, plus the
//! completion backends and the retrying [`CompletionClient`]. The router
//! builds the configured backend.

pub mod client;
pub mod collaborators;
pub mod foundation;
pub mod issuer;
pub mod openai_compat;
pub mod retry;
pub mod router;

#[cfg(test)]
mod test_server;

pub use client::CompletionClient;
pub use collaborators::{HttpDetector, HttpModerator, HttpRetriever};
pub use foundation::FoundationBackend;
pub use issuer::HttpIssuer;
pub use openai_compat::OpenAiCompatBackend;
pub use retry::RetryPolicy;
pub use router::{build_backend, build_from_config, completion_params};
