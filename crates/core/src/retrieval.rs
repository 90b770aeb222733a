//! Retriever trait — the document corpus seen from the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Retrieved excerpts, already concatenated and bounded by the retriever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub context: String,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `k` passages relevant to `query`, at most `max_chars` in total.
    async fn context(
        &self,
        query: &str,
        k: usize,
        max_chars: usize,
    ) -> Result<RetrievedContext, CollaboratorError>;

    async fn health_check(&self) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}
