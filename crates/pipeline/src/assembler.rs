//! Prompt assembly: instructions, retrieved context, history, question.
//!
//! Retrieval is fail-open: a failed, slow, or blank retrieval simply omits
//! the context segment. History is not: a store failure fails the request.

use askgate_core::error::StorageError;
use askgate_core::message::{ConversationTurn, Question, TurnRole};
use askgate_core::prompt::AssembledPrompt;
use askgate_core::retrieval::Retriever;
use askgate_core::store::ConversationStore;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Extra turns fetched so the current question can be found behind turns
/// written by concurrent requests.
const HISTORY_SLACK: usize = 4;

// ── Types ─────────────────────────────────────────────────────────────────

/// Assembly settings, all from configuration.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Static policy instructions; the first prompt segment.
    pub system_prompt: String,
    /// Longer questions are cut to this many characters.
    pub max_question_chars: usize,
    /// How many recent turns (user + assistant) to include.
    pub history_turns: usize,
    pub include_history: bool,
    /// Passages requested from the retriever.
    pub retrieval_k: usize,
    /// Character budget for the retrieved context.
    pub retrieval_max_chars: usize,
    pub retrieval_timeout: Duration,
}

impl AssemblerConfig {
    pub fn from_config(config: &askgate_config::AppConfig) -> Self {
        Self {
            system_prompt: config.context.system_prompt.clone(),
            max_question_chars: config.context.max_question_chars,
            history_turns: config.context.history_turns,
            include_history: config.context.include_history,
            retrieval_k: config.retrieval.k,
            retrieval_max_chars: config.retrieval.max_chars,
            retrieval_timeout: Duration::from_secs(config.retrieval.timeout_secs),
        }
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self::from_config(&askgate_config::AppConfig::default())
    }
}

// ── Truncation ────────────────────────────────────────────────────────────

/// Cut `text` to at most `max_chars` characters.
///
/// Counts chars, not bytes, so a multi-byte code point is never split.
pub fn truncate_question(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => {
            warn!(
                original_chars = text.chars().count(),
                truncated_chars = max_chars,
                "Question truncated"
            );
            Cow::Owned(text[..byte_idx].to_string())
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn ConversationStore>,
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        store: Arc<dyn ConversationStore>,
        config: AssemblerConfig,
    ) -> Self {
        Self {
            retriever,
            store,
            config,
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Build the prompt for `question`.
    ///
    /// Retrieval and the history fetch run concurrently.
    pub async fn assemble(&self, question: &Question) -> Result<AssembledPrompt, StorageError> {
        let text = truncate_question(&question.text, self.config.max_question_chars);

        let (context, history) = tokio::join!(
            self.retrieve(&text),
            self.history(&question.user_id, &text)
        );
        let history = history?;

        let prompt = AssembledPrompt::new(
            std::slice::from_ref(&self.config.system_prompt),
            context.as_deref(),
            &history,
            text.into_owned(),
        );
        debug!(
            has_context = prompt.has_context(),
            history = prompt.history_len(),
            estimated_tokens = prompt.estimated_tokens(),
            "Prompt assembled"
        );
        Ok(prompt)
    }

    async fn retrieve(&self, query: &str) -> Option<String> {
        let call = self.retriever.context(
            query,
            self.config.retrieval_k,
            self.config.retrieval_max_chars,
        );
        match tokio::time::timeout(self.config.retrieval_timeout, call).await {
            Ok(Ok(retrieved)) if !retrieved.context.trim().is_empty() => Some(retrieved.context),
            Ok(Ok(_)) => {
                debug!("Retriever returned no context");
                None
            }
            Ok(Err(e)) => {
                warn!(collaborator = self.retriever.name(), error = %e, "Retrieval failed, answering without context");
                None
            }
            Err(_) => {
                warn!(
                    collaborator = self.retriever.name(),
                    timeout_secs = self.config.retrieval_timeout.as_secs(),
                    "Retrieval timed out, answering without context"
                );
                None
            }
        }
    }

    /// Recent turns, oldest first, without the current question's own
    /// user turn (it was persisted just before assembly).
    /// History without the current question's own user turn, at most
    /// `history_turns` long.
    async fn history(
        &self,
        user_id: &str,
        question: &str,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        let wanted = self.config.history_turns;
        if !self.config.include_history || wanted == 0 {
            return Ok(Vec::new());
        }

        // Concurrent requests for the same user may land turns after the one
        // just persisted for this question.
        let mut turns = self.store.fetch_recent(user_id, wanted + HISTORY_SLACK).await?;
        if let Some(own) = turns
            .iter()
            .rposition(|t| t.role == TurnRole::User && t.content == question)
        {
            turns.remove(own);
        }
        if turns.len() > wanted {
            turns.drain(..turns.len() - wanted);
        }
        Ok(turns)
    }
}
