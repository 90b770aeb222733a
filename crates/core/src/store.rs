//! ConversationStore trait — the durable per-user turn log.
//!
//! Every write prunes the user's turns that fell out of the retention
//! window in the same unit of work, so readers never observe a
//! partially-pruned history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::message::ConversationTurn;

/// Implementations: SQLite (durable), in-memory (tests, ephemeral).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a turn and delete the user's turns older than
    /// `turn.timestamp - retention`, atomically.
    async fn append(&self, turn: ConversationTurn) -> Result<(), StorageError>;

    /// At most `max_turns` of the user's most recent turns, oldest→newest.
    async fn fetch_recent(
        &self,
        user_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ConversationTurn>, StorageError>;

    /// Delete every turn of the user. Returns how many were removed.
    async fn forget(&self, user_id: &str) -> Result<u64, StorageError>;

    /// Delete every user's turns older than `now - retention`.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}
