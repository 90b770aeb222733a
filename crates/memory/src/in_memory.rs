//! In-memory conversation store for tests and ephemeral gateways.

use async_trait::async_trait;
use askgate_core::error::StorageError;
use askgate_core::message::ConversationTurn;
use askgate_core::store::ConversationStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Turns per user, kept in insertion order.
pub struct InMemoryTurnStore {
    turns: Arc<RwLock<HashMap<String, Vec<ConversationTurn>>>>,
    retention: Duration,
}

impl InMemoryTurnStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            turns: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Saturates at the earliest instant when the retention reaches past it.
    fn cutoff(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl Default for InMemoryTurnStore {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

#[async_trait]
impl ConversationStore for InMemoryTurnStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, turn: ConversationTurn) -> Result<(), StorageError> {
        let cutoff = self.cutoff(turn.timestamp);
        let mut turns = self.turns.write().await;
        let log = turns.entry(turn.user_id.clone()).or_default();
        log.push(turn);
        log.retain(|t| t.timestamp >= cutoff);
        // Stable sort: equal timestamps keep insertion order.
        log.sort_by_key(|t| t.timestamp);
        Ok(())
    }

    async fn fetch_recent(
        &self,
        user_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        let turns = self.turns.read().await;
        let Some(log) = turns.get(user_id) else {
            return Ok(Vec::new());
        };
        let start = log.len().saturating_sub(max_turns);
        Ok(log[start..].to_vec())
    }

    async fn forget(&self, user_id: &str) -> Result<u64, StorageError> {
        let removed = self
            .turns
            .write()
            .await
            .remove(user_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let cutoff = self.cutoff(now);
        let mut turns = self.turns.write().await;
        let mut removed = 0u64;
        for log in turns.values_mut() {
            let before = log.len();
            log.retain(|t| t.timestamp >= cutoff);
            removed += (before - log.len()) as u64;
        }
        turns.retain(|_, log| !log.is_empty());
        Ok(removed)
    }
}
