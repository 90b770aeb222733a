//! SQLite conversation store.
//!
//! One table, `turns`, keyed by an autoincrement id so that turns with an
//! identical timestamp keep their insertion order. Timestamps are stored
//! as integer microseconds since the epoch.

use async_trait::async_trait;
use askgate_core::error::StorageError;
use askgate_core::message::{ConversationTurn, TurnRole};
use askgate_core::store::ConversationStore;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A durable per-user turn log backed by SQLite.
pub struct SqliteTurnStore {
    pool: SqlitePool,
    retention: Duration,
}

impl SqliteTurnStore {
    /// Open (or create) the database at `path`.
    ///
    /// `":memory:"` gives an ephemeral database pinned to a single
    /// connection, since every pooled connection would otherwise see its
    /// own empty database.
    pub async fn new(path: &str, retention: Duration) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:" || path == "sqlite::memory:";
        let url = if in_memory || path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StorageError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool, retention).await?;
        info!(path, retention_days = retention.num_days(), "SQLite conversation store initialized");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool, retention: Duration) -> Result<Self, StorageError> {
        let store = Self { pool, retention };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                chat_id     TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content     TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_user_created ON turns(user_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(format!("user index: {e}")))?;

        debug!("SQLite conversation store migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Option<ConversationTurn> {
        let role: String = row.get("role");
        let Some(role) = TurnRole::parse(&role) else {
            warn!(role, "Skipping turn with unknown role");
            return None;
        };
        let micros: i64 = row.get("created_at");
        let timestamp = DateTime::<Utc>::from_timestamp_micros(micros)?;
        Some(ConversationTurn {
            user_id: row.get("user_id"),
            chat_id: row.get("chat_id"),
            role,
            content: row.get("content"),
            timestamp,
        })
    }
}

/// Turns stamped before this are expired. A retention reaching past the
/// representable range keeps everything.
fn cutoff_micros(at: DateTime<Utc>, retention: Duration) -> i64 {
    at.checked_sub_signed(retention)
        .map_or(i64::MIN, |cutoff| cutoff.timestamp_micros())
}

#[async_trait]
impl ConversationStore for SqliteTurnStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, turn: ConversationTurn) -> Result<(), StorageError> {
        let cutoff = cutoff_micros(turn.timestamp, self.retention);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            "INSERT INTO turns (user_id, chat_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.user_id)
        .bind(&turn.chat_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.timestamp.timestamp_micros())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("insert turn: {e}")))?;

        let pruned = sqlx::query("DELETE FROM turns WHERE user_id = ? AND created_at < ?")
            .bind(&turn.user_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("prune: {e}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| StorageError::Storage(format!("commit: {e}")))?;

        debug!(user_id = %turn.user_id, role = turn.role.as_str(), pruned, "Appended turn");
        Ok(())
    }

    async fn fetch_recent(
        &self,
        user_id: &str,
        max_turns: usize,
    ) -> Result<Vec<ConversationTurn>, StorageError> {
        if max_turns == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT user_id, chat_id, role, content, created_at FROM (
                SELECT id, user_id, chat_id, role, content, created_at
                FROM turns
                WHERE user_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ?
            )
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(max_turns).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(format!("fetch recent: {e}")))?;

        Ok(rows.iter().filter_map(Self::row_to_turn).collect())
    }

    async fn forget(&self, user_id: &str) -> Result<u64, StorageError> {
        let removed = sqlx::query("DELETE FROM turns WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("forget: {e}")))?
            .rows_affected();
        info!(user_id, removed, "Forgot conversation history");
        Ok(removed)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let cutoff = cutoff_micros(now, self.retention);
        let removed = sqlx::query("DELETE FROM turns WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("prune expired: {e}")))?
            .rows_affected();
        debug!(removed, "Pruned expired turns");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteTurnStore {
        let path = dir.path().join("history.db");
        SqliteTurnStore::new(path.to_str().unwrap(), Duration::days(7))
            .await
            .unwrap()
    }

    fn turn(user: &str, role: TurnRole, content: &str, ts: DateTime<Utc>) -> ConversationTurn {
        ConversationTurn::at(user, user, role, content, ts)
    }

    #[tokio::test]
    async fn fetch_recent_is_oldest_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let base = Utc::now();

        for i in 0..5 {
            let role = if i % 2 == 0 { TurnRole::User } else { TurnRole::Assistant };
            store
                .append(turn("u1", role, &format!("m{i}"), base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let recent = store.fetch_recent("u1", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(recent[0].role, TurnRole::User);
        assert_eq!(recent[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn identical_timestamps_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let ts = Utc::now();

        store.append(turn("u1", TurnRole::User, "q", ts)).await.unwrap();
        store.append(turn("u1", TurnRole::Assistant, "a", ts)).await.unwrap();

        let recent = store.fetch_recent("u1", 10).await.unwrap();
        assert_eq!(recent[0].content, "q");
        assert_eq!(recent[1].content, "a");
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store.append(ConversationTurn::user("alice", "c1", "hi")).await.unwrap();
        store.append(ConversationTurn::user("bob", "c2", "hello")).await.unwrap();

        let alice = store.fetch_recent("alice", 10).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].content, "hi");
    }

    #[tokio::test]
    async fn append_prunes_turns_outside_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let now = Utc::now();

        store
            .append(turn("u1", TurnRole::User, "ancient", now - Duration::days(8)))
            .await
            .unwrap();
        store
            .append(turn("bob", TurnRole::User, "bob-ancient", now - Duration::days(8)))
            .await
            .unwrap();
        store.append(turn("u1", TurnRole::User, "fresh", now)).await.unwrap();

        let recent = store.fetch_recent("u1", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "fresh");

        // Pruning on append only touches the writing user.
        assert_eq!(store.fetch_recent("bob", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unbounded_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTurnStore::new(
            &dir.path().join("forever.db").to_string_lossy(),
            Duration::days(i64::from(u32::MAX)),
        )
        .await
        .unwrap();
        let now = Utc::now();

        store
            .append(turn("u1", TurnRole::User, "ancient", now - Duration::days(3650)))
            .await
            .unwrap();
        store.append(turn("u1", TurnRole::User, "fresh", now)).await.unwrap();

        assert_eq!(store.fetch_recent("u1", 10).await.unwrap().len(), 2);
        assert_eq!(store.prune_expired(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forget_removes_every_turn() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store.append(ConversationTurn::user("u1", "c1", "a")).await.unwrap();
        store.append(ConversationTurn::assistant("u1", "c1", "b")).await.unwrap();

        assert_eq!(store.forget("u1").await.unwrap(), 2);
        assert!(store.fetch_recent("u1", 10).await.unwrap().is_empty());
        assert_eq!(store.forget("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prune_expired_spans_all_users() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let now = Utc::now();

        store
            .append(turn("a", TurnRole::User, "old", now - Duration::days(10)))
            .await
            .unwrap();
        store
            .append(turn("b", TurnRole::User, "old", now - Duration::days(9)))
            .await
            .unwrap();
        store.append(turn("c", TurnRole::User, "new", now)).await.unwrap();

        assert_eq!(store.prune_expired(now).await.unwrap(), 2);
        assert_eq!(store.fetch_recent("c", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = test_store(&dir).await;
            store.append(ConversationTurn::user("u1", "c1", "persisted")).await.unwrap();
        }
        let store = test_store(&dir).await;
        let recent = store.fetch_recent("u1", 10).await.unwrap();
        assert_eq!(recent[0].content, "persisted");
    }

    #[tokio::test]
    async fn in_memory_path_works() {
        let store = SqliteTurnStore::new(":memory:", Duration::days(7)).await.unwrap();
        store.append(ConversationTurn::user("u1", "c1", "x")).await.unwrap();
        assert_eq!(store.fetch_recent("u1", 1).await.unwrap().len(), 1);
    }
}
