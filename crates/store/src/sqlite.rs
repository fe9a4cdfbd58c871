//! SQLite store.
//!
//! Uses a single SQLite database file with three tables:
//! - `threads`: one row per conversation, including the cached summary
//! - `messages`: append-only, ordered by an autoincrement sequence
//! - `usage_records`: the immutable usage ledger read by the guard
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`),
//! so lexicographic comparison matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use finmentor_core::error::StoreError;
use finmentor_core::message::{Message, Metadata, Role, Thread, ThreadSummary};
use finmentor_core::store::Store;
use finmentor_core::usage::{UsageFlags, UsageKind, UsageRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("invalid timestamp '{raw}': {e}")))
}

impl SqliteStore {
    /// Open (or create) a store.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to ":memory:" is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id                   TEXT PRIMARY KEY,
                owner_id             TEXT NOT NULL,
                title                TEXT NOT NULL,
                category             TEXT,
                summary_text         TEXT,
                summary_covered      INTEGER,
                summary_generated_at TEXT,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                thread_id  TEXT NOT NULL REFERENCES threads(id),
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_records (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                thread_id  TEXT,
                tokens     INTEGER NOT NULL,
                kind       TEXT NOT NULL,
                cache_hit  INTEGER NOT NULL DEFAULT 0,
                degraded   INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("usage_records table: {e}")))?;

        for (name, ddl) in [
            ("threads owner index", "CREATE INDEX IF NOT EXISTS idx_threads_owner ON threads(owner_id, updated_at DESC)"),
            ("messages thread index", "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, seq)"),
            ("usage user index", "CREATE INDEX IF NOT EXISTS idx_usage_user ON usage_records(user_id, created_at)"),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> Result<Thread, StoreError> {
        let get_str = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };
        let get_opt = |col: &str| -> Result<Option<String>, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let summary_text = get_opt("summary_text")?;
        let summary_covered: Option<i64> = row
            .try_get("summary_covered")
            .map_err(|e| StoreError::QueryFailed(format!("summary_covered column: {e}")))?;
        let summary_generated_at = get_opt("summary_generated_at")?;

        let summary = match (summary_text, summary_covered) {
            (Some(text), Some(covered)) => Some(ThreadSummary {
                text,
                covered_messages: covered.max(0) as usize,
                generated_at: parse_ts(summary_generated_at.as_deref().ok_or_else(|| {
                    StoreError::QueryFailed("summary_generated_at column is null".into())
                })?)?,
            }),
            _ => None,
        };

        Ok(Thread {
            id: get_str("id")?,
            owner_id: get_str("owner_id")?,
            title: get_str("title")?,
            category: get_opt("category")?,
            summary,
            created_at: parse_ts(&get_str("created_at")?)?,
            updated_at: parse_ts(&get_str("updated_at")?)?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let get_str = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let role_raw = get_str("role")?;
        let role = Role::parse(&role_raw)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role_raw}'")))?;
        let metadata: Metadata = serde_json::from_str(&get_str("metadata")?)
            .map_err(|e| StoreError::QueryFailed(format!("metadata column: {e}")))?;

        Ok(Message {
            id: get_str("id")?,
            thread_id: get_str("thread_id")?,
            role,
            content: get_str("content")?,
            metadata,
            created_at: parse_ts(&get_str("created_at")?)?,
        })
    }

    /// Every usage record of a user, oldest first.
    pub async fn usage_for(&self, user_id: &str) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM usage_records WHERE user_id = ?1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("usage lookup: {e}")))?;

        rows.iter()
            .map(|row| -> Result<UsageRecord, StoreError> {
                let tokens: i64 = row
                    .try_get("tokens")
                    .map_err(|e| StoreError::QueryFailed(format!("tokens column: {e}")))?;
                let kind: String = row
                    .try_get("kind")
                    .map_err(|e| StoreError::QueryFailed(format!("kind column: {e}")))?;
                let created_at: String = row
                    .try_get("created_at")
                    .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
                let flag = |col: &str| -> Result<bool, StoreError> {
                    row.try_get::<i64, _>(col)
                        .map(|v| v != 0)
                        .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
                };
                Ok(UsageRecord {
                    id: row.try_get("id").map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
                    user_id: row
                        .try_get("user_id")
                        .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?,
                    thread_id: row
                        .try_get("thread_id")
                        .map_err(|e| StoreError::QueryFailed(format!("thread_id column: {e}")))?,
                    tokens: tokens.max(0) as u64,
                    flags: UsageFlags {
                        kind: UsageKind::parse(&kind),
                        cache_hit: flag("cache_hit")?,
                        degraded: flag("degraded")?,
                    },
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_thread(
        &self,
        owner_id: &str,
        title: &str,
        category: Option<&str>,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(owner_id, title, category.map(str::to_string));

        sqlx::query(
            r#"
            INSERT INTO threads (id, owner_id, title, category, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&thread.id)
        .bind(&thread.owner_id)
        .bind(&thread.title)
        .bind(&thread.category)
        .bind(ts(&thread.created_at))
        .bind(ts(&thread.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT thread failed: {e}")))?;

        debug!(thread_id = %thread.id, "Created thread");
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET thread failed: {e}")))?;

        row.as_ref().map(Self::row_to_thread).transpose()
    }

    async fn list_threads(&self, owner_id: &str) -> Result<Vec<Thread>, StoreError> {
        let rows = sqlx::query("SELECT * FROM threads WHERE owner_id = ?1 ORDER BY updated_at DESC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST threads failed: {e}")))?;

        rows.iter().map(Self::row_to_thread).collect()
    }

    async fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE threads SET title = ?1 WHERE id = ?2")
            .bind(title)
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("RENAME thread failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }

    async fn save_summary(&self, thread_id: &str, summary: ThreadSummary) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE threads
            SET summary_text = ?1, summary_covered = ?2, summary_generated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(&summary.text)
        .bind(summary.covered_messages as i64)
        .bind(ts(&summary.generated_at))
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SAVE summary failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Message, StoreError> {
        let message = Message::new(thread_id, role, content).with_metadata(metadata.unwrap_or_default());
        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let bumped = sqlx::query("UPDATE threads SET updated_at = ?1 WHERE id = ?2")
            .bind(ts(&message.created_at))
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("BUMP thread failed: {e}")))?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (id, thread_id, role, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&message.id)
        .bind(thread_id)
        .bind(role.as_str())
        .bind(&message.content)
        .bind(&metadata_json)
        .bind(ts(&message.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(message)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE thread_id = ?1 ORDER BY seq ASC")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST messages failed: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn count_usage(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_records WHERE user_id = ?1 AND created_at >= ?2",
        )
        .bind(user_id)
        .bind(ts(&since))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("COUNT usage failed: {e}")))?;

        Ok(count.max(0) as u64)
    }

    async fn sum_tokens(&self, user_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(tokens), 0) FROM usage_records WHERE user_id = ?1 AND created_at >= ?2",
        )
        .bind(user_id)
        .bind(ts(&since))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SUM tokens failed: {e}")))?;

        Ok(sum.max(0) as u64)
    }

    async fn write_usage(&self, record: UsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (id, user_id, thread_id, tokens, kind, cache_hit, degraded, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.thread_id)
        .bind(record.tokens as i64)
        .bind(record.flags.kind.as_str())
        .bind(record.flags.cache_hit as i64)
        .bind(record.flags.degraded as i64)
        .bind(ts(&record.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT usage failed: {e}")))?;

        Ok(())
    }
}
