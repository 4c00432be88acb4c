//! SQLite-backed [`ConversationLog`].
//!
//! Messages live in the `messages` table keyed by `(thread_id, seq)`, where
//! `seq` is a per-thread counter assigned by the inserting statement.
//! History reads order by `seq`, so insertion order survives restarts.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use visa_assist_core::models::{Message, Role};
use visa_assist_core::session::ConversationLog;

use crate::db;
use crate::migrate;

/// SQLite implementation of the [`ConversationLog`] trait.
pub struct SqliteConversationLog {
    pool: SqlitePool,
}

impl SqliteConversationLog {
    /// Open (creating if needed) the log database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::migrate_conversations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ConversationLog for SqliteConversationLog {
    async fn append(&self, thread_id: &str, message: &Message) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        // One statement so the write lock is taken up front; a read-then-write
        // transaction cannot upgrade in WAL mode once another writer commits.
        sqlx::query(
            r#"
            INSERT INTO messages (thread_id, seq, role, content, name, created_at)
            SELECT ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?
            FROM messages
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.name)
        .bind(now)
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append message to thread {}", thread_id))?;

        Ok(())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content, name FROM messages WHERE thread_id = ? ORDER BY seq ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(Message {
                    role: Role::parse(&role)
                        .with_context(|| format!("Unknown message role in log: {}", role))?,
                    content: row.get("content"),
                    name: row.get("name"),
                })
            })
            .collect()
    }

    async fn threads(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT thread_id
            FROM messages
            GROUP BY thread_id
            ORDER BY MAX(created_at) DESC, MAX(rowid) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
