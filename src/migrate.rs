//! Schema creation for the two SQLite databases.
//!
//! All statements are idempotent (`IF NOT EXISTS`) and run on every open.
//!
//! # Vector store (`<store.path>/vectors.sqlite`)
//!
//! | Table | Key | Purpose |
//! |-------|-----|---------|
//! | `documents` | `(passport_iso, destination_iso)` | content, metadata JSON, embedding BLOB |
//! | `store_manifest` | `id = 1` (single row) | model, dims, source, dataset hash, completion marker |
//!
//! # Conversation log (`conversation.path`)
//!
//! | Table | Key | Purpose |
//! |-------|-----|---------|
//! | `messages` | `(thread_id, seq)` | append-only message log |

use anyhow::Result;
use sqlx::SqlitePool;

/// Create the vector-store tables.
pub async fn migrate_vector_store(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            passport_iso TEXT NOT NULL,
            destination_iso TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (passport_iso, destination_iso)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS store_manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            embedding_model TEXT NOT NULL,
            embedding_dims INTEGER NOT NULL,
            source TEXT NOT NULL,
            dataset_hash TEXT,
            completed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the conversation-log table.
pub async fn migrate_conversations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            thread_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            name TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(thread_id, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
