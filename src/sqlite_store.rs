//! SQLite-backed [`VectorStore`] implementation.
//!
//! A store is a directory containing `vectors.sqlite` (see
//! [`crate::migrate`] for the schema). Embeddings are little-endian `f32`
//! BLOBs; nearest-neighbor search is brute-force cosine similarity.
//!
//! # Vector cache
//!
//! The first query loads every document and vector into a shared,
//! read-locked cache so later queries never touch SQLite. Any write through
//! this handle drops the cache; the next query reloads it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use visa_assist_core::embedding::{blob_to_vec, vec_to_blob};
use visa_assist_core::models::{Document, DocumentKey, DocumentMetadata, EmbeddedDocument};
use visa_assist_core::store::{nearest_among, Candidate, StoreManifest, VectorStore};

use crate::db;
use crate::migrate;

/// File name of the database inside a store directory.
pub const VECTORS_FILE: &str = "vectors.sqlite";

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dir: PathBuf,
    cache: RwLock<Option<Arc<Vec<EmbeddedDocument>>>>,
}

impl SqliteVectorStore {
    /// Open (creating if needed) the store in directory `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        let pool = db::connect(&dir.join(VECTORS_FILE)).await?;
        migrate::migrate_vector_store(&pool).await?;
        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
            cache: RwLock::new(None),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = None;
        }
    }

    async fn cached_documents(&self) -> Result<Arc<Vec<EmbeddedDocument>>> {
        let cached = self
            .cache
            .read()
            .map_err(|_| anyhow!("vector cache lock poisoned"))?
            .clone();
        if let Some(docs) = cached {
            return Ok(docs);
        }

        let rows = sqlx::query("SELECT content, metadata_json, embedding FROM documents")
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| "Corrupt document metadata in vector store")?;
            let blob: Vec<u8> = row.get("embedding");
            docs.push(EmbeddedDocument {
                document: Document {
                    content: row.get("content"),
                    metadata,
                },
                embedding: blob_to_vec(&blob),
            });
        }

        let docs = Arc::new(docs);
        tracing::debug!(documents = docs.len(), "loaded vector cache");
        *self
            .cache
            .write()
            .map_err(|_| anyhow!("vector cache lock poisoned"))? = Some(Arc::clone(&docs));
        Ok(docs)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn location(&self) -> PathBuf {
        self.dir.clone()
    }

    async fn manifest(&self) -> Result<Option<StoreManifest>> {
        let row = sqlx::query(
            r#"
            SELECT embedding_model, embedding_dims, source, dataset_hash, completed_at
            FROM store_manifest
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoreManifest {
            embedding_model: r.get("embedding_model"),
            embedding_dims: r.get::<i64, _>("embedding_dims") as usize,
            source: r.get("source"),
            dataset_hash: r.get("dataset_hash"),
            completed_at: r.get("completed_at"),
        }))
    }

    async fn begin_rebuild(&self, embedding_model: &str, dims: usize, source: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE store_manifest SET completed_at = NULL WHERE id = 1")
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO store_manifest (id, embedding_model, embedding_dims, source,
                                        dataset_hash, completed_at)
            VALUES (1, ?, ?, ?, NULL, NULL)
            ON CONFLICT(id) DO UPDATE SET
                embedding_model = excluded.embedding_model,
                embedding_dims = excluded.embedding_dims,
                source = excluded.source,
                dataset_hash = NULL,
                completed_at = NULL
            "#,
        )
        .bind(embedding_model)
        .bind(dims as i64)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.invalidate();
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[EmbeddedDocument]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            let meta = &doc.document.metadata;
            let metadata_json = serde_json::to_string(meta)?;
            sqlx::query(
                r#"
                INSERT INTO documents (passport_iso, destination_iso, content,
                                       metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(passport_iso, destination_iso) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&meta.passport_iso)
            .bind(&meta.destination_iso)
            .bind(&doc.document.content)
            .bind(&metadata_json)
            .bind(vec_to_blob(&doc.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.invalidate();
        Ok(())
    }

    async fn mark_complete(&self, dataset_hash: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE store_manifest SET dataset_hash = ?, completed_at = ? WHERE id = 1",
        )
        .bind(dataset_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            anyhow::bail!("mark_complete called before begin_rebuild");
        }
        Ok(())
    }

    async fn document_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn keys(&self) -> Result<Vec<DocumentKey>> {
        let rows = sqlx::query(
            "SELECT passport_iso, destination_iso FROM documents ORDER BY passport_iso, destination_iso",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| DocumentKey {
                passport_iso: r.get("passport_iso"),
                destination_iso: r.get("destination_iso"),
            })
            .collect())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT content, metadata_json FROM documents WHERE passport_iso = ? AND destination_iso = ?",
        )
        .bind(&key.passport_iso)
        .bind(&key.destination_iso)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for document {}", key))?;
            Ok(Document {
                content: row.get("content"),
                metadata,
            })
        })
        .transpose()
    }

    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let docs = self.cached_documents().await?;
        Ok(nearest_among(docs.iter(), query_vec, limit))
    }
}
