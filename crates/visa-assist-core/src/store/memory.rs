//! In-memory [`VectorStore`] implementation for tests and ephemeral use.
//!
//! Documents live in a `BTreeMap` keyed by [`DocumentKey`] behind
//! `std::sync::RwLock`. Vector search is brute-force cosine similarity over
//! all stored vectors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, DocumentKey, EmbeddedDocument};

use super::{nearest_among, Candidate, StoreManifest, VectorStore};

/// In-memory vector store.
pub struct InMemoryVectorStore {
    manifest: RwLock<Option<StoreManifest>>,
    docs: RwLock<BTreeMap<DocumentKey, EmbeddedDocument>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            manifest: RwLock::new(None),
            docs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn location(&self) -> PathBuf {
        PathBuf::from(":memory:")
    }

    async fn manifest(&self) -> Result<Option<StoreManifest>> {
        Ok(self.manifest.read().map_err(poisoned)?.clone())
    }

    async fn begin_rebuild(&self, embedding_model: &str, dims: usize, source: &str) -> Result<()> {
        let mut manifest = self.manifest.write().map_err(poisoned)?;
        if let Some(m) = manifest.as_mut() {
            m.completed_at = None;
        }
        self.docs.write().map_err(poisoned)?.clear();
        *manifest = Some(StoreManifest {
            embedding_model: embedding_model.to_string(),
            embedding_dims: dims,
            source: source.to_string(),
            dataset_hash: None,
            completed_at: None,
        });
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[EmbeddedDocument]) -> Result<()> {
        let mut stored = self.docs.write().map_err(poisoned)?;
        for doc in docs {
            stored.insert(doc.document.metadata.key(), doc.clone());
        }
        Ok(())
    }

    async fn mark_complete(&self, dataset_hash: &str) -> Result<()> {
        let mut manifest = self.manifest.write().map_err(poisoned)?;
        let m = manifest
            .as_mut()
            .ok_or_else(|| anyhow!("mark_complete called before begin_rebuild"))?;
        m.dataset_hash = Some(dataset_hash.to_string());
        m.completed_at = Some(chrono::Utc::now().timestamp());
        Ok(())
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.docs.read().map_err(poisoned)?.len())
    }

    async fn keys(&self) -> Result<Vec<DocumentKey>> {
        Ok(self.docs.read().map_err(poisoned)?.keys().cloned().collect())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Document>> {
        let stored = self.docs.read().map_err(poisoned)?;
        Ok(stored.get(key).map(|d| d.document.clone()))
    }

    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let stored = self.docs.read().map_err(poisoned)?;
        Ok(nearest_among(stored.values(), query_vec, limit))
    }
}
