//! Vector-store abstraction for Visa Assist.
//!
//! The [`VectorStore`] trait is the narrow "upsert and query" interface the
//! index builder and retrieval path need, so the concrete engine (embedded
//! SQLite file, in-memory map, networked service) is replaceable.
//!
//! Besides documents, a store keeps a [`StoreManifest`]: the embedding model
//! used to build it and a completion marker that is written last. A store
//! whose manifest lacks the marker is incomplete and must not be queried.
//!
//! Implementations must be `Send + Sync`; reads take `&self` and must not
//! require exclusive locking.

pub mod memory;

use std::cmp::Ordering;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::models::{Document, DocumentKey, EmbeddedDocument};

/// Store-level record written by the index builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreManifest {
    /// Identifier of the embedding model the documents were embedded with.
    pub embedding_model: String,
    pub embedding_dims: usize,
    /// Dataset version tag.
    pub source: String,
    /// SHA-256 over the rendered documents, set together with the marker.
    pub dataset_hash: Option<String>,
    /// Unix timestamp of build completion; `None` while building.
    pub completed_at: Option<i64>,
}

impl StoreManifest {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A nearest-neighbor candidate, carrying its vector for re-ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub embedding: Vec<f32>,
    /// Cosine similarity to the query.
    pub score: f64,
}

/// Abstract vector index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`manifest`](VectorStore::manifest) | Read the store-level record |
/// | [`begin_rebuild`](VectorStore::begin_rebuild) | Drop marker and documents, record model |
/// | [`upsert_documents`](VectorStore::upsert_documents) | Insert or replace embedded documents |
/// | [`mark_complete`](VectorStore::mark_complete) | Write the completion marker |
/// | [`document_count`](VectorStore::document_count) | Number of stored documents |
/// | [`keys`](VectorStore::keys) | All document identities |
/// | [`get`](VectorStore::get) | Exact lookup by `(passport, destination)` |
/// | [`nearest`](VectorStore::nearest) | Cosine nearest-neighbor candidates |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Where the store lives, for error messages.
    fn location(&self) -> PathBuf;

    /// The store manifest, or `None` if the store was never built.
    async fn manifest(&self) -> Result<Option<StoreManifest>>;

    /// Start a full rebuild: remove the completion marker first, then all
    /// documents, then record the embedding model and dataset source.
    async fn begin_rebuild(&self, embedding_model: &str, dims: usize, source: &str)
        -> Result<()>;

    /// Insert or replace documents keyed by `(passport_iso, destination_iso)`.
    async fn upsert_documents(&self, docs: &[EmbeddedDocument]) -> Result<()>;

    /// Write the completion marker. Must be the last write of a build.
    async fn mark_complete(&self, dataset_hash: &str) -> Result<()>;

    async fn document_count(&self) -> Result<usize>;

    /// All document keys, sorted.
    async fn keys(&self) -> Result<Vec<DocumentKey>>;

    /// The document stored under `key`, if any.
    async fn get(&self, key: &DocumentKey) -> Result<Option<Document>>;

    /// Up to `limit` documents by descending cosine similarity to `query_vec`.
    async fn nearest(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>>;
}

fn rank(a: &(&EmbeddedDocument, f64), b: &(&EmbeddedDocument, f64)) -> Ordering {
    fn key(d: &EmbeddedDocument) -> (&str, &str) {
        let m = &d.document.metadata;
        (m.passport_iso.as_str(), m.destination_iso.as_str())
    }
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| key(a.0).cmp(&key(b.0)))
}

/// Brute-force cosine search over borrowed documents.
///
/// Scores every document, selects the best `limit` by descending score
/// (ties broken by key), and clones only those into [`Candidate`]s.
pub fn nearest_among<'a>(
    docs: impl IntoIterator<Item = &'a EmbeddedDocument>,
    query_vec: &[f32],
    limit: usize,
) -> Vec<Candidate> {
    if limit == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(&EmbeddedDocument, f64)> = docs
        .into_iter()
        .map(|d| (d, cosine_similarity(query_vec, &d.embedding) as f64))
        .collect();
    if scored.len() > limit {
        scored.select_nth_unstable_by(limit - 1, rank);
        scored.truncate(limit);
    }
    scored.sort_by(rank);

    scored
        .into_iter()
        .map(|(d, score)| Candidate {
            document: d.document.clone(),
            embedding: d.embedding.clone(),
            score,
        })
        .collect()
}
