//! Build-or-load entry point for the on-disk visa document store.
//!
//! [`build_or_load`] opens the store directory, then either reuses a
//! complete store (zero embedding calls) or runs a full rebuild through
//! `visa_assist_core::index`. [`open_existing`] is the query-side entry used
//! by `visa search` and chat: it never builds.
//!
//! The returned [`DocumentStore`] owns the store and the query embedder, so
//! callers search without re-threading collaborators.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use visa_assist_core::index::{ensure_built, BuildOptions, BuildProgressReporter, BuildReport};
use visa_assist_core::models::{Document, DocumentKey, VisaRule};
use visa_assist_core::retrieval::{self, SearchHit, SearchParams};
use visa_assist_core::store::{StoreManifest, VectorStore};
use visa_assist_core::Error;

use crate::embedding::EmbeddingProvider;
use crate::sqlite_store::SqliteVectorStore;

/// Handle on a complete, queryable visa document store.
pub struct DocumentStore {
    store: SqliteVectorStore,
    provider: Arc<dyn EmbeddingProvider>,
    manifest: StoreManifest,
    reused: bool,
}

impl DocumentStore {
    /// Diversity-aware top-k search.
    pub async fn search(&self, query: &str, params: &SearchParams) -> Result<Vec<SearchHit>> {
        retrieval::search(&self.store, self.provider.as_ref(), query, params).await
    }

    /// Exact `(passport, destination)` lookup; no embedding call.
    pub async fn lookup(&self, passport_iso: &str, destination_iso: &str) -> Result<Option<Document>> {
        let key = DocumentKey {
            passport_iso: passport_iso.to_string(),
            destination_iso: destination_iso.to_string(),
        };
        self.store.get(&key).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.store.document_count().await
    }

    pub async fn keys(&self) -> Result<Vec<DocumentKey>> {
        self.store.keys().await
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    /// True when the last `build_or_load` reused an existing store.
    pub fn reused(&self) -> bool {
        self.reused
    }

    pub fn vector_store(&self) -> &SqliteVectorStore {
        &self.store
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Reuse the store at `store_path`, or build it from `rules`.
///
/// See [`visa_assist_core::index::ensure_built`] for the reuse rules.
pub async fn build_or_load(
    rules: &[VisaRule],
    store_path: &Path,
    force_rebuild: bool,
    provider: Arc<dyn EmbeddingProvider>,
    options: &BuildOptions,
    progress: &dyn BuildProgressReporter,
) -> Result<DocumentStore> {
    let store = SqliteVectorStore::open(store_path).await?;
    let BuildReport {
        reused, manifest, ..
    } = ensure_built(
        &store,
        provider.as_ref(),
        rules,
        options,
        force_rebuild,
        progress,
    )
    .await?;

    Ok(DocumentStore {
        store,
        provider,
        manifest,
        reused,
    })
}

/// Open a store that must already be complete.
pub async fn open_existing(
    store_path: &Path,
    provider: Arc<dyn EmbeddingProvider>,
) -> Result<DocumentStore> {
    let store = SqliteVectorStore::open(store_path).await?;
    let manifest = match store.manifest().await? {
        Some(m) if m.is_complete() => m,
        _ => {
            store.close().await;
            return Err(Error::StoreIncomplete {
                path: store_path.to_path_buf(),
            }
            .into());
        }
    };

    Ok(DocumentStore {
        store,
        provider,
        manifest,
        reused: true,
    })
}
