//! Index builder: normalized rules → embedded documents in a [`VectorStore`].
//!
//! # Build sequence
//!
//! ```text
//! begin_rebuild (marker removed, documents cleared, model recorded)
//!   → for each batch of `batch_size` rules:
//!        render → embed → validate count/dims → upsert
//!   → mark_complete (dataset hash + completion timestamp)
//! ```
//!
//! The completion marker is the last write. A build that stops early for any
//! reason (embedding failure, crash, Ctrl-C) leaves a store without it, which
//! [`ensure_built`] refuses to reuse.
//!
//! [`ensure_built`] is the reuse-or-build entry point: a complete store is
//! returned untouched with zero embedding calls unless a rebuild is forced.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::embedding::EmbeddingProvider;
use crate::error::Error;
use crate::models::{Document, EmbeddedDocument, VisaRule};
use crate::store::{StoreManifest, VectorStore};

// ═══════════════════════════════════════════════════════════════════════
// Progress
// ═══════════════════════════════════════════════════════════════════════

/// A single progress event emitted during a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    Started { total: usize, batches: usize },
    Batch {
        batch: usize,
        batches: usize,
        rows_done: usize,
        total: usize,
    },
    Finished { documents: usize },
}

/// Receives build progress. Implementations decide where it goes.
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Reporter that discards all events.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Build
// ═══════════════════════════════════════════════════════════════════════

/// Parameters of a build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Dataset version tag written to each document's metadata.
    pub source: String,
    /// Rules embedded per provider call.
    pub batch_size: usize,
}

/// What [`ensure_built`] did.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// True when an existing complete store was reused.
    pub reused: bool,
    pub documents: usize,
    pub manifest: StoreManifest,
}

/// SHA-256 over the rendered content of `docs`, in order.
pub fn dataset_fingerprint(docs: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in docs {
        hasher.update(doc.content.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Rebuild the store from `rules`, writing the completion marker last.
///
/// Returns the number of documents the store holds afterwards, which is
/// below `rules.len()` when rules share a `(passport, destination)` key.
pub async fn build_index(
    store: &dyn VectorStore,
    provider: &dyn EmbeddingProvider,
    rules: &[VisaRule],
    options: &BuildOptions,
    progress: &dyn BuildProgressReporter,
) -> Result<usize> {
    if options.batch_size == 0 {
        return Err(Error::InvalidParameter {
            name: "batch_size",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }

    let docs: Vec<Document> = rules.iter().map(|r| r.to_document(&options.source)).collect();
    let total = docs.len();
    let batches = total.div_ceil(options.batch_size);

    tracing::info!(
        documents = total,
        batches,
        model = provider.model_name(),
        "building vector store"
    );

    store
        .begin_rebuild(provider.model_name(), provider.dims(), &options.source)
        .await?;
    progress.report(BuildProgressEvent::Started { total, batches });

    for (i, batch) in docs.chunks(options.batch_size).enumerate() {
        let first_row = i * options.batch_size;
        let last_row = first_row + batch.len() - 1;
        let batch_failed = |reason: String| Error::EmbeddingBatchFailed {
            first_row,
            last_row,
            reason,
        };

        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let vectors = provider
            .embed(&texts)
            .await
            .map_err(|e| batch_failed(format!("{:#}", e)))?;

        if vectors.len() != batch.len() {
            return Err(batch_failed(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            ))
            .into());
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != provider.dims()) {
            return Err(batch_failed(format!(
                "provider returned a {}-dimensional vector, expected {}",
                v.len(),
                provider.dims()
            ))
            .into());
        }

        let embedded: Vec<EmbeddedDocument> = batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(document, embedding)| EmbeddedDocument {
                document,
                embedding,
            })
            .collect();
        store.upsert_documents(&embedded).await?;

        tracing::debug!(batch = i + 1, batches, first_row, last_row, "embedded batch");
        progress.report(BuildProgressEvent::Batch {
            batch: i + 1,
            batches,
            rows_done: last_row + 1,
            total,
        });
    }

    store.mark_complete(&dataset_fingerprint(&docs)).await?;
    let documents = store.document_count().await?;
    progress.report(BuildProgressEvent::Finished { documents });
    tracing::info!(documents, "vector store complete");

    Ok(documents)
}

/// Reuse a complete store, or build it.
///
/// | Store state | `force = false` | `force = true` |
/// |-------------|-----------------|----------------|
/// | never built | build | build |
/// | complete | reuse, no embedding calls | rebuild |
/// | no completion marker | [`Error::StoreIncomplete`] | rebuild |
pub async fn ensure_built(
    store: &dyn VectorStore,
    provider: &dyn EmbeddingProvider,
    rules: &[VisaRule],
    options: &BuildOptions,
    force: bool,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    if !force {
        if let Some(manifest) = store.manifest().await? {
            if !manifest.is_complete() {
                return Err(Error::StoreIncomplete {
                    path: store.location(),
                }
                .into());
            }

            if manifest.embedding_model != provider.model_name() {
                tracing::warn!(
                    store_model = %manifest.embedding_model,
                    query_model = provider.model_name(),
                    "reusing store built with a different embedding model; queries will fail"
                );
            }
            let docs: Vec<Document> = rules.iter().map(|r| r.to_document(&options.source)).collect();
            if manifest.dataset_hash.as_deref() != Some(dataset_fingerprint(&docs).as_str()) {
                tracing::warn!("dataset changed since the store was built; pass --force to rebuild");
            }

            let documents = store.document_count().await?;
            tracing::info!(documents, "reusing existing vector store");
            return Ok(BuildReport {
                reused: true,
                documents,
                manifest,
            });
        }
    }

    let documents = build_index(store, provider, rules, options, progress).await?;
    let manifest = store
        .manifest()
        .await?
        .ok_or_else(|| anyhow::anyhow!("store manifest missing after build"))?;
    Ok(BuildReport {
        reused: false,
        documents,
        manifest,
    })
}
