//! Diversity-aware top-k retrieval over a [`VectorStore`].
//!
//! # Pipeline
//!
//! ```text
//! validate params → check manifest (complete, same model)
//!   → embed query → nearest(max(fetch_k, k)) → MMR(k, λ) → SearchHit[]
//! ```
//!
//! There is no relevance threshold: a non-empty store always yields
//! `min(k, store_size)` hits, an empty one yields none.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::Error;
use crate::mmr::mmr_rerank;
use crate::models::DocumentMetadata;
use crate::store::{StoreManifest, VectorStore};

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_FETCH_K: usize = 20;
pub const DEFAULT_DIVERSITY_LAMBDA: f64 = 0.7;

/// Retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Results returned.
    pub k: usize,
    /// Nearest-neighbor candidates considered by the re-ranker.
    pub fetch_k: usize,
    /// MMR trade-off: `1.0` pure relevance, `0.0` pure diversity.
    pub diversity_lambda: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fetch_k: DEFAULT_FETCH_K,
            diversity_lambda: DEFAULT_DIVERSITY_LAMBDA,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), Error> {
        if self.k < 1 {
            return Err(Error::InvalidParameter {
                name: "k",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.diversity_lambda) {
            return Err(Error::InvalidParameter {
                name: "diversity_lambda",
                reason: format!("must be within [0, 1], got {}", self.diversity_lambda),
            });
        }
        Ok(())
    }

    /// Candidates fetched before re-ranking; never fewer than `k`.
    pub fn effective_fetch_k(&self) -> usize {
        self.fetch_k.max(self.k)
    }
}

/// A single retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Cosine similarity between the query and this document.
    pub score: f64,
}

/// Check that `store` can be queried with `provider`.
pub async fn ensure_queryable(
    store: &dyn VectorStore,
    provider: &dyn EmbeddingProvider,
) -> Result<StoreManifest> {
    let manifest = match store.manifest().await? {
        Some(m) if m.is_complete() => m,
        _ => {
            return Err(Error::StoreIncomplete {
                path: store.location(),
            }
            .into())
        }
    };

    if manifest.embedding_model != provider.model_name() {
        return Err(Error::EmbeddingModelMismatch {
            store_model: manifest.embedding_model,
            query_model: provider.model_name().to_string(),
        }
        .into());
    }

    Ok(manifest)
}

/// Retrieve up to `params.k` diverse documents relevant to `query`.
pub async fn search(
    store: &dyn VectorStore,
    provider: &dyn EmbeddingProvider,
    query: &str,
    params: &SearchParams,
) -> Result<Vec<SearchHit>> {
    params.validate()?;
    ensure_queryable(store, provider).await?;

    let query_vec = embed_query(provider, query).await?;
    let candidates = store
        .nearest(&query_vec, params.effective_fetch_k())
        .await?;
    let fetched = candidates.len();
    let selected = mmr_rerank(candidates, params.k, params.diversity_lambda);

    tracing::debug!(
        fetched,
        returned = selected.len(),
        k = params.k,
        lambda = params.diversity_lambda,
        "retrieval"
    );

    Ok(selected
        .into_iter()
        .map(|c| SearchHit {
            content: c.document.content,
            metadata: c.document.metadata,
            score: c.score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_index, BuildOptions, NoProgress};
    use crate::models::{Requirement, VisaRule};
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;

    /// Deterministic bag-of-letters embedder.
    struct LetterEmbedder {
        model: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for b in t.to_ascii_lowercase().bytes() {
                        if b.is_ascii_lowercase() {
                            v[(b - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn rule(p: &str, pn: &str, d: &str, dn: &str, req: Requirement) -> VisaRule {
        VisaRule {
            passport_code: p.into(),
            passport_name: pn.into(),
            destination_code: d.into(),
            destination_name: dn.into(),
            requirement_raw: "x".into(),
            requirement_text: req.render(),
        }
    }

    async fn built(rules: &[VisaRule]) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        let options = BuildOptions {
            source: "test".into(),
            batch_size: 4,
        };
        build_index(&store, &LetterEmbedder { model: "letters" }, rules, &options, &NoProgress)
            .await
            .unwrap();
        store
    }

    fn sample() -> Vec<VisaRule> {
        vec![
            rule("USA", "United States", "IND", "India", Requirement::VisaRequired),
            rule("USA", "United States", "CAN", "Canada", Requirement::VisaFree),
            rule("USA", "United States", "JPN", "Japan", Requirement::VisaFreeDays(90)),
            rule("DEU", "Germany", "BRA", "Brazil", Requirement::VisaFreeDays(90)),
            rule("IND", "India", "THA", "Thailand", Requirement::VisaOnArrival),
            rule("GBR", "United Kingdom", "AUS", "Australia", Requirement::Eta),
        ]
    }

    #[tokio::test]
    async fn hit_count_is_min_of_k_and_store_size() {
        let store = built(&sample()).await;
        let embedder = LetterEmbedder { model: "letters" };

        for k in [1, 3, 6, 10] {
            let params = SearchParams {
                k,
                ..SearchParams::default()
            };
            let hits = search(&store, &embedder, "visa for India", &params).await.unwrap();
            assert_eq!(hits.len(), k.min(6), "k = {k}");
        }
    }

    #[tokio::test]
    async fn every_hit_is_a_stored_document() {
        let store = built(&sample()).await;
        let keys = store.keys().await.unwrap();
        let hits = search(
            &store,
            &LetterEmbedder { model: "letters" },
            "Japan",
            &SearchParams::default(),
        )
        .await
        .unwrap();
        assert!(hits.iter().all(|h| keys.contains(&h.metadata.key())));
    }

    #[tokio::test]
    async fn single_document_store_always_returns_it() {
        let store = built(&sample()[..1]).await;
        for query in ["USA to India", "zzz", "baggage allowance"] {
            let hits = search(
                &store,
                &LetterEmbedder { model: "letters" },
                query,
                &SearchParams::default(),
            )
            .await
            .unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].metadata.destination_iso, "IND");
        }
    }

    #[tokio::test]
    async fn empty_store_yields_no_hits() {
        let store = built(&[]).await;
        let hits = search(
            &store,
            &LetterEmbedder { model: "letters" },
            "anything",
            &SearchParams::default(),
        )
        .await
        .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn model_mismatch_is_refused() {
        let store = built(&sample()).await;
        let err = search(
            &store,
            &LetterEmbedder { model: "other" },
            "India",
            &SearchParams::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::EmbeddingModelMismatch {
                store_model: "letters".into(),
                query_model: "other".into()
            })
        );
    }

    #[tokio::test]
    async fn unbuilt_store_is_incomplete() {
        let store = InMemoryVectorStore::new();
        let err = search(
            &store,
            &LetterEmbedder { model: "letters" },
            "India",
            &SearchParams::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::StoreIncomplete { .. })
        ));
    }

    #[test]
    fn params_are_validated() {
        let bad_k = SearchParams {
            k: 0,
            ..SearchParams::default()
        };
        assert!(matches!(
            bad_k.validate(),
            Err(Error::InvalidParameter { name: "k", .. })
        ));

        for lambda in [-0.1, 1.5, f64::NAN] {
            let p = SearchParams {
                diversity_lambda: lambda,
                ..SearchParams::default()
            };
            assert!(p.validate().is_err(), "lambda = {lambda}");
        }

        let p = SearchParams {
            k: 8,
            fetch_k: 3,
            diversity_lambda: 0.0,
        };
        assert!(p.validate().is_ok());
        assert_eq!(p.effective_fetch_k(), 8);
    }
}
