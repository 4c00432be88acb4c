//! Maximal marginal relevance re-ranking.
//!
//! Greedy selection balancing relevance against redundancy:
//!
//! ```text
//! mmr(d) = λ × sim(query, d) − (1 − λ) × max_{s ∈ selected} sim(d, s)
//! ```
//!
//! | λ | Behavior |
//! |---|----------|
//! | `1.0` | Pure relevance (plain nearest-neighbor order) |
//! | `0.7` | Default: mostly relevance, penalize near-duplicates |
//! | `0.0` | Pure diversity |
//!
//! `sim(query, d)` is taken from [`Candidate::score`], already computed by
//! the store; `sim(d, s)` is cosine similarity between candidate vectors.

use crate::embedding::cosine_similarity;
use crate::store::Candidate;

/// Select up to `k` candidates by MMR.
///
/// Candidates should arrive sorted by descending relevance; ties on the MMR
/// score keep the earlier candidate, so `lambda = 1.0` preserves input order.
pub fn mmr_rerank(candidates: Vec<Candidate>, k: usize, lambda: f64) -> Vec<Candidate> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let mut selected: Vec<Candidate> = Vec::with_capacity(k);
    let mut remaining = candidates;

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f64::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let score = mmr_score(candidate, &selected, lambda);
            if score > best_mmr {
                best_mmr = score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}

fn mmr_score(candidate: &Candidate, selected: &[Candidate], lambda: f64) -> f64 {
    let redundancy = selected
        .iter()
        .map(|s| cosine_similarity(&candidate.embedding, &s.embedding) as f64)
        .fold(None, |acc: Option<f64>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
        .unwrap_or(0.0);

    lambda * candidate.score - (1.0 - lambda) * redundancy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DocumentMetadata};

    fn candidate(dest: &str, query: &[f32], vector: Vec<f32>) -> Candidate {
        Candidate {
            document: Document {
                content: dest.to_string(),
                metadata: DocumentMetadata {
                    passport_iso: "USA".into(),
                    passport_name: "United States".into(),
                    destination_iso: dest.into(),
                    destination_name: dest.into(),
                    requirement: "eta".into(),
                    source: "test".into(),
                },
            },
            score: cosine_similarity(query, &vector) as f64,
            embedding: vector,
        }
    }

    fn dests(c: &[Candidate]) -> Vec<&str> {
        c.iter()
            .map(|c| c.document.metadata.destination_iso.as_str())
            .collect()
    }

    #[test]
    fn empty_and_zero_k() {
        assert!(mmr_rerank(Vec::new(), 5, 0.7).is_empty());
        let q = [1.0, 0.0];
        assert!(mmr_rerank(vec![candidate("IND", &q, vec![1.0, 0.0])], 0, 0.7).is_empty());
    }

    #[test]
    fn k_larger_than_candidates() {
        let q = [1.0, 0.0];
        let out = mmr_rerank(vec![candidate("IND", &q, vec![0.9, 0.1])], 10, 0.7);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn pure_relevance_preserves_order() {
        let q = [1.0, 0.0];
        let out = mmr_rerank(
            vec![
                candidate("IND", &q, vec![0.9, 0.1]),
                candidate("CAN", &q, vec![0.88, 0.12]),
                candidate("MEX", &q, vec![0.5, 0.5]),
            ],
            3,
            1.0,
        );
        assert_eq!(dests(&out), vec!["IND", "CAN", "MEX"]);
    }

    #[test]
    fn low_lambda_skips_near_duplicate() {
        let q = [1.0, 0.0, 0.0];
        let out = mmr_rerank(
            vec![
                candidate("IND", &q, vec![0.99, 0.01, 0.0]),
                candidate("CAN", &q, vec![0.98, 0.02, 0.0]),
                candidate("MEX", &q, vec![0.0, 0.0, 1.0]),
            ],
            2,
            0.3,
        );
        assert_eq!(dests(&out), vec!["IND", "MEX"]);
    }

    #[test]
    fn scores_are_query_similarity_not_mmr() {
        let q = [1.0, 0.0];
        let out = mmr_rerank(vec![candidate("IND", &q, vec![1.0, 0.0])], 1, 0.3);
        assert!((out[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_vectors_still_fill_k() {
        let q = [1.0, 0.0];
        let out = mmr_rerank(
            vec![
                candidate("IND", &q, vec![1.0, 0.0]),
                candidate("CAN", &q, vec![1.0, 0.0]),
                candidate("MEX", &q, vec![1.0, 0.0]),
            ],
            3,
            0.7,
        );
        assert_eq!(out.len(), 3);
    }
}
