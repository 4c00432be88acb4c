//! Embedding provider trait and vector utilities.
//!
//! [`EmbeddingProvider`] is the seam every embedding backend plugs into.
//! The free functions below handle the on-disk vector encoding and scoring.
//!
//! Concrete provider implementations (OpenAI, Ollama, fastembed) live in
//! the `visa-assist` app crate. Tests inject counting fakes.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for embedding providers.
///
/// The store records [`model_name`](EmbeddingProvider::model_name) at build
/// time and the retrieval path refuses to query with a different one.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Width of one stored vector component in bytes.
const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Pack an embedding into the little-endian byte layout of the
/// `documents.embedding` column.
///
/// ```rust
/// use visa_assist_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let packed = vec_to_blob(&[0.5, -1.0]);
/// assert_eq!(packed.len(), 8);
/// assert_eq!(blob_to_vec(&packed), vec![0.5, -1.0]);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Unpack a `documents.embedding` column. Trailing bytes that do not make up
/// a whole component are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(F32_BYTES)
        .filter_map(|chunk| <[u8; F32_BYTES]>::try_from(chunk).ok())
        .map(f32::from_le_bytes)
        .collect()
}

/// Cosine of the angle between `a` and `b`.
///
/// Mismatched lengths, empty input and zero-norm vectors score `0.0`, so
/// such pairs rank below any real match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let norms = (aa * bb).sqrt();
    if norms < f32::EPSILON {
        0.0
    } else {
        dot / norms
    }
}
