//! Embedding backend trait and vector utilities.
//!
//! Concrete providers (Vertex AI, OpenAI) live in the `pdfchat` app crate;
//! this crate only defines the seam the ingestion and chat pipelines call.

use async_trait::async_trait;

use crate::error::RagError;

/// Converts text into a fixed-dimensionality vector.
///
/// One call embeds one text. A backend that answers without any
/// prediction must report [`RagError::BackendSemantic`] rather than an
/// empty vector, so a chunk is never indexed without its embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"multimodalembedding@001"`).
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f64>, RagError>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}
