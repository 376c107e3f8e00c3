//! Per-document indexing step: embed each chunk, then upsert it.
//!
//! Chunks of one document are processed strictly in order. The first
//! failure aborts the rest of the document; records already written stay
//! in the index.

use chrono::{DateTime, Utc};

use crate::embedding::Embedder;
use crate::error::RagError;
use crate::models::{Chunk, IndexRecord};
use crate::store::Indexer;

/// Embed and index `chunks` in order, returning the number written.
pub async fn index_chunks(
    embedder: &dyn Embedder,
    indexer: &dyn Indexer,
    chunks: Vec<Chunk>,
    now: DateTime<Utc>,
) -> Result<usize, RagError> {
    let mut written = 0;
    for chunk in chunks {
        let vector = embedder.embed(&chunk.content).await?;
        tracing::debug!(
            source = %chunk.source_ref,
            sequence = chunk.sequence,
            dims = vector.len(),
            "embedded chunk"
        );
        let record = IndexRecord::new(chunk, vector, now);
        indexer.upsert(&record).await?;
        written += 1;
    }
    Ok(written)
}
