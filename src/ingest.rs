//! Ingestion runner.
//!
//! Scans the ingest root, then for every selected file runs
//! extract → chunk → (embed → index) per chunk. Documents are processed
//! concurrently up to `ingest.max_concurrent_documents`; chunks within a
//! document stay strictly sequential. A failed document is reported and
//! the run continues with the others.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use pdfchat_core::chunk::Chunker;
use pdfchat_core::embedding::Embedder;
use pdfchat_core::error::RagError;
use pdfchat_core::ingest::index_chunks;
use pdfchat_core::store::Indexer;

use crate::config::Config;
use crate::elastic::ElasticIndex;
use crate::embedding::create_embedder;
use crate::extract;
use crate::scan::{scan_documents, DocumentFile};

/// Per-document result of an ingestion run.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub source_ref: String,
    pub result: Result<usize, RagError>,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub outcomes: Vec<DocumentOutcome>,
}

impl IngestSummary {
    pub fn documents_ok(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn documents_failed(&self) -> usize {
        self.outcomes.len() - self.documents_ok()
    }

    pub fn records_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }
}

pub async fn run_ingest(config: &Config, root: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let root = root
        .or_else(|| config.ingest.root.clone())
        .ok_or_else(|| anyhow::anyhow!("No ingest root: set [ingest] root or pass --root"))?;
    let chunker = Chunker::new(config.chunking.window_chars, config.chunking.stride_chars)?;
    let files = scan_documents(&root, &config.ingest)?;
    tracing::info!(
        root = %root.display(),
        documents = files.len(),
        window = chunker.window(),
        stride = chunker.stride(),
        "scanned ingest root"
    );

    if dry_run {
        println!("ingest {} (dry-run)", root.display());
        println!("  documents found: {}", files.len());
        let mut total_chunks = 0usize;
        for file in &files {
            match extract::read_document(file.path.clone(), file.source_ref.clone()).await {
                Ok(text) => {
                    let chunks = chunker.expected_chunks(text.chars().count());
                    total_chunks += chunks;
                    println!("  {} ({} chunks)", file.source_ref, chunks);
                }
                Err(e) => println!("  {} (unreadable: {})", file.source_ref, e),
            }
        }
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let index: Arc<dyn Indexer> = Arc::new(ElasticIndex::new(&config.index)?);

    let summary = ingest_documents(
        files,
        chunker,
        embedder,
        index,
        config.ingest.max_concurrent_documents,
    )
    .await?;

    println!("ingest {}", root.display());
    for outcome in &summary.outcomes {
        if let Err(e) = &outcome.result {
            println!("  failed: {}: {}", outcome.source_ref, e);
        }
    }
    println!("  documents ok: {}", summary.documents_ok());
    println!("  documents failed: {}", summary.documents_failed());
    println!("  records written: {}", summary.records_written());
    if summary.documents_failed() > 0 {
        anyhow::bail!(
            "{} of {} documents failed",
            summary.documents_failed(),
            summary.outcomes.len()
        );
    }
    println!("ok");

    Ok(())
}

/// Ingest `files` with at most `max_concurrent` documents in flight.
///
/// Outcomes are returned sorted by source reference.
pub async fn ingest_documents(
    files: Vec<DocumentFile>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    indexer: Arc<dyn Indexer>,
    max_concurrent: usize,
) -> Result<IngestSummary> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for file in files {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("ingest semaphore closed")?;
        let embedder = embedder.clone();
        let indexer = indexer.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let source_ref = file.source_ref.clone();
            let result = ingest_document(file, chunker, embedder.as_ref(), indexer.as_ref()).await;
            match &result {
                Ok(written) => {
                    tracing::info!(source = %source_ref, records = written, "document indexed")
                }
                Err(e) => {
                    tracing::warn!(source = %source_ref, stage = %e.stage(), error = %e, "document failed")
                }
            }
            DocumentOutcome { source_ref, result }
        });
    }

    let mut summary = IngestSummary::default();
    while let Some(joined) = tasks.join_next().await {
        summary
            .outcomes
            .push(joined.context("ingestion task panicked")?);
    }
    summary
        .outcomes
        .sort_by(|a, b| a.source_ref.cmp(&b.source_ref));

    Ok(summary)
}

async fn ingest_document(
    file: DocumentFile,
    chunker: Chunker,
    embedder: &dyn Embedder,
    indexer: &dyn Indexer,
) -> Result<usize, RagError> {
    let text = extract::read_document(file.path, file.source_ref.clone()).await?;
    let chunks = chunker.chunk_text(&file.source_ref, &text);
    tracing::debug!(source = %file.source_ref, chunks = chunks.len(), "chunked document");
    index_chunks(embedder, indexer, chunks, Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pdfchat_core::error::Stage;
    use pdfchat_core::store::memory::InMemoryIndex;
    use tempfile::TempDir;

    struct CharCountEmbedder;

    #[async_trait]
    impl Embedder for CharCountEmbedder {
        fn model_name(&self) -> &str {
            "chars"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f64>, RagError> {
            Ok(vec![text.chars().count() as f64])
        }
    }

    struct RefusingEmbedder;

    #[async_trait]
    impl Embedder for RefusingEmbedder {
        fn model_name(&self) -> &str {
            "refuse"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f64>, RagError> {
            if text.contains("poison") {
                return Err(RagError::semantic(Stage::Embed, "no predictions"));
            }
            Ok(vec![1.0])
        }
    }

    fn write_docs(tmp: &TempDir, docs: &[(&str, &str)]) -> Vec<DocumentFile> {
        docs.iter()
            .map(|(name, body)| {
                let path = tmp.path().join(name);
                std::fs::write(&path, body).unwrap();
                DocumentFile {
                    path,
                    source_ref: name.to_string(),
                    size_bytes: body.len() as u64,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ingests_all_documents() {
        let tmp = TempDir::new().unwrap();
        let files = write_docs(&tmp, &[("a.txt", "ABCDEFGHIJ"), ("b.txt", "abc")]);
        let index = Arc::new(InMemoryIndex::new());

        let summary = ingest_documents(
            files,
            Chunker::new(4, 2).unwrap(),
            Arc::new(CharCountEmbedder),
            index.clone(),
            2,
        )
        .await
        .unwrap();

        assert_eq!(summary.documents_ok(), 2);
        assert_eq!(summary.records_written(), 5);
        assert_eq!(index.len(), 5);
        assert_eq!(summary.outcomes[0].source_ref, "a.txt");
    }

    #[tokio::test]
    async fn test_failed_document_does_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let mut files = write_docs(&tmp, &[("bad.txt", "poison"), ("good.txt", "fine text")]);
        files.push(DocumentFile {
            path: tmp.path().join("missing.txt"),
            source_ref: "missing.txt".to_string(),
            size_bytes: 0,
        });
        let index = Arc::new(InMemoryIndex::new());

        let summary = ingest_documents(
            files,
            Chunker::default(),
            Arc::new(RefusingEmbedder),
            index.clone(),
            1,
        )
        .await
        .unwrap();

        assert_eq!(summary.documents_ok(), 1);
        assert_eq!(summary.documents_failed(), 2);
        assert_eq!(index.len(), 1);
        let bad = &summary.outcomes[0];
        assert_eq!(bad.source_ref, "bad.txt");
        assert_eq!(bad.result.as_ref().unwrap_err().stage(), Stage::Embed);
        assert!(summary.outcomes[1].result.is_ok());
        let missing = &summary.outcomes[2];
        assert_eq!(missing.result.as_ref().unwrap_err().stage(), Stage::Extract);
    }
}
