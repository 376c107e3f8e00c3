//! Text extraction for ingested documents.
//!
//! PDFs go through `pdf-extract` on a blocking thread; every other
//! selected file is read as UTF-8 text. A file that cannot be read or
//! decoded fails its document with [`RagError::Extract`]; the ingestion
//! run carries on with the next one.

use std::path::{Path, PathBuf};

use pdfchat_core::error::RagError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Content type inferred from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => MIME_PDF,
        _ => MIME_TEXT,
    }
}

/// Turn raw file bytes into text.
pub fn extract_text(source_ref: &str, bytes: &[u8], content_type: &str) -> Result<String, RagError> {
    match content_type {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::extract(source_ref, format!("PDF extraction failed: {}", e))),
        _ => String::from_utf8(bytes.to_vec())
            .map_err(|e| RagError::extract(source_ref, format!("invalid UTF-8: {}", e))),
    }
}

/// Read and extract one file without blocking the async runtime.
pub async fn read_document(path: PathBuf, source_ref: String) -> Result<String, RagError> {
    let task_ref = source_ref.clone();
    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path)
            .map_err(|e| RagError::extract(task_ref.as_str(), e.to_string()))?;
        extract_text(&task_ref, &bytes, content_type_for(&path))
    })
    .await
    .map_err(|e| RagError::extract(source_ref, format!("extraction task failed: {}", e)))?
}
