use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub path: PathBuf,
    /// Path relative to the scan root with `/` separators; used as the
    /// chunk source reference.
    pub source_ref: String,
    pub size_bytes: u64,
}

/// Walk `root` and return the files matching the configured globs, sorted
/// by source reference.
pub fn scan_documents(root: &Path, config: &IngestConfig) -> Result<Vec<DocumentFile>> {
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(DocumentFile {
            path: path.to_path_buf(),
            source_ref: rel_str,
            size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.source_ref.cmp(&b.source_ref));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
