//! Typed failures for the retrieval-augmented chat pipeline.
//!
//! Every variant records the [`Stage`] that failed so callers can log the
//! failure and return a structured response without string matching.
//! Nothing in the pipeline retries automatically.

use serde::Serialize;
use thiserror::Error;

use crate::prompt::TemplateError;

/// Pipeline stage at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Embed,
    Index,
    Search,
    Render,
    Complete,
    History,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Search => "search",
            Stage::Render => "render",
            Stage::Complete => "complete",
            Stage::History => "history",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Network or HTTP-level failure talking to a backend.
    #[error("{stage} transport failure: {message}")]
    Transport { stage: Stage, message: String },

    /// The backend answered, but with a payload the pipeline cannot use
    /// (no predictions, no choices, malformed hits).
    #[error("{stage} backend returned an unusable response: {message}")]
    BackendSemantic { stage: Stage, message: String },

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// History or index write failure.
    #[error("{stage} persistence failure: {message}")]
    Persistence { stage: Stage, message: String },

    #[error("cannot read document {source_ref}: {message}")]
    Extract { source_ref: String, message: String },
}

impl RagError {
    pub fn transport(stage: Stage, message: impl Into<String>) -> Self {
        RagError::Transport {
            stage,
            message: message.into(),
        }
    }

    pub fn semantic(stage: Stage, message: impl Into<String>) -> Self {
        RagError::BackendSemantic {
            stage,
            message: message.into(),
        }
    }

    pub fn persistence(stage: Stage, message: impl Into<String>) -> Self {
        RagError::Persistence {
            stage,
            message: message.into(),
        }
    }

    pub fn extract(source_ref: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::Extract {
            source_ref: source_ref.into(),
            message: message.into(),
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Transport { stage, .. }
            | RagError::BackendSemantic { stage, .. }
            | RagError::Persistence { stage, .. } => *stage,
            RagError::Template(_) => Stage::Render,
            RagError::Extract { .. } => Stage::Extract,
        }
    }

    /// True for failures caused by a remote backend rather than local state.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            RagError::Transport { .. } | RagError::BackendSemantic { .. }
        )
    }
}
