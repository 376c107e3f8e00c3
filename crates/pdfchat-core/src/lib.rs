//! # pdfchat core
//!
//! Runtime-agnostic logic for pdfchat: data models, the overlapping
//! chunker, prompt templates, the conversation state machine, the
//! per-chunk ingestion step, and the backend traits the application
//! crate implements over HTTP and SQLite.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.

pub mod chunk;
pub mod completion;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod store;

pub use error::{RagError, Stage};
