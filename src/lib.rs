//! # pdfchat
//!
//! Retrieval-augmented chat over PDF documents.
//!
//! Documents are split into overlapping character windows, embedded, and
//! stored in an Elasticsearch-compatible vector index. The first message
//! of a chat is answered from the nearest chunks; follow-ups replay the
//! conversation without searching again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  PDFs    │──▶│ Chunk+Embed  │──▶│ Vector index │
//! │ (ingest) │   │              │   │  (knn)       │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ first turn only
//!                 ┌────────────┐    ┌──────▼───────┐   ┌──────────┐
//!  CLI / HTTP ───▶│ Chat svc   │───▶│ Prompt+Thread│──▶│   LLM    │
//!                 └─────┬──────┘    └──────────────┘   └──────────┘
//!                       ▼
//!                 SQLite history
//! ```
//!
//! Pure logic (chunking, templates, the conversation state machine and the
//! backend traits) lives in the `pdfchat-core` crate; this crate supplies
//! the HTTP clients, SQLite store and the outer surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Vertex AI / OpenAI embedding clients |
//! | [`elastic`] | Vector index writes and knn search |
//! | [`completion`] | Chat completion client |
//! | [`history`] | SQLite chat history |
//! | [`extract`] | PDF and text extraction |
//! | [`scan`] | Document discovery |
//! | [`ingest`] | Ingestion runner |
//! | [`chat`] | Chat service |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod elastic;
pub mod embedding;
pub mod extract;
pub mod history;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod scan;
pub mod server;
