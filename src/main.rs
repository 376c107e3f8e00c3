//! # pdfchat CLI
//!
//! The `pdfchat` binary ingests PDF documents into a vector index and
//! answers questions about them in multi-turn chat sessions.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat init` | Create the SQLite chat history database |
//! | `pdfchat ingest` | Chunk, embed and index the documents under the ingest root |
//! | `pdfchat ask <chat_id> "<message>"` | Run one chat turn and print the reply |
//! | `pdfchat history [chat_id]` | List chats, or print one chat's messages |
//! | `pdfchat serve` | Start the chat HTTP server |
//!
//! Log verbosity follows `RUST_LOG` (default `pdfchat=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdfchat::{chat, config, ingest, migrate, server};

/// pdfchat: retrieval-augmented chat over PDF documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Retrieval-augmented chat over PDF documents",
    version,
    long_about = "pdfchat splits PDF documents into overlapping chunks, embeds them into a \
    vector index, and answers questions in multi-turn chat sessions grounded in the \
    most similar chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the chat history database.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Ingest documents into the vector index.
    Ingest {
        /// Directory to scan instead of `[ingest] root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Show document and chunk counts without calling any backend.
        #[arg(long)]
        dry_run: bool,
    },

    /// Send one message to a chat and print the reply.
    Ask {
        chat_id: i64,

        message: String,

        /// Answer language (defaults to `[prompts] default_language`).
        #[arg(long)]
        language: Option<String>,
    },

    /// List chat ids, or print the messages of one chat.
    History { chat_id: Option<i64> },

    /// Start the chat HTTP server on `[server] bind`.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pdfchat=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { root, dry_run } => {
            ingest::run_ingest(&cfg, root, dry_run).await?;
        }
        Commands::Ask {
            chat_id,
            message,
            language,
        } => {
            chat::run_ask(&cfg, chat_id, &message, language).await?;
        }
        Commands::History { chat_id } => {
            chat::run_history(&cfg, chat_id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
