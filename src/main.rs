//! # docqa CLI
//!
//! The `docqa` binary ingests documents and answers questions about them.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and schema |
//! | `docqa ingest <files>` | Extract, chunk, embed and store documents |
//! | `docqa ask "<question>"` | Answer a question from the documents |
//! | `docqa search "<query>"` | Show the ranked chunks for a query |
//! | `docqa chat "<message>"` | Chat, grounded in the documents when they match |
//! | `docqa documents` | List documents |
//! | `docqa get <id>` | Show a document and optionally its chunks |
//! | `docqa delete <id>` | Delete a document and its chunks |
//! | `docqa stats` | Collection totals |
//! | `docqa types` | Supported file types |
//!
//! ## Examples
//!
//! ```bash
//! docqa init
//! docqa ingest handbook.pdf policies.docx --tags hr
//! docqa ask "how many vacation days do employees get?" --threshold 0.5
//! docqa chat "summarise the travel policy" --tools
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docqa::models::{ChatOptions, FileId, IngestOptions, QueryOptions};
use docqa::{ask, config, get, ingest, logging, migrate, search, stats};

/// docqa: document ingestion and retrieval-augmented question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa: ingest documents and answer questions about them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest one or more files.
    ///
    /// Each file is extracted, split into overlapping token windows,
    /// embedded and stored. The MIME type is inferred from the extension
    /// unless `--mime` is given.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// MIME type override (applies to every file).
        #[arg(long)]
        mime: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Comma-separated tags.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        #[arg(long)]
        language: Option<String>,

        /// Tokens per chunk (100-2000). Defaults to `[chunking] chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Tokens shared by neighbouring chunks (0-200).
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Answer a question from the ingested documents.
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity (0-1) for a chunk to be used.
        #[arg(long)]
        threshold: Option<f64>,

        /// Restrict retrieval to one document.
        #[arg(long)]
        file_id: Option<FileId>,
    },

    /// Show the chunks most similar to a query, without an answer.
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        file_id: Option<FileId>,
    },

    /// Chat with the model, using the documents as context when relevant.
    Chat {
        message: String,

        /// Do not search the documents.
        #[arg(long)]
        no_rag: bool,

        /// Session id for conversation history.
        #[arg(long)]
        session: Option<String>,

        /// Let the model call document tools (search, list, stats).
        #[arg(long)]
        tools: bool,

        #[arg(long)]
        temperature: Option<f32>,
    },

    /// List documents, newest first.
    Documents,

    /// Show one document.
    Get {
        id: FileId,

        /// Also print every chunk.
        #[arg(long)]
        chunks: bool,
    },

    /// Delete a document and all its chunks.
    Delete { id: FileId },

    /// Print collection statistics.
    Stats,

    /// List supported file types.
    Types,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // No config needed
    if let Commands::Types = cli.command {
        stats::run_types();
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            mime,
            title,
            author,
            tags,
            language,
            chunk_size,
            chunk_overlap,
        } => {
            let options = IngestOptions {
                title,
                author,
                tags,
                language,
                chunk_size,
                chunk_overlap,
            };
            ingest::run_ingest(&cfg, &paths, mime.as_deref(), options).await?;
        }
        Commands::Ask {
            question,
            top_k,
            threshold,
            file_id,
        } => {
            let options = QueryOptions {
                top_k,
                threshold,
                file_id,
            };
            ask::run_ask(&cfg, &question, options).await?;
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            file_id,
        } => {
            let options = QueryOptions {
                top_k,
                threshold,
                file_id,
            };
            search::run_search(&cfg, &query, options).await?;
        }
        Commands::Chat {
            message,
            no_rag,
            session,
            tools,
            temperature,
        } => {
            let options = ChatOptions {
                use_rag: !no_rag,
                temperature,
                session_id: session,
                ..Default::default()
            };
            ask::run_chat(&cfg, &message, options, tools).await?;
        }
        Commands::Documents => {
            get::run_documents(&cfg).await?;
        }
        Commands::Get { id, chunks } => {
            get::run_get(&cfg, id, chunks).await?;
        }
        Commands::Delete { id } => {
            get::run_delete(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Types => stats::run_types(),
    }

    Ok(())
}
