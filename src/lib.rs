//! # docqa
//!
//! Document ingestion and retrieval-augmented question answering.
//!
//! Uploaded files are converted to text, split into overlapping token
//! windows, embedded and stored in SQLite. Questions are answered by
//! ranking stored chunks against the question's embedding and handing the
//! best matches to a chat model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ Extract  │──▶│ Clean+Chunk  │──▶│  Embed   │──▶│  SQLite  │
//! │ pdf/docx │   │ token window │   │ batched  │   │ doc+chunk│
//! └──────────┘   └──────────────┘   └──────────┘   └────┬─────┘
//!                                                       │
//!                 ┌──────────┐   ┌──────────┐           │
//!   question ────▶│ Retrieve │◀──│  cosine  │◀──────────┘
//!                 └────┬─────┘   └──────────┘
//!                      ▼
//!                 ┌──────────┐
//!                 │  Answer  │──▶ answer + sources + confidence
//!                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init
//! docqa ingest handbook.pdf
//! docqa ask "how many vacation days do employees get?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Error types per pipeline stage |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Documents, chunks, results |
//! | [`tokenizer`] | BPE and whitespace tokenizers |
//! | [`chunk`] | Text cleaning and sliding-window chunking |
//! | [`extract`] | Text extraction per file type |
//! | [`embedding`] | Embedding backends and batching client |
//! | [`completion`] | Chat-completion backends |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`search`] | Similarity retrieval |
//! | [`answer`] | Answer generation and confidence |
//! | [`rag`] | Ingestion and query orchestration |
//! | [`tools`] | Tools offered to the chat model |
//! | [`session`] | Chat session history |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod answer;
pub mod ask;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod search;
pub mod session;
pub mod stats;
pub mod store;
pub mod tokenizer;
pub mod tools;

pub use error::{RagError, RagResult};
pub use rag::RagService;
