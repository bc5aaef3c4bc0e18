//! The RAG orchestrator.
//!
//! [`RagService`] sequences the pipeline for both directions:
//!
//! ```text
//! ingest: extract → clean → chunk → create document → embed + store → complete
//! query:  retrieve → generate answer
//! ```
//!
//! Once the document row exists, every failure (cancellation included)
//! marks it `failed` before the error is returned, so no ingestion is left
//! in `processing`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::answer::{
    build_context, confidence, grounded_system_prompt, AnswerGenerator, COMPLETION_FALLBACK,
    SEARCH_UNAVAILABLE,
};
use crate::chunk::{clean_text, Chunker, TextChunk};
use crate::completion::{self, ChatMessage, CompletionBackend, CompletionOptions};
use crate::config::{ChunkingConfig, Config, RetrievalConfig};
use crate::embedding::EmbeddingClient;
use crate::error::{ExtractError, RagError, RagResult, StoreError};
use crate::extract;
use crate::models::{
    ChatOptions, ChatResponse, Chunk, Document, FileId, IngestOptions, IngestResponse,
    NewDocument, QueryOptions, QueryResponse, SearchResult, SourcePreview, Stats, ToolAnswer,
};
use crate::search::{preview, Retriever, SearchParams};
use crate::session::SessionStore;
use crate::store::{DocumentStore, SqliteStore};
use crate::tokenizer::{create_tokenizer, Tokenizer};
use crate::tools::{tool_specs, ToolInvocation, ToolOutput, MORE_INFORMATION_NOTE};

/// Bounds on caller-supplied chunking parameters.
pub const CHUNK_SIZE_RANGE: std::ops::RangeInclusive<usize> = 100..=2000;
pub const CHUNK_OVERLAP_RANGE: std::ops::RangeInclusive<usize> = 0..=200;

const PREVIEW_CHARS: usize = 200;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";

const TOOLS_SYSTEM_PROMPT: &str = "You are an assistant with access to the user's document \
     collection. Use the search_documents tool to look up facts in the documents, \
     list_documents to see what is available and document_stats for collection totals. \
     Answer from tool results and say so when they do not contain the answer.";

/// Race `fut` against `cancel`. Cancellation wins ties.
pub(crate) async fn guard<T, F>(cancel: &CancellationToken, fut: F) -> RagResult<T>
where
    F: Future<Output = RagResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled),
        result = fut => result,
    }
}

/// `doc_<unix millis>_<8 hex chars>`.
pub fn new_document_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("doc_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", document_id, index)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct RagService {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<EmbeddingClient>,
    completion: Arc<dyn CompletionBackend>,
    tokenizer: Arc<dyn Tokenizer>,
    sessions: Arc<SessionStore>,
    retriever: Retriever,
    generator: AnswerGenerator,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    temperature: f32,
    top_p: f32,
}

impl RagService {
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        embedder: EmbeddingClient,
        completion: Arc<dyn CompletionBackend>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let embedder = Arc::new(embedder);
        Self {
            retriever: Retriever::new(store.clone(), embedder.clone()),
            generator: AnswerGenerator::new(
                completion.clone(),
                config.completion.temperature,
                config.completion.top_p,
            ),
            sessions: Arc::new(SessionStore::from_config(&config.sessions)),
            store,
            embedder,
            completion,
            tokenizer,
            chunking: config.chunking.clone(),
            retrieval: config.retrieval.clone(),
            temperature: config.completion.temperature,
            top_p: config.completion.top_p,
        }
    }

    /// Replace the session store, e.g. to share one across services.
    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Build the service from configuration: SQLite store (schema created
    /// if missing) plus the configured embedding and completion backends.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(&config.db.path)
            .await
            .with_context(|| format!("Failed to open database {}", config.db.path.display()))?;
        let embedder = EmbeddingClient::from_config(&config.embedding)?;
        let completion = completion::create_backend(&config.completion)?;
        let tokenizer = create_tokenizer(&config.chunking.tokenizer)?;
        Ok(Self::new(config, Arc::new(store), embedder, completion, tokenizer))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn completion_model(&self) -> &str {
        self.completion.model_name()
    }

    // ============ Ingestion ============

    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
        options: IngestOptions,
    ) -> RagResult<IngestResponse> {
        self.ingest_cancellable(bytes, mime, file_name, options, &CancellationToken::new())
            .await
    }

    /// Read `path` and ingest it, inferring the MIME type from the
    /// extension unless `mime` is given.
    pub async fn ingest_path(
        &self,
        path: &Path,
        mime: Option<&str>,
        options: IngestOptions,
    ) -> anyhow::Result<IngestResponse> {
        let mime = match mime {
            Some(m) => m.to_string(),
            None => extract::mime_for_path(path)
                .with_context(|| {
                    format!(
                        "Cannot infer file type of {}. Supported extensions: {}",
                        path.display(),
                        extract::supported_extensions().join(", ")
                    )
                })?
                .to_string(),
        };
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.ingest(bytes, &mime, &file_name, options).await?)
    }

    /// Chunk size and overlap for one request: caller values within bounds,
    /// otherwise configuration.
    fn chunk_params(&self, options: &IngestOptions) -> RagResult<(usize, usize)> {
        if let Some(size) = options.chunk_size {
            if !CHUNK_SIZE_RANGE.contains(&size) {
                return Err(RagError::InvalidRequest(format!(
                    "chunk size must be between {} and {}, got {}",
                    CHUNK_SIZE_RANGE.start(),
                    CHUNK_SIZE_RANGE.end(),
                    size
                )));
            }
        }
        if let Some(overlap) = options.chunk_overlap {
            if !CHUNK_OVERLAP_RANGE.contains(&overlap) {
                return Err(RagError::InvalidRequest(format!(
                    "chunk overlap must be between {} and {}, got {}",
                    CHUNK_OVERLAP_RANGE.start(),
                    CHUNK_OVERLAP_RANGE.end(),
                    overlap
                )));
            }
        }
        Ok((
            options.chunk_size.unwrap_or(self.chunking.chunk_size),
            options.chunk_overlap.unwrap_or(self.chunking.overlap),
        ))
    }

    pub async fn ingest_cancellable(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        file_name: &str,
        options: IngestOptions,
        cancel: &CancellationToken,
    ) -> RagResult<IngestResponse> {
        let timer = Instant::now();
        let started = Utc::now();
        let (chunk_size, overlap) = self.chunk_params(&options)?;
        let chunker = Chunker::new(self.tokenizer.clone(), chunk_size, overlap)?;

        if !extract::is_supported(mime) {
            return Err(ExtractError::UnsupportedFormat {
                mime: mime.to_string(),
                supported: extract::supported_types().join(", "),
            }
            .into());
        }

        let file_size = bytes.len() as i64;
        let content_hash = format!("{:x}", Sha256::digest(&bytes));

        // (1) extract
        let mime_owned = mime.to_string();
        let raw = guard(cancel, async move {
            tokio::task::spawn_blocking(move || extract::extract_text(&bytes, &mime_owned))
                .await
                .map_err(|e| ExtractError::extraction("document", e))?
                .map_err(RagError::from)
        })
        .await
        .inspect_err(|e| warn!(file_name, step = e.stage(), error = %e, "extraction failed"))?;

        // (2) clean
        let text = clean_text(&raw);
        if text.is_empty() {
            warn!(file_name, "no text content extracted");
            return Err(ExtractError::extraction("document", "no text content found").into());
        }

        // (3) chunk
        let pieces = chunker.chunk(&text);

        // (4) create the document row
        let document_id = new_document_id();
        let title = options.title.clone().or_else(|| {
            Path::new(file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        });
        let new_doc = NewDocument {
            document_id: document_id.clone(),
            file_name: file_name.to_string(),
            file_type: mime.to_string(),
            file_size,
            title,
            author: options.author.clone(),
            page_count: None,
            tags: options.tags.clone(),
            language: options.language.clone(),
            processing_metadata: serde_json::json!({
                "chunkSize": chunk_size,
                "chunkOverlap": overlap,
                "tokenizer": chunker.tokenizer_name(),
                "embeddingModel": self.embedder.model_name(),
                "contentSha256": content_hash,
                "processingStarted": started.to_rfc3339(),
            }),
        };
        let doc = guard(cancel, async { Ok(self.store.create_document(&new_doc).await?) }).await?;
        info!(
            file_id = %doc.id,
            document_id = %doc.document_id,
            file_name,
            chunks = pieces.len(),
            "document created"
        );

        // (5) + (6), compensated
        match self.embed_and_complete(&doc, &pieces, &new_doc, cancel).await {
            Ok(()) => {
                info!(
                    file_id = %doc.id,
                    document_id = %doc.document_id,
                    chunks = pieces.len(),
                    elapsed_ms = timer.elapsed().as_millis() as u64,
                    "document processed"
                );
                Ok(IngestResponse {
                    file_id: doc.id,
                    document_id: doc.document_id,
                    chunks_count: pieces.len(),
                })
            }
            Err(err) => {
                error!(
                    file_id = %doc.id,
                    document_id = %doc.document_id,
                    step = err.stage(),
                    error = %err,
                    "ingestion failed"
                );
                let message = match &err {
                    RagError::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                let mut metadata = new_doc.processing_metadata.clone();
                metadata["error"] = message.into();
                metadata["failedStep"] = err.stage().into();
                metadata["processingFailed"] = Utc::now().to_rfc3339().into();
                if let Err(e) = self.store.fail_document(doc.id, &metadata).await {
                    error!(file_id = %doc.id, error = %e, "could not mark document failed");
                }
                Err(err)
            }
        }
    }

    async fn embed_and_complete(
        &self,
        doc: &Document,
        pieces: &[TextChunk],
        new_doc: &NewDocument,
        cancel: &CancellationToken,
    ) -> RagResult<()> {
        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let vectors = guard(cancel, async {
            Ok(self
                .embedder
                .embed_batched(&texts, self.embedder.batch_size())
                .await?)
        })
        .await?;
        let dims = self.embedder.dimension().await?;

        let model = self.embedder.model_name().to_string();
        let chunk_count = pieces.len() as i64;
        let chunks: Vec<Chunk> = pieces
            .iter()
            .zip(vectors)
            .map(|(piece, embedding)| Chunk {
                id: chunk_id(&doc.document_id, piece.index),
                file_id: doc.id,
                content: piece.text.clone(),
                embedding,
                embedding_model: model.clone(),
                chunk_index: piece.index as i64,
                chunk_count,
                token_count: piece.token_count() as i64,
                start_index: piece.start as i64,
                end_index: piece.end as i64,
                page_number: None,
                section: None,
                metadata: serde_json::json!({
                    "documentId": doc.document_id,
                    "tokenCount": piece.token_count(),
                    "pageNumber": null,
                    "section": null,
                }),
            })
            .collect();

        guard(cancel, async { Ok(self.store.save_chunks(doc.id, &chunks).await?) }).await?;

        let mut metadata = new_doc.processing_metadata.clone();
        metadata["embeddingDims"] = dims.into();
        metadata["processingCompleted"] = Utc::now().to_rfc3339().into();
        guard(cancel, async {
            Ok(self
                .store
                .complete_document(doc.id, chunks.len(), &metadata)
                .await?)
        })
        .await
    }

    // ============ Retrieval and answers ============

    fn search_params(&self, options: &QueryOptions) -> RagResult<SearchParams> {
        SearchParams::resolve(options, self.retrieval.top_k, self.retrieval.threshold)
    }

    /// Retrieval only: ranked chunks for `query`.
    pub async fn search(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> RagResult<Vec<SearchResult>> {
        let params = self.search_params(options)?;
        self.retriever
            .search(query, &params, &CancellationToken::new())
            .await
    }

    pub async fn query(&self, question: &str, options: QueryOptions) -> RagResult<QueryResponse> {
        self.query_cancellable(question, options, &CancellationToken::new())
            .await
    }

    /// Retrieve then answer. Embedding failures degrade to a fixed answer;
    /// storage failures and cancellation are returned as errors.
    pub async fn query_cancellable(
        &self,
        question: &str,
        options: QueryOptions,
        cancel: &CancellationToken,
    ) -> RagResult<QueryResponse> {
        let timer = Instant::now();
        let params = self.search_params(&options)?;

        let results = match self.retriever.search(question, &params, cancel).await {
            Ok(results) => results,
            Err(RagError::Embedding(e)) => {
                warn!(error = %e, "query embedding failed");
                return Ok(QueryResponse {
                    answer: SEARCH_UNAVAILABLE.to_string(),
                    sources: Vec::new(),
                    confidence: 0.0,
                    processing_time_ms: timer.elapsed().as_millis() as u64,
                });
            }
            Err(e) => return Err(e),
        };

        let generated = guard(cancel, async {
            Ok(self.generator.generate(question, &results).await)
        })
        .await?;

        let elapsed_ms = timer.elapsed().as_millis() as u64;
        info!(
            results = results.len(),
            confidence = generated.confidence,
            elapsed_ms,
            "query answered"
        );
        Ok(QueryResponse {
            answer: generated.answer,
            sources: results,
            confidence: generated.confidence,
            processing_time_ms: elapsed_ms,
        })
    }

    // ============ Documents ============

    pub async fn list_documents(&self) -> RagResult<Vec<Document>> {
        Ok(self.store.list_documents().await?)
    }

    pub async fn get_document(&self, file_id: FileId) -> RagResult<Document> {
        self.store
            .get_document(file_id)
            .await?
            .ok_or(RagError::NotFound(file_id))
    }

    pub async fn get_chunks(&self, file_id: FileId) -> RagResult<Vec<Chunk>> {
        self.get_document(file_id).await?;
        Ok(self.store.get_chunks_by_file_id(file_id).await?)
    }

    pub async fn delete_document(&self, file_id: FileId) -> RagResult<()> {
        match self.store.delete_document(file_id).await {
            Ok(()) => {
                info!(file_id = %file_id, "document deleted");
                Ok(())
            }
            Err(StoreError::NotFound(id)) => Err(RagError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn stats(&self) -> RagResult<Stats> {
        let counts = self.store.counts().await?;
        let avg_chunks_per_file = if counts.total_documents > 0 {
            round2(counts.total_chunks as f64 / counts.total_documents as f64)
        } else {
            0.0
        };
        Ok(Stats {
            total_documents: counts.total_documents,
            total_chunks: counts.total_chunks,
            status_counts: counts.status_counts,
            avg_chunks_per_file,
            supported_file_types: extract::supported_types(),
        })
    }

    // ============ Chat ============

    /// Conversational answer, grounded in retrieved chunks when any match.
    /// Failures produce a fixed apology rather than an error.
    pub async fn chat(&self, message: &str, options: ChatOptions) -> RagResult<ChatResponse> {
        if message.trim().is_empty() {
            return Err(RagError::InvalidRequest("message must not be empty".into()));
        }
        let timer = Instant::now();
        let model = self.completion.model_name().to_string();
        self.sessions.purge_expired();

        let response = match self.chat_inner(message, &options).await {
            Ok((answer, used_rag, sources, confidence)) => {
                if let Some(session) = &options.session_id {
                    self.sessions.record(session, message, &answer);
                }
                ChatResponse {
                    answer,
                    used_rag,
                    sources,
                    confidence,
                    processing_time_ms: timer.elapsed().as_millis() as u64,
                    model,
                }
            }
            Err(e) => {
                warn!(step = e.stage(), error = %e, "chat failed");
                ChatResponse {
                    answer: COMPLETION_FALLBACK.to_string(),
                    used_rag: false,
                    sources: Vec::new(),
                    confidence: None,
                    processing_time_ms: timer.elapsed().as_millis() as u64,
                    model,
                }
            }
        };
        Ok(response)
    }

    async fn chat_inner(
        &self,
        message: &str,
        options: &ChatOptions,
    ) -> RagResult<(String, bool, Vec<SourcePreview>, Option<f64>)> {
        let history = options
            .session_id
            .as_deref()
            .map(|id| self.sessions.history(id))
            .unwrap_or_default();

        let results = if options.use_rag {
            let params = self.search_params(&QueryOptions {
                top_k: options.top_k,
                threshold: options.threshold,
                file_id: None,
            })?;
            self.retriever
                .search(message, &params, &CancellationToken::new())
                .await?
        } else {
            Vec::new()
        };

        let system = if results.is_empty() {
            ChatMessage::system(CHAT_SYSTEM_PROMPT)
        } else {
            ChatMessage::system(grounded_system_prompt(&build_context(&results)))
        };
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history);
        messages.push(ChatMessage::user(message));

        let completion_options = CompletionOptions {
            temperature: options.temperature.unwrap_or(self.temperature),
            top_p: self.top_p,
            tools: Vec::new(),
        };
        let reply = self
            .completion
            .complete(&messages, &completion_options)
            .await?;

        if results.is_empty() {
            return Ok((reply.content, false, Vec::new(), None));
        }
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let sources = results
            .iter()
            .map(|r| SourcePreview {
                document_id: r.document.document_id.clone(),
                file_name: r.document.file_name.clone(),
                score: r.score,
                preview: preview(&r.chunk.content, PREVIEW_CHARS),
            })
            .collect();
        Ok((reply.content, true, sources, Some(confidence(&scores))))
    }

    // ============ Tools ============

    /// Let the model call document tools before answering.
    ///
    /// One completion with tools offered; if the model requests tools they
    /// are run and a second completion without tools produces the answer.
    pub async fn ask_with_tools(&self, message: &str) -> RagResult<ToolAnswer> {
        if message.trim().is_empty() {
            return Err(RagError::InvalidRequest("message must not be empty".into()));
        }
        let timer = Instant::now();
        let fallback = |tools_called: Vec<String>| ToolAnswer {
            answer: COMPLETION_FALLBACK.to_string(),
            tools_called,
            processing_time_ms: timer.elapsed().as_millis() as u64,
        };

        let mut messages = vec![
            ChatMessage::system(TOOLS_SYSTEM_PROMPT),
            ChatMessage::user(message),
        ];
        let with_tools = CompletionOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            tools: tool_specs(),
        };

        let reply = match self.completion.complete(&messages, &with_tools).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "tool-assisted completion failed");
                return Ok(fallback(Vec::new()));
            }
        };
        if reply.tool_calls.is_empty() {
            return Ok(ToolAnswer {
                answer: reply.content,
                tools_called: Vec::new(),
                processing_time_ms: timer.elapsed().as_millis() as u64,
            });
        }

        let calls = reply.tool_calls.clone();
        messages.push(ChatMessage {
            tool_calls: reply.tool_calls,
            ..ChatMessage::assistant(reply.content)
        });

        let mut tools_called = Vec::with_capacity(calls.len());
        for call in calls {
            tools_called.push(call.name.clone());
            let output = match ToolInvocation::parse(&call) {
                Ok(invocation) => self.run_tool(invocation).await,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "rejected tool call");
                    ToolOutput::error(e)
                }
            };
            messages.push(ChatMessage::tool_result(call.id.clone(), output.content));
            if let Some(note) = output.system_note {
                messages.push(ChatMessage::system(note));
            }
        }

        let without_tools = CompletionOptions {
            tools: Vec::new(),
            ..with_tools
        };
        match self.completion.complete(&messages, &without_tools).await {
            Ok(final_reply) => Ok(ToolAnswer {
                answer: final_reply.content,
                tools_called,
                processing_time_ms: timer.elapsed().as_millis() as u64,
            }),
            Err(e) => {
                warn!(error = %e, "final tool-assisted completion failed");
                Ok(fallback(tools_called))
            }
        }
    }

    async fn run_tool(&self, invocation: ToolInvocation) -> ToolOutput {
        info!(tool = invocation.kind().name(), "running tool");
        match invocation {
            ToolInvocation::SearchDocuments(args) => {
                if args.question.trim().is_empty() {
                    return ToolOutput {
                        content: "No question was provided.".to_string(),
                        system_note: Some(MORE_INFORMATION_NOTE.to_string()),
                    };
                }
                let options = QueryOptions {
                    top_k: args.top_k,
                    ..Default::default()
                };
                match self.search(&args.question, &options).await {
                    Ok(results) if results.is_empty() => {
                        ToolOutput::text("No matching passages were found in the documents.")
                    }
                    Ok(results) => ToolOutput::text(
                        results
                            .iter()
                            .enumerate()
                            .map(|(i, r)| {
                                format!(
                                    "[{}] {} (score {:.2}): {}",
                                    i + 1,
                                    r.document.file_name,
                                    r.score,
                                    r.chunk.content
                                )
                            })
                            .collect::<Vec<_>>()
                            .join("\n\n"),
                    ),
                    Err(e) => ToolOutput::error(e),
                }
            }
            ToolInvocation::ListDocuments => match self.list_documents().await {
                Ok(docs) if docs.is_empty() => ToolOutput::text("No documents have been uploaded."),
                Ok(docs) => ToolOutput::text(
                    docs.iter()
                        .map(|d| {
                            format!(
                                "- {} ({}, {}, {} chunks)",
                                d.file_name, d.document_id, d.status, d.chunk_count
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                Err(e) => ToolOutput::error(e),
            },
            ToolInvocation::DocumentStats => match self.stats().await {
                Ok(stats) => {
                    let by_status = stats
                        .status_counts
                        .iter()
                        .map(|(status, n)| format!("{}: {}", status, n))
                        .collect::<Vec<_>>()
                        .join(", ");
                    ToolOutput::text(format!(
                        "{} documents, {} chunks ({} per document on average). By status: {}.",
                        stats.total_documents,
                        stats.total_chunks,
                        stats.avg_chunks_per_file,
                        by_status
                    ))
                }
                Err(e) => ToolOutput::error(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_format() {
        let id = new_document_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "doc");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_document_id(), id);
    }

    #[test]
    fn chunk_ids_extend_document_ids() {
        assert_eq!(chunk_id("doc_1_abcdef01", 2), "doc_1_abcdef01_chunk_2");
    }

    #[tokio::test]
    async fn guard_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guard(&cancel, async { Ok(1) }).await;
        assert!(matches!(result, Err(RagError::Cancelled)));

        let live = CancellationToken::new();
        assert_eq!(guard(&live, async { Ok(2) }).await.unwrap(), 2);
    }
}
