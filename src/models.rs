//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline, plus the response shapes
//! returned by [`RagService`](crate::rag::RagService).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage identifier of a [`Document`] row. Assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(FileId)
    }
}

/// Lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 3] = [
        DocumentStatus::Processing,
        DocumentStatus::Completed,
        DocumentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Everything needed to create a document row. Provenance fields are set
/// once here and never change afterwards.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: Option<i64>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub processing_metadata: serde_json::Value,
}

/// One uploaded file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: FileId,
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: Option<i64>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub chunk_count: i64,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_metadata: serde_json::Value,
}

/// A token-bounded slice of a document's text with its embedding.
///
/// `start_index`/`end_index` are token offsets into the document's token
/// stream, not character offsets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub file_id: FileId,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub chunk_index: i64,
    pub chunk_count: i64,
    pub token_count: i64,
    pub start_index: i64,
    pub end_index: i64,
    pub page_number: Option<i64>,
    pub section: Option<String>,
    pub metadata: serde_json::Value,
}

impl Chunk {
    pub fn dims(&self) -> usize {
        self.embedding.len()
    }
}

/// Attribution for a retrieved chunk: the owning document's provenance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub file_id: FileId,
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub title: Option<String>,
}

impl From<&Document> for SourceDocument {
    fn from(doc: &Document) -> Self {
        SourceDocument {
            file_id: doc.id,
            document_id: doc.document_id.clone(),
            file_name: doc.file_name.clone(),
            file_type: doc.file_type.clone(),
            file_size: doc.file_size,
            title: doc.title.clone(),
        }
    }
}

/// A chunk scored against a query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f64,
    pub document: SourceDocument,
}

/// Per-request ingestion options. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub title: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub file_id: FileId,
    pub document_id: String,
    pub chunks_count: usize,
}

/// Per-request retrieval options. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub file_id: Option<FileId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub confidence: f64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub status_counts: BTreeMap<String, i64>,
    pub avg_chunks_per_file: f64,
    pub supported_file_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub use_rag: bool,
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub temperature: Option<f32>,
    pub session_id: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            use_rag: true,
            top_k: None,
            threshold: None,
            temperature: None,
            session_id: None,
        }
    }
}

/// Short attribution shown alongside chat answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePreview {
    pub document_id: String,
    pub file_name: String,
    pub score: f64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    pub used_rag: bool,
    pub sources: Vec<SourcePreview>,
    pub confidence: Option<f64>,
    pub processing_time_ms: u64,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnswer {
    pub answer: String,
    pub tools_called: Vec<String>,
    pub processing_time_ms: u64,
}
