//! Error taxonomy for the ingestion and question-answering pipeline.
//!
//! Each collaborator has its own error enum so callers can match on the
//! failing stage. [`RagError`] is the boundary type returned by
//! [`RagService`](crate::rag::RagService); the CLI wraps it in `anyhow`.

use thiserror::Error;

use crate::models::FileId;

/// Raw-bytes-to-text extraction failures.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No extractor handles the MIME type. Not retried.
    #[error("unsupported file type: {mime}. Supported types: {supported}")]
    UnsupportedFormat { mime: String, supported: String },

    /// The extractor matched but could not read the bytes (corrupt file,
    /// library error).
    #[error("failed to extract {format} content: {reason}")]
    Extraction { format: &'static str, reason: String },
}

impl ExtractError {
    pub(crate) fn extraction(format: &'static str, reason: impl ToString) -> Self {
        ExtractError::Extraction {
            format,
            reason: reason.to_string(),
        }
    }
}

/// Invalid chunker parameters. These are programming errors and fail fast.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be strictly less than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding configuration error: {0}")]
    Config(String),

    #[error("embedding backend error: {0}")]
    Backend(String),

    #[error("embedding backend returned no vectors")]
    EmptyResponse,

    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding backend returned a {got}-dimensional vector, expected {expected}")]
    InconsistentDims { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion provider is disabled")]
    Disabled,

    #[error("completion backend error: {0}")]
    Backend(String),

    #[error("completion backend returned an empty message")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document {0} not found")]
    NotFound(FileId),

    #[error("id already exists: {0}")]
    Duplicate(String),

    #[error("document {file_id} has {stored} stored chunks, expected {expected}")]
    ChunkCountMismatch {
        file_id: FileId,
        expected: usize,
        stored: usize,
    },

    #[error("chunk at position {position} of document {file_id} has index {chunk_index}")]
    NonContiguousIndex {
        file_id: FileId,
        position: usize,
        chunk_index: i64,
    },

    #[error("chunk {chunk_id} belongs to document {chunk_file}, not {file_id}")]
    ForeignChunk {
        chunk_id: String,
        chunk_file: FileId,
        file_id: FileId,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Boundary error for [`RagService`](crate::rag::RagService) operations.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The query vector and stored vectors come from different embedding
    /// configurations; comparing them would be meaningless.
    #[error(
        "query embedding has {query_dims} dimensions ({query_model}) but stored chunks \
         have {stored_dims} ({stored_model}); re-ingest with the current model"
    )]
    DimensionMismatch {
        query_model: String,
        query_dims: usize,
        stored_model: String,
        stored_dims: usize,
    },

    #[error("document {0} not found")]
    NotFound(FileId),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    /// Short label for the failing stage, used in logs and stored failure
    /// metadata.
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::Extract(ExtractError::UnsupportedFormat { .. }) => "unsupported_format",
            RagError::Extract(_) => "extraction",
            RagError::Chunk(_) => "chunking",
            RagError::Embedding(_) => "embedding",
            RagError::Completion(_) => "completion",
            RagError::Store(_) => "storage",
            RagError::DimensionMismatch { .. } => "retrieval",
            RagError::NotFound(_) => "not_found",
            RagError::Cancelled => "cancelled",
            RagError::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type RagResult<T> = Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_lists_supported_types() {
        let err = ExtractError::UnsupportedFormat {
            mime: "image/png".to_string(),
            supported: "text/plain, application/pdf".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("image/png"));
        assert!(msg.contains("text/plain, application/pdf"));
    }

    #[test]
    fn stage_labels() {
        assert_eq!(RagError::Cancelled.stage(), "cancelled");
        assert_eq!(
            RagError::from(EmbeddingError::EmptyResponse).stage(),
            "embedding"
        );
        assert_eq!(
            RagError::from(ExtractError::extraction("pdf", "bad xref")).stage(),
            "extraction"
        );
    }
}
