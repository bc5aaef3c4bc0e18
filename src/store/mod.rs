//! Storage abstraction for documents and their chunks.
//!
//! The [`DocumentStore`] trait defines every persistence operation the
//! ingestion and retrieval pipeline needs, enabling pluggable backends
//! ([`SqliteStore`] for real use, [`InMemoryStore`] for tests and
//! embedding applications without a database).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Chunk, Document, FileId, NewDocument, SourceDocument};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A stored chunk eligible for similarity ranking, with the attribution of
/// its owning document.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub document: SourceDocument,
}

/// Row counts backing the `stats` operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreCounts {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub status_counts: BTreeMap<String, i64>,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_document`](DocumentStore::create_document) | Insert a document in `processing` |
/// | [`save_chunks`](DocumentStore::save_chunks) | All-or-nothing chunk insert |
/// | [`complete_document`](DocumentStore::complete_document) | `processing → completed` |
/// | [`fail_document`](DocumentStore::fail_document) | `processing → failed`, dropping partial chunks |
/// | [`get_document`](DocumentStore::get_document) | One document by id |
/// | [`list_documents`](DocumentStore::list_documents) | All documents, newest upload first |
/// | [`delete_document`](DocumentStore::delete_document) | Remove a document and its chunks |
/// | [`get_chunks_by_file_id`](DocumentStore::get_chunks_by_file_id) | Chunks in index order |
/// | [`candidates`](DocumentStore::candidates) | Chunks of completed documents for ranking |
/// | [`counts`](DocumentStore::counts) | Totals and per-status counts |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document with status `processing` and return it with
    /// its assigned id.
    async fn create_document(&self, doc: &NewDocument) -> Result<Document, StoreError>;

    /// Insert every chunk for `file_id` in one transaction. On error no
    /// chunk is written.
    async fn save_chunks(&self, file_id: FileId, chunks: &[Chunk]) -> Result<(), StoreError>;

    /// Mark the document `completed`, recording `chunk_count`, the
    /// processing time and metadata. Fails if the stored chunk rows do not
    /// number exactly `chunk_count`.
    async fn complete_document(
        &self,
        file_id: FileId,
        chunk_count: usize,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Mark the document `failed` and remove any chunks it has.
    async fn fail_document(
        &self,
        file_id: FileId,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn get_document(&self, file_id: FileId) -> Result<Option<Document>, StoreError>;

    /// Ordered by `uploaded_at` descending, newest id first on ties.
    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    /// Remove the document and all its chunks atomically.
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn delete_document(&self, file_id: FileId) -> Result<(), StoreError>;

    /// Ordered by `chunk_index`.
    async fn get_chunks_by_file_id(&self, file_id: FileId) -> Result<Vec<Chunk>, StoreError>;

    /// Chunks of `completed` documents, optionally restricted to one file.
    async fn candidates(&self, file_id: Option<FileId>) -> Result<Vec<Candidate>, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}

/// Reject chunk batches that point at another document, skip an index or
/// repeat a chunk id.
pub(crate) fn check_chunks(file_id: FileId, chunks: &[Chunk]) -> Result<(), StoreError> {
    let mut ids = HashSet::with_capacity(chunks.len());
    for (position, chunk) in chunks.iter().enumerate() {
        if !ids.insert(chunk.id.as_str()) {
            return Err(StoreError::Duplicate(chunk.id.clone()));
        }
        if chunk.file_id != file_id {
            return Err(StoreError::ForeignChunk {
                chunk_id: chunk.id.clone(),
                chunk_file: chunk.file_id,
                file_id,
            });
        }
        if chunk.chunk_index != position as i64 {
            return Err(StoreError::NonContiguousIndex {
                file_id,
                position,
                chunk_index: chunk.chunk_index,
            });
        }
    }
    Ok(())
}
