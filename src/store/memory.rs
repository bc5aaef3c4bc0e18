//! In-memory [`DocumentStore`] implementation for tests and embedding use.
//!
//! Uses `BTreeMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Ids are assigned from an atomic counter, mirroring SQLite's
//! `AUTOINCREMENT`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::{Chunk, Document, DocumentStatus, FileId, NewDocument, SourceDocument};

use super::{check_chunks, Candidate, DocumentStore, StoreCounts};

#[derive(Default)]
struct State {
    docs: BTreeMap<FileId, Document>,
    chunks: Vec<Chunk>,
}

/// In-memory store.
pub struct InMemoryStore {
    state: RwLock<State>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_document(&self, doc: &NewDocument) -> Result<Document, StoreError> {
        let mut state = self.write()?;
        if state.docs.values().any(|d| d.document_id == doc.document_id) {
            return Err(StoreError::Duplicate(doc.document_id.clone()));
        }

        let id = FileId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let document = Document {
            id,
            document_id: doc.document_id.clone(),
            file_name: doc.file_name.clone(),
            file_type: doc.file_type.clone(),
            file_size: doc.file_size,
            title: doc.title.clone(),
            author: doc.author.clone(),
            page_count: doc.page_count,
            tags: doc.tags.clone(),
            language: doc.language.clone(),
            chunk_count: 0,
            status: DocumentStatus::Processing,
            uploaded_at: Utc::now(),
            processed_at: None,
            processing_metadata: doc.processing_metadata.clone(),
        };
        state.docs.insert(id, document.clone());
        Ok(document)
    }

    async fn save_chunks(&self, file_id: FileId, chunks: &[Chunk]) -> Result<(), StoreError> {
        check_chunks(file_id, chunks)?;

        let mut state = self.write()?;
        if !state.docs.contains_key(&file_id) {
            return Err(StoreError::NotFound(file_id));
        }
        // Validate the whole batch before touching state.
        for chunk in chunks {
            let clash = state.chunks.iter().any(|c| {
                c.id == chunk.id || (c.file_id == file_id && c.chunk_index == chunk.chunk_index)
            });
            if clash {
                return Err(StoreError::Duplicate(chunk.id.clone()));
            }
        }
        state.chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn complete_document(
        &self,
        file_id: FileId,
        chunk_count: usize,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let stored = state.chunks.iter().filter(|c| c.file_id == file_id).count();
        let doc = state
            .docs
            .get_mut(&file_id)
            .ok_or(StoreError::NotFound(file_id))?;
        if stored != chunk_count {
            return Err(StoreError::ChunkCountMismatch {
                file_id,
                expected: chunk_count,
                stored,
            });
        }
        doc.status = DocumentStatus::Completed;
        doc.chunk_count = chunk_count as i64;
        doc.processed_at = Some(Utc::now());
        doc.processing_metadata = processing_metadata.clone();
        Ok(())
    }

    async fn fail_document(
        &self,
        file_id: FileId,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.docs.contains_key(&file_id) {
            return Err(StoreError::NotFound(file_id));
        }
        state.chunks.retain(|c| c.file_id != file_id);
        if let Some(doc) = state.docs.get_mut(&file_id) {
            doc.status = DocumentStatus::Failed;
            doc.chunk_count = 0;
            doc.processed_at = Some(Utc::now());
            doc.processing_metadata = processing_metadata.clone();
        }
        Ok(())
    }

    async fn get_document(&self, file_id: FileId) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.docs.get(&file_id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.read()?.docs.values().cloned().collect();
        docs.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(docs)
    }

    async fn delete_document(&self, file_id: FileId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.docs.remove(&file_id).is_none() {
            return Err(StoreError::NotFound(file_id));
        }
        state.chunks.retain(|c| c.file_id != file_id);
        Ok(())
    }

    async fn get_chunks_by_file_id(&self, file_id: FileId) -> Result<Vec<Chunk>, StoreError> {
        let mut chunks: Vec<Chunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.file_id == file_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn candidates(&self, file_id: Option<FileId>) -> Result<Vec<Candidate>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<Candidate> = state
            .chunks
            .iter()
            .filter(|c| file_id.map_or(true, |f| c.file_id == f))
            .filter_map(|c| {
                let doc = state.docs.get(&c.file_id)?;
                (doc.status == DocumentStatus::Completed).then(|| Candidate {
                    chunk: c.clone(),
                    document: SourceDocument::from(doc),
                })
            })
            .collect();
        out.sort_by_key(|c| (c.chunk.file_id, c.chunk.chunk_index));
        Ok(out)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let state = self.read()?;
        let mut status_counts: BTreeMap<String, i64> = DocumentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for doc in state.docs.values() {
            *status_counts.entry(doc.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(StoreCounts {
            total_documents: state.docs.len() as i64,
            total_chunks: state.chunks.len() as i64,
            status_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_doc(document_id: &str) -> NewDocument {
        NewDocument {
            document_id: document_id.to_string(),
            file_name: "a.md".to_string(),
            file_type: "text/markdown".to_string(),
            file_size: 10,
            ..Default::default()
        }
    }

    fn chunk(file_id: FileId, index: i64) -> Chunk {
        Chunk {
            id: format!("{}_chunk_{}", file_id, index),
            file_id,
            content: "text".to_string(),
            embedding: vec![1.0, 0.0],
            embedding_model: "test".to_string(),
            chunk_index: index,
            chunk_count: 1,
            token_count: 1,
            start_index: 0,
            end_index: 1,
            page_number: None,
            section: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn ids_increase_and_list_is_newest_first() {
        let store = InMemoryStore::new();
        let a = store.create_document(&new_doc("doc_a")).await.unwrap();
        let b = store.create_document(&new_doc("doc_b")).await.unwrap();
        assert!(b.id > a.id);

        let listed = store.list_documents().await.unwrap();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[tokio::test]
    async fn rejects_foreign_and_gapped_chunks() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("doc_a")).await.unwrap();

        let err = store
            .save_chunks(doc.id, &[chunk(FileId(999), 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignChunk { .. }));

        let err = store
            .save_chunks(doc.id, &[chunk(doc.id, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NonContiguousIndex { position: 0, chunk_index: 1, .. }));
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_id_within_batch_is_rejected() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("doc_a")).await.unwrap();
        let first = chunk(doc.id, 0);
        let mut second = chunk(doc.id, 1);
        second.id = first.id.clone();

        let err = store.save_chunks(doc.id, &[first, second]).await.unwrap_err();
        let expected = format!("{}_chunk_0", doc.id);
        assert!(matches!(err, StoreError::Duplicate(id) if id == expected));
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());

        store
            .save_chunks(doc.id, &[chunk(doc.id, 0), chunk(doc.id, 1)])
            .await
            .unwrap();
        assert_eq!(store.get_chunks_by_file_id(doc.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = InMemoryStore::new();
        let doc = store.create_document(&new_doc("doc_a")).await.unwrap();
        store.save_chunks(doc.id, &[chunk(doc.id, 0)]).await.unwrap();
        store
            .complete_document(doc.id, 1, &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(store.candidates(None).await.unwrap().len(), 1);

        store.delete_document(doc.id).await.unwrap();
        assert!(store.candidates(None).await.unwrap().is_empty());
        assert_eq!(store.counts().await.unwrap().total_chunks, 0);
        assert!(matches!(
            store.delete_document(doc.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
