//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Every multi-row write runs in one transaction so a document's chunks are
//! visible all at once or not at all. Vectors are stored as little-endian
//! `f32` BLOBs next to the model name and dimension that produced them.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::StoreError;
use crate::models::{Chunk, Document, DocumentStatus, FileId, NewDocument, SourceDocument};
use crate::{db, migrate};

use super::{check_chunks, Candidate, DocumentStore, StoreCounts};

const DOCUMENT_COLUMNS: &str = "id, document_id, file_name, file_type, file_size, title, author, \
     page_count, tags_json, language, chunk_count, status, uploaded_at, processed_at, \
     processing_metadata";

const CHUNK_COLUMNS: &str = "c.id, c.file_id, c.content, c.embedding, c.embedding_model, \
     c.chunk_index, c.chunk_count, c.token_count, c.start_index, c.end_index, c.page_number, \
     c.section, c.metadata";

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path`, creating it and its schema if
    /// needed.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = db::connect(path).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

fn row_to_document(row: &SqliteRow) -> Result<Document, StoreError> {
    let status: String = row.get("status");
    let status = status
        .parse::<DocumentStatus>()
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))?;
    let tags_json: String = row.get("tags_json");
    let processing_metadata: String = row.get("processing_metadata");

    Ok(Document {
        id: FileId(row.get("id")),
        document_id: row.get("document_id"),
        file_name: row.get("file_name"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        title: row.get("title"),
        author: row.get("author"),
        page_count: row.get("page_count"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        language: row.get("language"),
        chunk_count: row.get("chunk_count"),
        status,
        uploaded_at: from_millis(row.get("uploaded_at")),
        processed_at: row.get::<Option<i64>, _>("processed_at").map(from_millis),
        processing_metadata: parse_json(&processing_metadata),
    })
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    let metadata: String = row.get("metadata");
    Chunk {
        id: row.get("id"),
        file_id: FileId(row.get("file_id")),
        content: row.get("content"),
        embedding: blob_to_vec(&blob),
        embedding_model: row.get("embedding_model"),
        chunk_index: row.get("chunk_index"),
        chunk_count: row.get("chunk_count"),
        token_count: row.get("token_count"),
        start_index: row.get("start_index"),
        end_index: row.get("end_index"),
        page_number: row.get("page_number"),
        section: row.get("section"),
        metadata: parse_json(&metadata),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(&self, doc: &NewDocument) -> Result<Document, StoreError> {
        let uploaded_at = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO documents (document_id, file_name, file_type, file_size, title, author,
                                   page_count, tags_json, language, chunk_count, status,
                                   uploaded_at, processed_at, processing_metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 'processing', ?, NULL, ?)
            "#,
        )
        .bind(&doc.document_id)
        .bind(&doc.file_name)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(&doc.title)
        .bind(&doc.author)
        .bind(doc.page_count)
        .bind(serde_json::to_string(&doc.tags)?)
        .bind(&doc.language)
        .bind(uploaded_at)
        .bind(doc.processing_metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(doc.document_id.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        let id = FileId(result.last_insert_rowid());
        self.get_document(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn save_chunks(&self, file_id: FileId, chunks: &[Chunk]) -> Result<(), StoreError> {
        check_chunks(file_id, chunks)?;

        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE id = ?")
            .bind(file_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(file_id));
        }

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, file_id, content, embedding, embedding_model,
                                    embedding_dims, chunk_index, chunk_count, token_count,
                                    start_index, end_index, page_number, section, metadata)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(file_id.0)
            .bind(&chunk.content)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(&chunk.embedding_model)
            .bind(chunk.dims() as i64)
            .bind(chunk.chunk_index)
            .bind(chunk.chunk_count)
            .bind(chunk.token_count)
            .bind(chunk.start_index)
            .bind(chunk.end_index)
            .bind(chunk.page_number)
            .bind(&chunk.section)
            .bind(chunk.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }

        // Dropping `tx` on any earlier `?` rolls the batch back.
        tx.commit().await?;
        Ok(())
    }

    async fn complete_document(
        &self,
        file_id: FileId,
        chunk_count: usize,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_id = ?")
            .bind(file_id.0)
            .fetch_one(&mut *tx)
            .await?;
        if stored as usize != chunk_count {
            return Err(StoreError::ChunkCountMismatch {
                file_id,
                expected: chunk_count,
                stored: stored as usize,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = 'completed', chunk_count = ?, processed_at = ?, processing_metadata = ?
            WHERE id = ?
            "#,
        )
        .bind(chunk_count as i64)
        .bind(now_millis())
        .bind(processing_metadata.to_string())
        .bind(file_id.0)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(file_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fail_document(
        &self,
        file_id: FileId,
        processing_metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id.0)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = 'failed', chunk_count = 0, processed_at = ?, processing_metadata = ?
            WHERE id = ?
            "#,
        )
        .bind(now_millis())
        .bind(processing_metadata.to_string())
        .bind(file_id.0)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(file_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, file_id: FileId) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(file_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY uploaded_at DESC, id DESC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete_document(&self, file_id: FileId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id.0)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(file_id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(file_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_chunks_by_file_id(&self, file_id: FileId) -> Result<Vec<Chunk>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks c WHERE c.file_id = ? ORDER BY c.chunk_index ASC",
            CHUNK_COLUMNS
        ))
        .bind(file_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn candidates(&self, file_id: Option<FileId>) -> Result<Vec<Candidate>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}, d.document_id AS d_document_id, d.file_name AS d_file_name,
                   d.file_type AS d_file_type, d.file_size AS d_file_size, d.title AS d_title
            FROM chunks c
            JOIN documents d ON d.id = c.file_id
            WHERE d.status = 'completed' AND (? IS NULL OR c.file_id = ?)
            ORDER BY c.file_id ASC, c.chunk_index ASC
            "#,
            CHUNK_COLUMNS
        );
        let filter = file_id.map(|f| f.0);
        let rows = sqlx::query(&sql)
            .bind(filter)
            .bind(filter)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let chunk = row_to_chunk(row);
                let document = SourceDocument {
                    file_id: chunk.file_id,
                    document_id: row.get("d_document_id"),
                    file_name: row.get("d_file_name"),
                    file_type: row.get("d_file_type"),
                    file_size: row.get("d_file_size"),
                    title: row.get("d_title"),
                };
                Candidate { chunk, document }
            })
            .collect())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        let mut status_counts: std::collections::BTreeMap<String, i64> = DocumentStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM documents GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            status_counts.insert(status, n);
        }

        Ok(StoreCounts {
            total_documents,
            total_chunks,
            status_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("data").join("docqa.sqlite"))
            .await
            .unwrap();
        (tmp, store)
    }

    fn new_doc(document_id: &str) -> NewDocument {
        NewDocument {
            document_id: document_id.to_string(),
            file_name: "notes.txt".to_string(),
            file_type: "text/plain".to_string(),
            file_size: 42,
            tags: vec!["hr".to_string()],
            processing_metadata: serde_json::json!({"chunkSize": 500}),
            ..Default::default()
        }
    }

    fn chunk(file_id: FileId, index: i64, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: format!("doc_{}_chunk_{}", file_id, index),
            file_id,
            content: format!("chunk {}", index),
            embedding,
            embedding_model: "test".to_string(),
            chunk_index: index,
            chunk_count: 2,
            token_count: 2,
            start_index: index * 2,
            end_index: index * 2 + 2,
            page_number: None,
            section: None,
            metadata: serde_json::json!({"tokenCount": 2}),
        }
    }

    #[tokio::test]
    async fn document_lifecycle() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_1_aaaa")).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert_eq!(doc.chunk_count, 0);
        assert_eq!(doc.tags, vec!["hr".to_string()]);
        assert!(doc.processed_at.is_none());

        let chunks = vec![chunk(doc.id, 0, vec![1.0, 0.0]), chunk(doc.id, 1, vec![0.0, 1.0])];
        store.save_chunks(doc.id, &chunks).await.unwrap();
        store
            .complete_document(doc.id, 2, &serde_json::json!({"embeddingDims": 2}))
            .await
            .unwrap();

        let doc = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Completed);
        assert_eq!(doc.chunk_count, 2);
        assert!(doc.processed_at.is_some());
        assert_eq!(doc.processing_metadata["embeddingDims"], 2);

        let stored = store.get_chunks_by_file_id(doc.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].embedding, vec![0.0, 1.0]);
        assert_eq!(stored[1].metadata["tokenCount"], 2);
    }

    #[tokio::test]
    async fn duplicate_document_id_rejected() {
        let (_tmp, store) = open_store().await;
        store.create_document(&new_doc("doc_dup")).await.unwrap();
        let err = store.create_document(&new_doc("doc_dup")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "doc_dup"));
    }

    #[tokio::test]
    async fn failed_chunk_batch_writes_nothing() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_batch")).await.unwrap();

        let other = store.create_document(&new_doc("doc_other")).await.unwrap();
        let taken = chunk(other.id, 0, vec![1.0, 0.0]);
        store.save_chunks(other.id, &[taken.clone()]).await.unwrap();

        // Second chunk collides with a row stored for another document.
        let mut second = chunk(doc.id, 1, vec![0.0, 1.0]);
        second.id = taken.id;
        let err = store
            .save_chunks(doc.id, &[chunk(doc.id, 0, vec![1.0, 0.0]), second])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_id_within_batch_is_a_duplicate() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_repeat")).await.unwrap();

        let mut second = chunk(doc.id, 1, vec![0.0, 1.0]);
        second.id = format!("doc_{}_chunk_0", doc.id);
        let err = store
            .save_chunks(doc.id, &[chunk(doc.id, 0, vec![1.0, 0.0]), second])
            .await
            .unwrap_err();
        let expected = format!("doc_{}_chunk_0", doc.id);
        assert!(matches!(err, StoreError::Duplicate(id) if id == expected));
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_requires_matching_chunk_rows() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_count")).await.unwrap();
        store
            .save_chunks(doc.id, &[chunk(doc.id, 0, vec![1.0])])
            .await
            .unwrap();
        let err = store
            .complete_document(doc.id, 3, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ChunkCountMismatch { expected: 3, stored: 1, .. }
        ));
        let doc = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn failed_documents_lose_chunks_and_leave_candidates() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_fail")).await.unwrap();
        store
            .save_chunks(doc.id, &[chunk(doc.id, 0, vec![1.0])])
            .await
            .unwrap();
        store
            .fail_document(doc.id, &serde_json::json!({"error": "boom", "failedStep": "embedding"}))
            .await
            .unwrap();

        let doc = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.chunk_count, 0);
        assert_eq!(doc.processing_metadata["failedStep"], "embedding");
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());
        assert!(store.candidates(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn candidates_only_from_completed_documents() {
        let (_tmp, store) = open_store().await;
        let done = store.create_document(&new_doc("doc_done")).await.unwrap();
        store
            .save_chunks(done.id, &[chunk(done.id, 0, vec![1.0])])
            .await
            .unwrap();
        store
            .complete_document(done.id, 1, &serde_json::json!({}))
            .await
            .unwrap();

        let pending = store.create_document(&new_doc("doc_pending")).await.unwrap();
        store
            .save_chunks(pending.id, &[chunk(pending.id, 0, vec![1.0])])
            .await
            .unwrap();

        let all = store.candidates(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].document.document_id, "doc_done");
        assert_eq!(all[0].document.file_name, "notes.txt");

        assert!(store.candidates(Some(pending.id)).await.unwrap().is_empty());
        assert_eq!(store.candidates(Some(done.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_chunks_and_reports_unknown_ids() {
        let (_tmp, store) = open_store().await;
        let doc = store.create_document(&new_doc("doc_del")).await.unwrap();
        store
            .save_chunks(doc.id, &[chunk(doc.id, 0, vec![1.0])])
            .await
            .unwrap();

        store.delete_document(doc.id).await.unwrap();
        assert!(store.get_document(doc.id).await.unwrap().is_none());
        assert!(store.get_chunks_by_file_id(doc.id).await.unwrap().is_empty());

        let err = store.delete_document(doc.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == doc.id));
    }

    #[tokio::test]
    async fn counts_cover_every_status() {
        let (_tmp, store) = open_store().await;
        store.create_document(&new_doc("doc_a")).await.unwrap();
        let counts = store.counts().await.unwrap();
        assert_eq!(counts.total_documents, 1);
        assert_eq!(counts.total_chunks, 0);
        assert_eq!(counts.status_counts["processing"], 1);
        assert_eq!(counts.status_counts["completed"], 0);
        assert_eq!(counts.status_counts["failed"], 0);
    }
}
