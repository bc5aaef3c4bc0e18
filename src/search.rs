//! Retrieval engine: brute-force cosine ranking over stored chunk vectors.
//!
//! Candidates are the chunks of `completed` documents (optionally one
//! document). Each is scored against the query embedding, filtered by the
//! similarity threshold, and ordered by score descending with ties broken
//! by `chunk_index` and then document insertion order.

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::error::{RagError, RagResult};
use crate::models::{FileId, QueryOptions, SearchResult};
use crate::rag::{guard, RagService};
use crate::store::{Candidate, DocumentStore};

/// Resolved retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub top_k: usize,
    pub threshold: f64,
    pub file_id: Option<FileId>,
}

impl SearchParams {
    /// Fill unset options from defaults and reject unusable values.
    ///
    /// Thresholds above 1.0 are accepted; they simply match nothing.
    pub fn resolve(
        options: &QueryOptions,
        default_top_k: usize,
        default_threshold: f64,
    ) -> RagResult<Self> {
        let top_k = options.top_k.unwrap_or(default_top_k);
        let threshold = options.threshold.unwrap_or(default_threshold);
        if top_k == 0 {
            return Err(RagError::InvalidRequest("top_k must be at least 1".into()));
        }
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(RagError::InvalidRequest(format!(
                "threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        Ok(Self {
            top_k,
            threshold,
            file_id: options.file_id,
        })
    }
}

/// Cosine similarity mapped onto `[0, 1]`. Opposed directions score 0.
pub fn similarity(a: &[f32], b: &[f32]) -> f64 {
    (cosine_similarity(a, b) as f64).clamp(0.0, 1.0)
}

/// Score, filter and order `candidates` against `query`.
///
/// Every candidate vector must have the query's dimensionality; a mismatch
/// means the store holds vectors from another embedding configuration.
pub fn rank(
    query: &[f32],
    query_model: &str,
    candidates: Vec<Candidate>,
    params: &SearchParams,
) -> RagResult<Vec<SearchResult>> {
    let mut scored = Vec::new();
    for candidate in candidates {
        if candidate.chunk.dims() != query.len() {
            return Err(RagError::DimensionMismatch {
                query_model: query_model.to_string(),
                query_dims: query.len(),
                stored_model: candidate.chunk.embedding_model.clone(),
                stored_dims: candidate.chunk.dims(),
            });
        }
        let score = similarity(query, &candidate.chunk.embedding);
        if score >= params.threshold {
            scored.push(SearchResult {
                chunk: candidate.chunk,
                score,
                document: candidate.document,
            });
        }
    }

    scored.sort_by(compare_results);
    scored.truncate(params.top_k);
    Ok(scored)
}

fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        .then_with(|| a.chunk.file_id.cmp(&b.chunk.file_id))
}

/// Embeds queries and ranks stored chunks against them.
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<EmbeddingClient>,
}

impl Retriever {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<EmbeddingClient>) -> Self {
        Self { store, embedder }
    }

    /// Return at most `top_k` chunks scoring at least `threshold`.
    ///
    /// A blank query or an empty candidate set yields no results without
    /// calling the embedding backend.
    pub async fn search(
        &self,
        query: &str,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> RagResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let candidates = guard(cancel, async {
            Ok(self.store.candidates(params.file_id).await?)
        })
        .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = guard(cancel, async { Ok(self.embedder.embed(query).await?) }).await?;
        let total = candidates.len();
        let results = rank(&query_vec, self.embedder.model_name(), candidates, params)?;
        debug!(
            candidates = total,
            results = results.len(),
            top_k = params.top_k,
            threshold = params.threshold,
            "ranked candidates"
        );
        Ok(results)
    }
}

/// `docqa search`: print ranked chunks without generating an answer.
pub async fn run_search(config: &Config, query: &str, options: QueryOptions) -> Result<()> {
    let service = RagService::from_config(config).await?;
    let results = service.search(query, &options).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} (chunk {}/{}, tokens {}..{})",
            i + 1,
            result.score,
            result.document.file_name,
            result.chunk.chunk_index + 1,
            result.chunk.chunk_count,
            result.chunk.start_index,
            result.chunk.end_index,
        );
        println!("    document: {}", result.document.document_id);
        println!("    {}", preview(&result.chunk.content, 200));
        println!();
    }
    Ok(())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::{Chunk, SourceDocument};

    fn candidate(file_id: i64, index: i64, embedding: Vec<f32>) -> Candidate {
        Candidate {
            chunk: Chunk {
                id: format!("doc_{}_chunk_{}", file_id, index),
                file_id: FileId(file_id),
                content: format!("content {} {}", file_id, index),
                embedding,
                embedding_model: "test".to_string(),
                chunk_index: index,
                chunk_count: 4,
                token_count: 2,
                start_index: 0,
                end_index: 2,
                page_number: None,
                section: None,
                metadata: serde_json::json!({}),
            },
            document: SourceDocument {
                file_id: FileId(file_id),
                document_id: format!("doc_{}", file_id),
                file_name: format!("file{}.txt", file_id),
                file_type: "text/plain".to_string(),
                file_size: 10,
                title: None,
            },
        }
    }

    fn params(top_k: usize, threshold: f64) -> SearchParams {
        SearchParams {
            top_k,
            threshold,
            file_id: None,
        }
    }

    #[test]
    fn similarity_is_clamped_to_unit_interval() {
        assert_eq!(similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(similarity(&[], &[]), 0.0);
    }

    #[test]
    fn results_sorted_descending_filtered_and_truncated() {
        let candidates = vec![
            candidate(1, 0, vec![1.0, 0.0]),
            candidate(1, 1, vec![0.6, 0.8]),
            candidate(1, 2, vec![0.0, 1.0]),
            candidate(2, 0, vec![0.8, 0.6]),
        ];
        let results = rank(&[1.0, 0.0], "test", candidates, &params(2, 0.5)).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.score >= 0.5));
        assert_eq!(results[0].chunk.id, "doc_1_chunk_0");
        assert_eq!(results[1].chunk.id, "doc_2_chunk_0");
    }

    #[test]
    fn ties_break_by_chunk_index_then_document() {
        let candidates = vec![
            candidate(2, 1, vec![1.0, 0.0]),
            candidate(2, 0, vec![1.0, 0.0]),
            candidate(1, 1, vec![1.0, 0.0]),
            candidate(1, 0, vec![1.0, 0.0]),
        ];
        let results = rank(&[1.0, 0.0], "test", candidates, &params(10, 0.0)).unwrap();
        let order: Vec<(i64, i64)> = results
            .iter()
            .map(|r| (r.chunk.chunk_index, r.chunk.file_id.0))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
    }

    #[test]
    fn unreachable_threshold_returns_nothing() {
        let candidates = vec![candidate(1, 0, vec![1.0, 0.0])];
        let results = rank(&[1.0, 0.0], "test", candidates, &params(5, 1.01)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_refused() {
        let candidates = vec![candidate(1, 0, vec![1.0, 0.0, 0.0])];
        let err = rank(&[1.0, 0.0], "query-model", candidates, &params(5, 0.0)).unwrap_err();
        match err {
            RagError::DimensionMismatch {
                query_dims,
                stored_dims,
                query_model,
                ..
            } => {
                assert_eq!(query_dims, 2);
                assert_eq!(stored_dims, 3);
                assert_eq!(query_model, "query-model");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolve_applies_defaults_and_bounds() {
        let p = SearchParams::resolve(&QueryOptions::default(), 5, 0.7).unwrap();
        assert_eq!(p, params(5, 0.7));

        let opts = QueryOptions {
            top_k: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            SearchParams::resolve(&opts, 5, 0.7),
            Err(RagError::InvalidRequest(_))
        ));

        let opts = QueryOptions {
            threshold: Some(f64::NAN),
            ..Default::default()
        };
        assert!(SearchParams::resolve(&opts, 5, 0.7).is_err());

        let opts = QueryOptions {
            threshold: Some(1.01),
            ..Default::default()
        };
        assert_eq!(SearchParams::resolve(&opts, 5, 0.7).unwrap().threshold, 1.01);
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
