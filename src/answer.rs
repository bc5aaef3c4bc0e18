//! Answer generation over retrieved chunks.
//!
//! The retrieved chunks are numbered `[1]`, `[2]`, … in rank order and
//! handed to the completion backend as context. An empty result set is
//! answered without calling the model. Completion failures degrade to a
//! fixed apology with confidence 0.

use std::sync::Arc;

use tracing::warn;

use crate::completion::{ChatMessage, CompletionBackend, CompletionOptions};
use crate::models::SearchResult;

/// Returned when retrieval finds nothing above the threshold.
pub const NO_INFORMATION: &str = "no relevant information found";

/// Returned when the completion backend fails.
pub const COMPLETION_FALLBACK: &str =
    "Sorry, an error occurred while generating the answer. Please try again later.";

/// Returned when the query could not be embedded.
pub const SEARCH_UNAVAILABLE: &str =
    "Document search is currently unavailable, so this question cannot be answered right now.";

const CONFIDENCE_BOOST: f64 = 1.2;
const AGREEMENT_BOOST: f64 = 1.1;
const AGREEMENT_MIN_RESULTS: usize = 3;
const AGREEMENT_MIN_AVERAGE: f64 = 0.8;

/// Heuristic confidence from retrieval scores. Not a calibrated
/// probability.
///
/// The mean score is boosted by 1.2, and by a further 1.1 when at least
/// three results average above 0.8, capped at 1 and rounded to two
/// decimals. Empty input scores 0.
pub fn confidence(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let avg = (scores.iter().sum::<f64>() / scores.len() as f64).clamp(0.0, 1.0);
    let mut value = (avg * CONFIDENCE_BOOST).min(1.0);
    if scores.len() >= AGREEMENT_MIN_RESULTS && avg > AGREEMENT_MIN_AVERAGE {
        value = (value * AGREEMENT_BOOST).min(1.0);
    }
    (value * 100.0).round() / 100.0
}

/// Number each chunk `[i]` in rank order, separated by blank lines.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, r.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn grounded_system_prompt(context: &str) -> String {
    format!(
        "You are an assistant that answers questions about the user's documents.\n\
         Answer using only the context below. If the context does not contain the answer, \
         say so explicitly instead of guessing. Cite the sources you use by their index, \
         for example [1] or [2].\n\n\
         Context:\n{}",
        context
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub confidence: f64,
}

pub struct AnswerGenerator {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
    top_p: f32,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, temperature: f32, top_p: f32) -> Self {
        Self {
            backend,
            temperature,
            top_p,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub async fn generate(&self, question: &str, results: &[SearchResult]) -> GeneratedAnswer {
        if results.is_empty() {
            return GeneratedAnswer {
                answer: NO_INFORMATION.to_string(),
                confidence: 0.0,
            };
        }

        let messages = [
            ChatMessage::system(grounded_system_prompt(&build_context(results))),
            ChatMessage::user(question),
        ];
        let options = CompletionOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            tools: Vec::new(),
        };

        match self.backend.complete(&messages, &options).await {
            Ok(reply) => {
                let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
                GeneratedAnswer {
                    answer: reply.content,
                    confidence: confidence(&scores),
                }
            }
            Err(e) => {
                warn!(model = self.model_name(), error = %e, "answer generation failed");
                GeneratedAnswer {
                    answer: COMPLETION_FALLBACK.to_string(),
                    confidence: 0.0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use crate::completion::{CompletionReply, DisabledCompletion};
    use crate::error::CompletionError;
    use crate::models::{Chunk, FileId, SourceDocument};
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl CompletionBackend for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<CompletionReply, CompletionError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(CompletionReply {
                content: "Employees get 15 days [1].".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn result(content: &str, score: f64) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: "doc_chunk_0".to_string(),
                file_id: FileId(1),
                content: content.to_string(),
                embedding: vec![1.0],
                embedding_model: "test".to_string(),
                chunk_index: 0,
                chunk_count: 1,
                token_count: 1,
                start_index: 0,
                end_index: 1,
                page_number: None,
                section: None,
                metadata: serde_json::json!({}),
            },
            score,
            document: SourceDocument {
                file_id: FileId(1),
                document_id: "doc".to_string(),
                file_name: "policy.txt".to_string(),
                file_type: "text/plain".to_string(),
                file_size: 1,
                title: None,
            },
        }
    }

    #[test]
    fn confidence_examples() {
        assert_eq!(confidence(&[]), 0.0);
        assert_eq!(confidence(&[0.5]), 0.6);
        assert_eq!(confidence(&[0.75, 0.75]), 0.9);
        // Below the agreement cutoff only the first boost applies.
        assert_eq!(confidence(&[0.75, 0.75, 0.75]), 0.9);
        assert_eq!(confidence(&[0.9, 0.9, 0.9]), 1.0);
    }

    #[test]
    fn confidence_bounded_and_monotonic() {
        for n in 1..=5 {
            let mut prev = 0.0;
            for step in 0..=100 {
                let avg = step as f64 / 100.0;
                let c = confidence(&vec![avg; n]);
                assert!((0.0..=1.0).contains(&c), "n={n} avg={avg} c={c}");
                assert!(c >= prev, "n={n} avg={avg}: {c} < {prev}");
                prev = c;
            }
        }
    }

    #[test]
    fn confidence_is_deterministic() {
        let scores = [0.71, 0.93, 0.66];
        assert_eq!(confidence(&scores), confidence(&scores));
    }

    #[test]
    fn context_is_numbered_in_rank_order() {
        let ctx = build_context(&[result("first", 0.9), result("second", 0.8)]);
        assert_eq!(ctx, "[1] first\n\n[2] second");
    }

    #[tokio::test]
    async fn empty_results_skip_the_model() {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let generator = AnswerGenerator::new(echo.clone(), 0.1, 0.9);
        let answer = generator.generate("anything", &[]).await;
        assert_eq!(answer.answer, NO_INFORMATION);
        assert_eq!(answer.confidence, 0.0);
        assert!(echo.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_reaches_the_model() {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let generator = AnswerGenerator::new(echo.clone(), 0.1, 0.9);
        let answer = generator
            .generate("how many days", &[result("vacation: 15 days", 0.9)])
            .await;
        assert_eq!(answer.answer, "Employees get 15 days [1].");
        assert_eq!(answer.confidence, 1.0);

        let seen = echo.seen.lock().unwrap();
        assert!(seen[0][0].content.contains("[1] vacation: 15 days"));
        assert_eq!(seen[0][1].content, "how many days");
    }

    #[tokio::test]
    async fn completion_failure_degrades() {
        let generator = AnswerGenerator::new(Arc::new(DisabledCompletion), 0.1, 0.9);
        let answer = generator.generate("q", &[result("text", 0.9)]).await;
        assert_eq!(answer.answer, COMPLETION_FALLBACK);
        assert_eq!(answer.confidence, 0.0);
    }
}
