//! Embedding backends and the batching client.
//!
//! Defines the [`EmbeddingBackend`] trait and concrete implementations:
//! - **[`DisabledBackend`]**: returns errors; used when embeddings are not configured.
//! - **[`OllamaBackend`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIBackend`]**: calls the OpenAI embeddings API.
//! - **`LocalBackend`**: offline inference via fastembed (feature
//!   `local-embeddings-fastembed`).
//!
//! [`EmbeddingClient`] wraps a backend and adds the guarantees the pipeline
//! relies on: one vector per input in input order, consistent dimensions
//! within a call, and sequential batching with a pause between batches.
//!
//! Also provides vector utilities for SQLite BLOB storage:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::http;

/// Text used to discover the dimensionality of a model with unknown dims.
const DIMENSION_SAMPLE: &str = "dimension sample";

/// A text-to-vector model.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"mxbai-embed-large"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality, when known without a call.
    fn dims(&self) -> Option<usize>;

    /// Embed every text in one request. Either all succeed or the call fails.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

// ============ Disabled Backend ============

/// Used when `embedding.provider = "disabled"`. Any attempt to embed text
/// fails with [`EmbeddingError::Disabled`].
pub struct DisabledBackend;

#[async_trait]
impl EmbeddingBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> Option<usize> {
        None
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

// ============ Ollama Backend ============

/// Embedding backend using an Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires the model to be pulled
/// (e.g. `ollama pull mxbai-embed-large`).
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl OllamaBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.base_url(),
            model: config.model_name(),
            dims: config.resolved_dims(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(EmbeddingError::Backend)?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            EmbeddingError::Backend("Invalid Ollama response: missing embeddings array".into())
        })?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| json_floats(values))
                .ok_or_else(|| {
                    EmbeddingError::Backend(
                        "Invalid Ollama response: embedding is not an array".into(),
                    )
                })
        })
        .collect()
}

// ============ OpenAI Backend ============

/// Embedding backend using the OpenAI API.
///
/// Calls `POST /v1/embeddings`. Requires the `OPENAI_API_KEY` environment
/// variable to be set.
pub struct OpenAIBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl OpenAIBackend {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.base_url(),
            api_key,
            model: config.model_name(),
            dims: config.resolved_dims(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/v1/embeddings", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(EmbeddingError::Backend)?;
        parse_openai_response(&json)
    }
}

/// Extracts the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            EmbeddingError::Backend("Invalid OpenAI response: missing data array".into())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EmbeddingError::Backend("Invalid OpenAI response: missing embedding".into())
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, json_floats(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn json_floats(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Local Backend (fastembed) ============

/// Offline embeddings. The model is downloaded from Hugging Face on first
/// use and cached; afterwards no network calls are made.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalBackend {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config.model_name();
        // Fail on unknown names at startup rather than on first embed.
        config_to_fastembed_model(&model_name)?;
        let dims = config.resolved_dims().unwrap_or(384);
        Ok(Self {
            model_name,
            dims,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small, multilingual-e5-base, \
             multilingual-e5-large",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts = texts.to_vec();
        let model = Arc::clone(&self.model);
        let name = self.model_name.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbeddingError::Backend("local model lock poisoned".into()))?;
            if guard.is_none() {
                let which = config_to_fastembed_model(&name)
                    .map_err(|e| EmbeddingError::Config(e.to_string()))?;
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(which).with_show_download_progress(false),
                )
                .map_err(|e| {
                    EmbeddingError::Backend(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }
            match guard.as_mut() {
                Some(m) => m
                    .embed(texts, None)
                    .map_err(|e| EmbeddingError::Backend(format!("Local embedding failed: {}", e))),
                None => Err(EmbeddingError::Backend("local model unavailable".into())),
            }
        })
        .await
        .map_err(|e| EmbeddingError::Backend(e.to_string()))?
    }
}

/// Create the backend named by `embedding.provider`.
///
/// | Config Value | Backend |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledBackend`] |
/// | `"ollama"` | [`OllamaBackend`] |
/// | `"openai"` | [`OpenAIBackend`] |
/// | `"local"` | `LocalBackend` (feature `local-embeddings-fastembed`) |
pub fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIBackend::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalBackend::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embeddings require building with the local-embeddings-fastembed feature"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Client ============

/// Batching front end over an [`EmbeddingBackend`].
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    batch_delay: Duration,
    known_dims: OnceCell<usize>,
}

impl EmbeddingClient {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            batch_delay,
            known_dims: OnceCell::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::new(
            create_backend(config)?,
            config.batch_size,
            Duration::from_millis(config.batch_delay_ms),
        ))
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyResponse)
    }

    /// Embed `texts` in a single backend call. Returns one vector per text,
    /// in input order, all of the same length.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.backend.embed_batch(texts).await?;
        if vectors.is_empty() {
            return Err(EmbeddingError::EmptyResponse);
        }
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            });
        }

        let expected = self
            .backend
            .dims()
            .or_else(|| self.known_dims.get().copied())
            .unwrap_or(vectors[0].len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected || v.is_empty()) {
            return Err(EmbeddingError::InconsistentDims {
                expected,
                got: bad.len(),
            });
        }
        // Already set means it already holds `expected`.
        let _ = self.known_dims.set(expected);
        Ok(vectors)
    }

    /// Embed `texts` in sequential groups of at most `batch_size`, pausing
    /// between groups. Output order matches input order.
    pub async fn embed_batched(
        &self,
        texts: &[String],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch_size = batch_size.max(1);
        let mut all = Vec::with_capacity(texts.len());
        let batches = texts.len().div_ceil(batch_size);

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            debug!(
                model = self.model_name(),
                batch = i + 1,
                batches,
                size = batch.len(),
                "embedding batch"
            );
            let vectors = self.embed_batch(batch).await?;
            if let Some(first) = all.first().map(|v: &Vec<f32>| v.len()) {
                if let Some(bad) = vectors.iter().find(|v| v.len() != first) {
                    return Err(EmbeddingError::InconsistentDims {
                        expected: first,
                        got: bad.len(),
                    });
                }
            }
            all.extend(vectors);
        }
        Ok(all)
    }

    /// Vector dimensionality of the configured model. Uses the backend's
    /// declared dims, else the length seen by the first successful call, and
    /// embeds a sample text only when neither is known.
    pub async fn dimension(&self) -> Result<usize, EmbeddingError> {
        if let Some(dims) = self.backend.dims() {
            return Ok(dims);
        }
        self.known_dims
            .get_or_try_init(|| async {
                let sample = self.embed(DIMENSION_SAMPLE).await?;
                Ok::<usize, EmbeddingError>(sample.len())
            })
            .await
            .copied()
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use docqa::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
