//! Text embedding providers
//!
//! Intent classification compares a query embedding against per-intent
//! prototype vectors. Two providers are available:
//!
//! - [`OpenAIEmbeddings`] calls an OpenAI-compatible `/embeddings` endpoint
//! - [`LocalEmbeddings`] runs a BERT sentence encoder in-process with candle,
//!   used when no remote model is configured or the remote one is down
//!
//! All vectors returned by this module are L2-normalized, so cosine
//! similarity reduces to a dot product.

use crate::{LLMError, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Produces fixed-dimension embeddings for text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the default embeds them one at a time
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Identifier used in logs and health reports
    fn name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two vectors of equal length
///
/// Returns 0.0 when the lengths differ or either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < 1e-10 || nb < 1e-10 {
        return 0.0;
    }
    dot / (na * nb)
}

// ============================================================================
// Local sentence embeddings
// ============================================================================

/// Hugging Face repository loaded by [`LocalEmbeddings::new`]
pub const DEFAULT_LOCAL_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// A BERT sentence encoder loaded into memory
struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertEncoder {
    /// Download (or reuse from the Hugging Face cache) and load `repo`
    fn load(repo: &str) -> Result<Self> {
        info!(model = %repo, "Loading local embedding model");
        let device = Device::Cpu;

        let api = Api::new().map_err(local_error)?;
        let repo_api = api.repo(Repo::new(repo.to_string(), RepoType::Model));
        let config_path = repo_api.get("config.json").map_err(local_error)?;
        let tokenizer_path = repo_api.get("tokenizer.json").map_err(local_error)?;
        let weights_path = repo_api.get("model.safetensors").map_err(local_error)?;

        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(&config_path).map_err(local_error)?,
        )?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(local_error)?;
        let weights = std::fs::read(&weights_path).map_err(local_error)?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DTYPE, &device).map_err(local_error)?;
        let model = BertModel::load(vb, &config).map_err(local_error)?;

        info!(model = %repo, hidden_size = config.hidden_size, "Local embedding model loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// CLS-pooled, L2-normalised embeddings of `texts`
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(local_error)?;
        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(texts.len() * max_len);
        let mut mask = Vec::with_capacity(texts.len() * max_len);
        let mut type_ids = Vec::with_capacity(texts.len() * max_len);
        for encoding in &encodings {
            let pad = max_len - encoding.get_ids().len();
            ids.extend(encoding.get_ids().iter().copied().chain(std::iter::repeat_n(0, pad)));
            mask.extend(
                encoding
                    .get_attention_mask()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat_n(0, pad)),
            );
            type_ids.extend(encoding.get_type_ids().iter().copied().chain(std::iter::repeat_n(0, pad)));
        }

        let shape = (texts.len(), max_len);
        let ids = Tensor::from_vec(ids, shape, &self.device).map_err(local_error)?;
        let mask = Tensor::from_vec(mask, shape, &self.device).map_err(local_error)?;
        let type_ids = Tensor::from_vec(type_ids, shape, &self.device).map_err(local_error)?;

        // (batch, seq, hidden) -> CLS row of each sequence
        let output = self
            .model
            .forward(&ids, &type_ids, Some(&mask))
            .map_err(local_error)?;
        let cls = output
            .narrow(1, 0, 1)
            .and_then(|t| t.squeeze(1))
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(local_error)?;

        Ok(cls
            .into_iter()
            .map(|mut v| {
                normalize(&mut v);
                v
            })
            .collect())
    }
}

fn local_error(e: impl std::fmt::Display) -> LLMError {
    LLMError::Unavailable(format!("local embedding model: {e}"))
}

/// Sentence embeddings computed in-process with a BERT model (BGE-small by default)
///
/// The model is fetched through the Hugging Face cache and loaded on the first
/// call. A failed load is remembered: every later call reports
/// [`LLMError::Unavailable`] without trying again. Inference runs on the
/// blocking thread pool.
pub struct LocalEmbeddings {
    repo: String,
    encoder: OnceCell<std::result::Result<Arc<BertEncoder>, String>>,
}

impl LocalEmbeddings {
    /// Embedder for [`DEFAULT_LOCAL_MODEL`]
    pub fn new() -> Self {
        Self::with_model(DEFAULT_LOCAL_MODEL)
    }

    /// Embedder for a BERT-family repository on the Hugging Face hub
    pub fn with_model(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            encoder: OnceCell::new(),
        }
    }

    /// Repository the model is loaded from
    pub fn model(&self) -> &str {
        &self.repo
    }

    async fn encoder(&self) -> Result<Arc<BertEncoder>> {
        let loaded = self
            .encoder
            .get_or_init(|| async {
                let repo = self.repo.clone();
                match tokio::task::spawn_blocking(move || BertEncoder::load(&repo)).await {
                    Ok(Ok(encoder)) => Ok(Arc::new(encoder)),
                    Ok(Err(e)) => {
                        warn!(model = %self.repo, error = %e, "Local embedding model failed to load");
                        Err(e.to_string())
                    }
                    Err(e) => Err(format!("model loader panicked: {e}")),
                }
            })
            .await;
        loaded.clone().map_err(LLMError::Unavailable)
    }
}

impl Default for LocalEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("Empty embedding batch".to_string()))
    }

    #[instrument(skip(self, texts), fields(model = %self.repo, count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encoder = self.encoder().await?;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || encoder.encode(&texts))
            .await
            .map_err(|e| LLMError::ProviderError(format!("embedding task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "local"
    }
}

// ============================================================================
// OpenAI-compatible embeddings
// ============================================================================

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAIEmbeddings {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAIEmbeddings {
    /// Create a client for the given endpoint and model
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        })
    }

    /// Model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(match status.as_u16() {
                401 => LLMError::AuthenticationFailed,
                429 => LLMError::RateLimitExceeded(error_text),
                404 => LLMError::ModelNotFound(self.model.clone()),
                _ => LLMError::RequestFailed(format!("HTTP {status}: {error_text}")),
            });
        }

        let mut body: EmbeddingResponse = response.json().await.map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse embeddings: {e}"))
        })?;
        if body.data.len() != expected {
            return Err(LLMError::UnexpectedResponse(format!(
                "Expected {expected} embeddings, got {}",
                body.data.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body
            .data
            .into_iter()
            .map(|d| {
                let mut v = d.embedding;
                normalize(&mut v);
                v
            })
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(model = %self.model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!("Requesting batch embeddings");
        self.request(texts.to_vec()).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_and_cosine() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((cosine_similarity(&v, &[6.0, 8.0]) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        normalize(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
        assert!(cosine_similarity(&zero, &zero).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_local_embeddings_load_lazily() {
        let e = LocalEmbeddings::with_model("org/some-bert");
        assert_eq!(e.model(), "org/some-bert");
        assert_eq!(e.name(), "local");
        assert!(e.encoder.get().is_none());
        assert_eq!(LocalEmbeddings::new().model(), DEFAULT_LOCAL_MODEL);
    }

    #[tokio::test]
    #[ignore = "downloads the model from the Hugging Face hub"]
    async fn test_local_embeddings_rank_paraphrases() {
        let e = LocalEmbeddings::new();
        let q = e.embed("What is Tesla stock trading at?").await.unwrap();
        let near = e.embed("Current share price of Apple").await.unwrap();
        let far = e.embed("Explain what a dividend is").await.unwrap();

        assert_eq!(q.len(), 384);
        let norm: f32 = q.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    #[ignore = "contacts the Hugging Face hub"]
    async fn test_missing_repository_is_unavailable_and_remembered() {
        let e = LocalEmbeddings::with_model("agent-rs/no-such-model");
        assert!(matches!(e.embed("hello").await, Err(LLMError::Unavailable(_))));
        assert!(e.encoder.get().is_some_and(std::result::Result::is_err));
        assert!(matches!(e.embed("again").await, Err(LLMError::Unavailable(_))));
    }

    #[test]
    fn test_openai_embeddings_construction() {
        let e = OpenAIEmbeddings::new("k", "https://api.openai.com/v1/", None, Duration::from_secs(5))
            .unwrap();
        assert_eq!(e.model(), "text-embedding-3-small");
        assert_eq!(e.api_base, "https://api.openai.com/v1");
    }
}
