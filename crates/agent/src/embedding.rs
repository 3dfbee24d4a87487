//! Remote embedding providers for the knowledge base.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use maitre_core::config::{EmbeddingConfig, EmbeddingProvider};
use maitre_core::retrieval::{Embedder, HashingEmbedder, RetrievalError};

use crate::http::{join_url, HttpError, JsonClient};

const EMBED_TIMEOUT: Duration = Duration::from_secs(60);
const EMBED_MAX_RETRIES: u32 = 2;
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        let mut data = self.data;
        data.sort_by_key(|item| item.index);
        data.into_iter().map(|item| item.embedding).collect()
    }
}

fn provider_error(error: HttpError) -> RetrievalError {
    RetrievalError::Embedding(error.to_string())
}

fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dim: usize,
) -> Result<Vec<Vec<f32>>, RetrievalError> {
    if vectors.len() != expected_count {
        return Err(RetrievalError::Embedding(format!(
            "provider returned {} vectors for {expected_count} inputs",
            vectors.len()
        )));
    }
    if let Some(vector) = vectors.iter().find(|vector| vector.len() != dim) {
        return Err(RetrievalError::DimensionMismatch { expected: dim, actual: vector.len() });
    }
    Ok(vectors)
}

pub struct OllamaEmbedder {
    http: JsonClient,
    base_url: String,
    model: String,
    dim: usize,
    id: String,
}

impl OllamaEmbedder {
    pub fn new(
        http: JsonClient,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dim: usize,
    ) -> Self {
        let model = model.into();
        let id = format!("ollama:{model}");
        Self { http, base_url: base_url.into(), model, dim, id }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest { model: &self.model, input: texts };
        let response: OllamaEmbedResponse = self
            .http
            .post(&join_url(&self.base_url, "api/embed"), None, &request)
            .await
            .map_err(provider_error)?;
        check_vectors(response.embeddings, texts.len(), self.dim)
    }
}

pub struct OpenAiEmbedder {
    http: JsonClient,
    base_url: String,
    api_key: SecretString,
    model: String,
    dim: usize,
    id: String,
}

impl OpenAiEmbedder {
    pub fn new(
        http: JsonClient,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        dim: usize,
    ) -> Self {
        let model = model.into();
        let id = format!("openai:{model}");
        Self { http, base_url: base_url.into(), api_key, model, dim, id }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest { model: &self.model, input: texts };
        let response: OpenAiEmbedResponse = self
            .http
            .post(&join_url(&self.base_url, "embeddings"), Some(&self.api_key), &request)
            .await
            .map_err(provider_error)?;
        check_vectors(response.into_vectors(), texts.len(), self.dim)
    }
}

/// Builds the embedder selected by configuration. `hashing` needs no network.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, RetrievalError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        EmbeddingProvider::Ollama => {
            let http = JsonClient::new(EMBED_TIMEOUT, EMBED_MAX_RETRIES).map_err(provider_error)?;
            let base_url = config.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            Ok(Arc::new(OllamaEmbedder::new(http, base_url, &config.model, config.dimension)))
        }
        EmbeddingProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RetrievalError::Embedding("embedding.api_key is required".to_string())
            })?;
            let http = JsonClient::new(EMBED_TIMEOUT, EMBED_MAX_RETRIES).map_err(provider_error)?;
            let base_url = config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Ok(Arc::new(OpenAiEmbedder::new(
                http,
                base_url,
                api_key,
                &config.model,
                config.dimension,
            )))
        }
    }
}
