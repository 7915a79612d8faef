//! Model service drivers for embedding and generation.
//!
//! Both traits are object-safe so the engine can swap real drivers for
//! canned ones in tests. `OllamaDriver` speaks the Ollama-style HTTP API
//! (`/api/embeddings`, `/api/generate`) and implements both traits, since
//! one host typically serves both models.

use async_trait::async_trait;
use magpie_types::config::ModelConfig;
use magpie_types::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Computes text embeddings.
#[async_trait]
pub trait EmbeddingDriver: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>>;

    /// Dimensionality of produced vectors.
    fn dimensions(&self) -> usize;
}

/// Produces free-form completions.
#[async_trait]
pub trait GenerationDriver: Send + Sync {
    /// Complete one prompt, non-streaming.
    async fn generate(&self, prompt: &str) -> ServiceResult<String>;
}

/// Driver for an Ollama-style model host.
pub struct OllamaDriver {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
    embed_model: String,
    generate_model: String,
    dims: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaDriver {
    /// Build a driver from model config. Fails only if the HTTP client
    /// cannot be constructed.
    pub fn new(config: &ModelConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embed_model: config.embed_model.clone(),
            generate_model: config.generate_model.clone(),
            dims: config.vector_dimensions,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(format!("{}{}", self.host, path));
        if let Some(ref key) = self.api_key {
            req = req.header("X-Api-Key", key);
        }
        req
    }

    async fn check(resp: reqwest::Response) -> ServiceResult<reqwest::Response> {
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let message = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Api { status, message });
        }
        Ok(resp)
    }
}

#[async_trait]
impl EmbeddingDriver for OllamaDriver {
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        let body = EmbedRequest {
            model: &self.embed_model,
            prompt: text,
        };

        let resp = self
            .post("/api/embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Http(e.to_string()))?;
        let resp = Self::check(resp).await?;

        let data: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;
        if data.embedding.is_empty() {
            return Err(ServiceError::Parse("empty embedding response".to_string()));
        }

        debug!(dims = data.embedding.len(), "Embedded text");
        Ok(data.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl GenerationDriver for OllamaDriver {
    async fn generate(&self, prompt: &str) -> ServiceResult<String> {
        let body = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: false,
        };

        let resp = self
            .post("/api/generate")
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Http(e.to_string()))?;
        let resp = Self::check(resp).await?;

        let data: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        debug!(chars = data.response.len(), "Generated completion");
        Ok(data.response)
    }
}
