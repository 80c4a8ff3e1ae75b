//! Embedding providers for generating vector embeddings.

use crate::config::EmbeddingConfig;
use crate::error::{DendriteError, Result};
use crate::types::{normalize, EmbeddingModel, Vector};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Generate embeddings for multiple texts (batched).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the embedding model information.
    fn model(&self) -> &EmbeddingModel;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize {
        self.model().dimension
    }
}

/// OpenAI embedding provider.
pub struct OpenAIEmbeddingProvider {
    client: Client,
    config: EmbeddingConfig,
    model: EmbeddingModel,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedRow>,
}

#[derive(Deserialize)]
struct EmbedRow {
    embedding: Vec<f32>,
}

impl OpenAIEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DendriteError::Config("OpenAI API key not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    "Authorization",
                    format!("Bearer {}", api_key)
                        .parse()
                        .map_err(|_| DendriteError::Config("invalid API key".to_string()))?,
                );
                headers
            })
            .build()?;

        let dimension = config.dimension.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        });

        let model = EmbeddingModel::new("openai", &config.model, dimension);

        info!("Initialized OpenAI embedding provider with model: {}", config.model);

        Ok(Self {
            client,
            config,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| DendriteError::Provider("embedding API returned no rows".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        debug!("Generating {} embeddings", texts.len());

        let request = EmbedRequest {
            input: texts,
            model: &self.config.model,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(DendriteError::Provider(format!(
                "embedding API error: {}",
                error_text
            )));
        }

        let response: EmbedResponse = response.json().await?;

        let embeddings: Vec<Vector> = response.data.into_iter().map(|row| row.embedding).collect();

        if embeddings.len() != texts.len() {
            return Err(DendriteError::Provider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}

/// Mock provider for testing: deterministic hash-derived vectors.
pub struct MockEmbeddingProvider {
    model: EmbeddingModel,
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: EmbeddingModel::new("mock", "mock-embed", dimension),
            dimension,
        }
    }

    fn generate_embedding(&self, text: &str) -> Vector {
        let hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

        let mut embedding = vec![0.0; self.dimension];
        for (i, val) in embedding.iter_mut().enumerate() {
            let seed = hash.wrapping_add(i as u64);
            *val = ((seed % 1000) as f32 / 1000.0) - 0.5;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(self.generate_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.generate_embedding(t)).collect())
    }

    fn model(&self) -> &EmbeddingModel {
        &self.model
    }
}
