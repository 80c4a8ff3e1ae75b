//! Reranking providers.
//!
//! A reranker reorders a first-stage candidate list with a more expensive
//! relevance model. Results reference candidates by their original index,
//! so callers can map reranked positions back to document ids.

use crate::config::RerankConfig;
use crate::error::{DendriteError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// One reranked candidate: the index into the submitted document list and
/// the model's relevance score.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankedDocument {
    pub index: usize,
    pub relevance_score: f32,
}

/// Trait for reranking providers.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Rerank `documents` against `query`, returning the top `top_n`
    /// entries in descending relevance order.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>>;

    /// Model identifier used for cache keys and logs.
    fn model(&self) -> &str;
}

/// Cohere rerank API provider.
pub struct CohereReranker {
    client: Client,
    config: RerankConfig,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RankedDocument>,
}

impl CohereReranker {
    pub fn new(config: RerankConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DendriteError::Config("Cohere API key not configured".to_string()))?;

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

        info!("Initialized Cohere reranker with model: {}", config.model);

        Ok(Self { client, config })
    }
}

#[async_trait]
impl RerankProvider for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>> {
        debug!(candidates = documents.len(), top_n, "reranking");

        let request = RerankRequest {
            model: &self.config.model,
            query,
            documents,
            top_n,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(DendriteError::Rerank(format!(
                "rerank API error: {}",
                error_text
            )));
        }

        let response: RerankResponse = response.json().await?;

        // An index outside the candidate list cannot be mapped back to an id.
        for ranked in &response.results {
            if ranked.index >= documents.len() {
                return Err(DendriteError::Rerank(format!(
                    "rerank result index {} out of bounds for {} documents",
                    ranked.index,
                    documents.len()
                )));
            }
        }

        Ok(response.results)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Mock reranker for testing: scores by word overlap with the query.
pub struct MockReranker;

impl MockReranker {
    pub fn new() -> Self {
        Self
    }

    fn overlap_score(query: &str, document: &str) -> f32 {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let document = document.to_lowercase();
        let hits = query_words
            .iter()
            .filter(|word| document.contains(word.as_str()))
            .count();

        hits as f32 / query_words.len().max(1) as f32
    }
}

impl Default for MockReranker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RerankProvider for MockReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDocument>> {
        let mut ranked: Vec<RankedDocument> = documents
            .iter()
            .enumerate()
            .map(|(index, document)| RankedDocument {
                index,
                relevance_score: Self::overlap_score(query, document),
            })
            .collect();

        // Stable ordering keeps ties deterministic across runs.
        ranked.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_n);

        Ok(ranked)
    }

    fn model(&self) -> &str {
        "mock-rerank"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_reranker_prefers_overlapping_document() {
        let reranker = MockReranker::new();
        let documents = vec![
            "photosynthesis converts light into glucose".to_string(),
            "the battery lasts two hours per charge".to_string(),
            "rivers provide water and irrigation".to_string(),
        ];

        let ranked = reranker
            .rerank("how long does the battery last", &documents, 2)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].index, 1);
        assert!(ranked[0].relevance_score > ranked[1].relevance_score);
    }

    #[tokio::test]
    async fn test_mock_reranker_is_deterministic() {
        let reranker = MockReranker::new();
        let documents = vec!["alpha beta".to_string(), "beta gamma".to_string()];

        let first = reranker.rerank("beta", &documents, 2).await.unwrap();
        let second = reranker.rerank("beta", &documents, 2).await.unwrap();
        assert_eq!(first, second);
    }
}
