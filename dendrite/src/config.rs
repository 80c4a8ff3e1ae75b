//! Configuration for the evaluation toolkit.

use serde::{Deserialize, Serialize};

/// Main configuration, one section per collaborating service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DendriteConfig {
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub rerank: RerankConfig,
    pub cache: CacheConfig,
    pub harness: HarnessConfig,
}

/// Chat completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// API key (can be set via OPENAI_API_KEY env var)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API endpoint
    pub endpoint: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "gpt-4o".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            temperature: 0.0,
            timeout_seconds: 30,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API key (can be set via OPENAI_API_KEY env var)
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// API endpoint
    pub endpoint: String,

    /// Dimension override
    pub dimension: Option<usize>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "text-embedding-3-small".to_string(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            dimension: None,
            timeout_seconds: 30,
        }
    }
}

/// Reranking provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// API key (can be set via COHERE_API_KEY env var)
    pub api_key: Option<String>,

    /// Rerank model name
    pub model: String,

    /// API endpoint
    pub endpoint: String,

    /// How many first-stage candidates to feed the reranker
    pub first_stage_depth: usize,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("COHERE_API_KEY").ok(),
            model: "rerank-english-v3.0".to_string(),
            endpoint: "https://api.cohere.com/v1/rerank".to_string(),
            first_stage_depth: 40,
            timeout_seconds: 30,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the rerank response cache
    pub enable_response_cache: bool,

    /// Response cache size (number of entries)
    pub response_cache_size: u64,

    /// Response cache TTL in seconds
    pub response_cache_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_response_cache: true,
            response_cache_size: 10_000,
            response_cache_ttl_seconds: 3600, // 1 hour
        }
    }
}

/// Concurrency ceilings for batch evaluation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Ceiling for synthetic dataset generation calls
    pub generation_concurrency: usize,

    /// Ceiling for classification calls
    pub classification_concurrency: usize,

    /// Ceiling for tool routing calls
    pub routing_concurrency: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            generation_concurrency: 10,
            classification_concurrency: 10,
            routing_concurrency: 40,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DendriteConfig::default();
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.rerank.first_stage_depth, 40);
        assert_eq!(config.harness.generation_concurrency, 10);
        assert_eq!(config.harness.routing_concurrency, 40);
    }

    #[test]
    fn test_serialization() {
        let config = DendriteConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let deserialized: DendriteConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config.chat.model, deserialized.chat.model);
        assert_eq!(config.rerank.model, deserialized.rerank.model);
    }
}
