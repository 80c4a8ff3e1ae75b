//! Chunk stores: the first-stage retrieval collaborator.
//!
//! Scoring workflows only need "give me the `limit` most similar chunks to
//! this query" — the store behind that call is opaque. [`InMemoryStore`]
//! is an embedding-backed brute-force implementation, which is the right
//! scale for evaluation corpora of a few thousand chunks.

use crate::embedding::EmbeddingProvider;
use crate::error::{DendriteError, Result};
use crate::types::{cosine_similarity, Vector};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Trait for first-stage chunk retrieval.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Return up to `limit` chunks most similar to `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>>;
}

struct StoredEntry {
    id: String,
    text: String,
    embedding: Vector,
}

/// In-memory vector store over an embedding provider.
pub struct InMemoryStore {
    provider: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert a chunk, replacing any existing entry with the same id.
    pub async fn upsert(&self, id: impl Into<String>, text: impl Into<String>) -> Result<()> {
        let id = id.into();
        let text = text.into();
        let embedding = self.provider.embed(&text).await?;

        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|e| e.id == id) {
            existing.text = text;
            existing.embedding = embedding;
        } else {
            entries.push(StoredEntry {
                id,
                text,
                embedding,
            });
        }
        Ok(())
    }

    /// Insert many (id, text) pairs with one batched embedding call.
    pub async fn upsert_batch(&self, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = pairs.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = self.provider.embed_batch(&texts).await?;

        let mut entries = self.entries.write();
        for ((id, text), embedding) in pairs.iter().zip(embeddings) {
            if let Some(existing) = entries.iter_mut().find(|e| &e.id == id) {
                existing.text = text.clone();
                existing.embedding = embedding;
            } else {
                entries.push(StoredEntry {
                    id: id.clone(),
                    text: text.clone(),
                    embedding,
                });
            }
        }

        debug!(chunks = entries.len(), "store populated");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() {
            return Err(DendriteError::Retrieval(
                "store is empty, upsert chunks before searching".to_string(),
            ));
        }

        let query_embedding = self.provider.embed(query).await?;

        let mut scored: Vec<ScoredChunk> = {
            let entries = self.entries.read();
            entries
                .iter()
                .map(|entry| ScoredChunk {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    score: cosine_similarity(&query_embedding, &entry.embedding),
                })
                .collect()
        };

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;

    fn test_store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(MockEmbeddingProvider::new(64)))
    }

    #[tokio::test]
    async fn test_search_finds_exact_text_first() {
        let store = test_store();
        store.upsert("1", "the saw cuts through plastics and wood").await.unwrap();
        store.upsert("2", "battery lasts two hours per charge").await.unwrap();
        store.upsert("3", "very durable after three years of use").await.unwrap();

        let results = store
            .search("battery lasts two hours per charge", 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "2", "identical text wins the cosine scan");
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_id() {
        let store = test_store();
        store.upsert("1", "original text").await.unwrap();
        store.upsert("1", "replacement text").await.unwrap();

        assert_eq!(store.len(), 1);
        let results = store.search("replacement text", 1).await.unwrap();
        assert_eq!(results[0].text, "replacement text");
    }

    #[tokio::test]
    async fn test_search_empty_store_is_an_error() {
        let store = test_store();
        let result = store.search("anything", 5).await;
        assert!(matches!(result, Err(DendriteError::Retrieval(_))));
    }

    #[tokio::test]
    async fn test_upsert_batch() {
        let store = test_store();
        let pairs = vec![
            ("a".to_string(), "first chunk".to_string()),
            ("b".to_string(), "second chunk".to_string()),
        ];
        store.upsert_batch(&pairs).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
