//! Evaluation toolkit for retrieval-augmented question answering.
//!
//! This crate bootstraps and scores RAG pipelines:
//! - Synthetic question/answer generation from text chunks
//! - Question classification (label descriptions, or embeddings +
//!   nearest-neighbor examples)
//! - Tool routing via function-calling, with precision/recall scoring
//! - Reranked retrieval scoring (precision/recall, MRR, recall@k) with
//!   response caching
//!
//! # Architecture
//!
//! Everything remote sits behind a trait — [`providers::ChatProvider`],
//! [`embedding::EmbeddingProvider`], [`rerank::RerankProvider`],
//! [`store::ChunkStore`] — and every batch workflow fans out through the
//! bounded concurrency harness in [`harness`]: at most a configured number
//! of calls in flight, per-item failures isolated into the report, every
//! submitted item accounted for.
//!
//! # Example
//!
//! ```no_run
//! use dendrite::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> dendrite::Result<()> {
//! let config = DendriteConfig::default();
//! let chat = Arc::new(OpenAIChatProvider::new(config.chat)?);
//!
//! let generator = SyntheticGenerator::new(
//!     chat,
//!     2,
//!     vec!["What does the reviewer like about the product?".to_string()],
//! );
//!
//! let chunks = vec![TextChunk::new("chunk1", "The battery lasts two hours per charge.")];
//! let report = generator
//!     .generate_dataset(chunks, config.harness.generation_concurrency)
//!     .await?;
//!
//! println!("{} pairs, {} chunks failed", report.records.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod error;
pub mod harness;
pub mod labels;
pub mod providers;
pub mod rerank;
pub mod routing;
pub mod scoring;
pub mod store;
pub mod synthetic;
pub mod types;

pub use cache::{memoized, ResponseCache};
pub use classify::{ExampleClassifier, LabelClassifier, LabeledQuery, Neighbor, Prediction};
pub use config::{
    CacheConfig, ChatConfig, DendriteConfig, EmbeddingConfig, HarnessConfig, RerankConfig,
};
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, OpenAIEmbeddingProvider};
pub use error::{DendriteError, Result};
pub use harness::{
    run_batch, run_batch_with_deadline, BatchItem, BatchReport, ItemFailure,
};
pub use labels::{Label, LabelExamples, LabelSet};
pub use providers::{ChatProvider, ChatRequest, MockChatProvider, OpenAIChatProvider};
pub use rerank::{CohereReranker, MockReranker, RankedDocument, RerankProvider};
pub use routing::{
    describe_tools, product_tool_catalog, routing_precision_recall, FunctionList, RoutedQuestion,
    RoutingEval, RoutingScore, ToolRouter, ToolSpec,
};
pub use scoring::{
    mean_reciprocal_rank, rank_of_target, recall_at_rank, score_hits, EvalQuestion, QuestionHits,
    RerankedRetrieval, RerankedSearchReport, RerankerReport, RetrievalScore,
};
pub use store::{ChunkStore, InMemoryStore, ScoredChunk};
pub use synthetic::{
    load_dataset, save_dataset, ChunkEval, QuestionAnswer, RelevancyJudge, RelevancyLabel,
    SyntheticGenerator, TextChunk,
};
pub use types::{cosine_similarity, ChunkId, EmbeddingModel, Vector};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::classify::{ExampleClassifier, LabelClassifier, Prediction};
    pub use crate::config::DendriteConfig;
    pub use crate::error::{DendriteError, Result};
    pub use crate::harness::{run_batch, BatchItem, BatchReport};
    pub use crate::labels::LabelSet;
    pub use crate::providers::{ChatProvider, OpenAIChatProvider};
    pub use crate::rerank::RerankProvider;
    pub use crate::routing::{RoutedQuestion, ToolRouter};
    pub use crate::scoring::{EvalQuestion, RerankedRetrieval};
    pub use crate::store::{ChunkStore, InMemoryStore};
    pub use crate::synthetic::{SyntheticGenerator, TextChunk};
}
