//! Reranked retrieval scoring.
//!
//! Each evaluation question carries the id of the chunk it was generated
//! from, which is treated as the single relevant chunk for that question.
//! A scored request retrieves a wide first stage, reranks it, and records
//! a hit list: position i is true when the i-th reranked result is the
//! question's source chunk.

use crate::cache::{memoized, ResponseCache};
use crate::error::{DendriteError, Result};
use crate::harness::{run_batch, BatchItem, BatchReport, ItemFailure};
use crate::rerank::RerankProvider;
use crate::store::ChunkStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// An evaluation question with its retrieval ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub answer: String,
    pub chunk_id: String,
    /// The query actually sent to retrieval (question plus any product or
    /// conversation context).
    pub question_with_context: String,
}

impl BatchItem for EvalQuestion {
    fn item_id(&self) -> String {
        self.question_with_context.clone()
    }
}

/// Hit list for one scored question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionHits {
    pub chunk_id: String,
    pub hits: Vec<bool>,
}

/// Precision/recall over a batch of hit lists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalScore {
    pub precision: f64,
    pub recall: f64,
}

/// Score a batch of hit lists.
///
/// Precision divides true positives by the total number of retrievals.
/// Recall divides true positives by the number of requests — not by the
/// number of relevant chunks that exist — because every question here has
/// exactly one relevant chunk. See the tests before reusing this on data
/// where that assumption does not hold.
pub fn score_hits(hits: &[Vec<bool>]) -> RetrievalScore {
    let n_retrieval_requests = hits.len();
    let total_retrievals: usize = hits.iter().map(|h| h.len()).sum();
    let true_positives: usize = hits
        .iter()
        .map(|h| h.iter().filter(|&&hit| hit).count())
        .sum();

    let precision = if total_retrievals > 0 {
        true_positives as f64 / total_retrievals as f64
    } else {
        0.0
    };
    let recall = if n_retrieval_requests > 0 {
        true_positives as f64 / n_retrieval_requests as f64
    } else {
        0.0
    };

    RetrievalScore { precision, recall }
}

/// 1-based rank of the first hit, or `None` if the target never appears.
pub fn rank_of_target(hits: &[bool]) -> Option<usize> {
    hits.iter().position(|&hit| hit).map(|i| i + 1)
}

/// Mean reciprocal rank; a missing target contributes 0.
pub fn mean_reciprocal_rank(ranks: &[Option<usize>]) -> f64 {
    if ranks.is_empty() {
        return 0.0;
    }

    let total: f64 = ranks
        .iter()
        .map(|rank| rank.map_or(0.0, |r| 1.0 / r as f64))
        .sum();
    total / ranks.len() as f64
}

/// Fraction of questions whose target ranked at or above `k`.
pub fn recall_at_rank(ranks: &[Option<usize>], k: usize) -> f64 {
    if ranks.is_empty() {
        return 0.0;
    }

    let hits = ranks.iter().filter(|rank| matches!(rank, Some(r) if *r <= k)).count();
    hits as f64 / ranks.len() as f64
}

/// Per-k scores for a reranked search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedSearchReport {
    pub by_k: BTreeMap<usize, RetrievalScore>,
    /// Questions that produced a hit list.
    pub evaluated: usize,
    /// Questions whose request failed; excluded from the scores above.
    pub failures: Vec<ItemFailure>,
}

/// Rank-based comparison report for one reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerReport {
    /// 1-based rank of the target chunk per question, submission order.
    pub ranks: Vec<Option<usize>>,
    pub recall_at_5: f64,
    pub recall_at_10: f64,
    pub mrr: f64,
}

/// Two-stage retrieval: wide first-stage search, then rerank.
pub struct RerankedRetrieval {
    store: Arc<dyn ChunkStore>,
    reranker: Arc<dyn RerankProvider>,
    cache: Option<ResponseCache<Vec<bool>>>,
    first_stage_depth: usize,
}

impl RerankedRetrieval {
    pub fn new(store: Arc<dyn ChunkStore>, reranker: Arc<dyn RerankProvider>) -> Self {
        Self {
            store,
            reranker,
            cache: None,
            first_stage_depth: 40,
        }
    }

    /// Cache hit lists across runs, keyed by (query, k, model).
    pub fn with_cache(mut self, cache: ResponseCache<Vec<bool>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// How many first-stage candidates to feed the reranker.
    pub fn with_first_stage_depth(mut self, depth: usize) -> Self {
        self.first_stage_depth = depth;
        self
    }

    /// Deterministic cache key for one scored request.
    ///
    /// Question marks are stripped so the key stays filesystem- and
    /// URL-safe when exported.
    pub fn cache_key(query: &str, k: usize, model: &str) -> String {
        format!("{}_{}_{}", query, k, model).replace('?', "")
    }

    /// Run one reranked request and return the hit list, truncated to
    /// `max_k` reranked results.
    pub async fn run_request(&self, question: &EvalQuestion, max_k: usize) -> Result<Vec<bool>> {
        let fetch = || async {
            let candidates = self
                .store
                .search(&question.question_with_context, self.first_stage_depth)
                .await?;

            let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

            let reranked = self
                .reranker
                .rerank(&question.question_with_context, &texts, max_k)
                .await?;

            let mut hits = Vec::with_capacity(reranked.len());
            for ranked in &reranked {
                let candidate = candidates.get(ranked.index).ok_or_else(|| {
                    DendriteError::Rerank(format!(
                        "rerank result index {} out of bounds for {} candidates",
                        ranked.index,
                        candidates.len()
                    ))
                })?;
                hits.push(candidate.id == question.chunk_id);
            }

            debug!(
                question = %question.question,
                candidates = candidates.len(),
                hit = hits.iter().any(|&h| h),
                "reranked request complete"
            );
            Ok(hits)
        };

        match &self.cache {
            Some(cache) => {
                let key = Self::cache_key(
                    &question.question_with_context,
                    max_k,
                    self.reranker.model(),
                );
                let hits = memoized(cache, key, fetch).await?;
                Ok((*hits).clone())
            }
            None => fetch().await,
        }
    }

    /// Score reranked search at several cutoffs.
    ///
    /// Runs one request per question at the largest cutoff, then truncates
    /// each hit list for the smaller ones.
    pub async fn score_search(
        &self,
        questions: Vec<EvalQuestion>,
        k_values: &[usize],
        max_concurrency: usize,
    ) -> Result<RerankedSearchReport> {
        let max_k = k_values
            .iter()
            .copied()
            .max()
            .ok_or_else(|| DendriteError::Config("k_values must not be empty".to_string()))?;

        let report: BatchReport<QuestionHits> = run_batch(
            questions,
            |question| async move {
                let hits = self.run_request(&question, max_k).await?;
                Ok(vec![QuestionHits {
                    chunk_id: question.chunk_id,
                    hits,
                }])
            },
            max_concurrency,
        )
        .await?;

        let mut by_k = BTreeMap::new();
        for &k in k_values {
            let truncated: Vec<Vec<bool>> = report
                .records
                .iter()
                .map(|r| r.hits.iter().take(k).copied().collect())
                .collect();
            by_k.insert(k, score_hits(&truncated));
        }

        info!(
            evaluated = report.succeeded,
            failed = report.failures.len(),
            "reranked search scored"
        );

        Ok(RerankedSearchReport {
            by_k,
            evaluated: report.succeeded,
            failures: report.failures,
        })
    }

    /// Rank the target chunk across the full reranked candidate list for
    /// every question and summarize with MRR and recall@5/10.
    pub async fn evaluate_reranker(
        &self,
        questions: Vec<EvalQuestion>,
        max_concurrency: usize,
    ) -> Result<RerankerReport> {
        let depth = self.first_stage_depth;

        let report: BatchReport<QuestionHits> = run_batch(
            questions,
            |question| async move {
                let hits = self.run_request(&question, depth).await?;
                Ok(vec![QuestionHits {
                    chunk_id: question.chunk_id,
                    hits,
                }])
            },
            max_concurrency,
        )
        .await?;

        let ranks: Vec<Option<usize>> = report
            .records
            .iter()
            .map(|r| rank_of_target(&r.hits))
            .collect();

        Ok(RerankerReport {
            recall_at_5: recall_at_rank(&ranks, 5),
            recall_at_10: recall_at_rank(&ranks, 10),
            mrr: mean_reciprocal_rank(&ranks),
            ranks,
        })
    }
}
