//! Synthetic evaluation dataset bootstrap.
//!
//! Generates question/answer pairs from text chunks with a language model,
//! tags every pair with the chunk it came from, and fans the per-chunk
//! calls out through the batch harness. The generated dataset doubles as
//! retrieval ground truth: the originating chunk is the one relevant chunk
//! for each question.

use crate::error::{DendriteError, Result};
use crate::harness::{run_batch, BatchItem, BatchReport};
use crate::providers::{parse_json_payload, ChatProvider, ChatRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A chunk of source text to bootstrap questions from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub content: String,
}

impl TextChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

impl BatchItem for TextChunk {
    fn item_id(&self) -> String {
        self.id.clone()
    }
}

/// One generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// A question/answer pair tagged with its source chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEval {
    pub question: String,
    pub answer: String,
    pub chunk_id: String,
}

#[derive(Deserialize)]
struct GeneratedPairs {
    pairs: Vec<QuestionAnswer>,
}

/// Generates synthetic question/answer pairs per chunk.
pub struct SyntheticGenerator {
    chat: Arc<dyn ChatProvider>,
    n_questions: usize,
    example_questions: Vec<String>,
}

impl SyntheticGenerator {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        n_questions: usize,
        example_questions: Vec<String>,
    ) -> Self {
        Self {
            chat,
            n_questions,
            example_questions,
        }
    }

    fn prompt(&self, chunk: &TextChunk) -> String {
        let mut prompt = format!(
            "Generate `{}` question-answer pairs based on the following content:\n\n\
             <content>\n{}\n</content>\n\n\
             Example questions:\n",
            self.n_questions, chunk.content
        );
        for question in &self.example_questions {
            let _ = writeln!(prompt, "- {}", question);
        }
        prompt.push_str(
            "\nGenerate diverse questions that probe different aspects of the content.\n\
             Provide a concise answer for each question.\n\
             Do not use the exact example questions, but use them as inspiration for the types of questions to generate.\n\
             Do not include answers that are not in the content.\n\n\
             Respond with a JSON object of the form {\"pairs\": [{\"question\": ..., \"answer\": ...}]}.\n",
        );
        prompt
    }

    /// Generate pairs for one chunk, each tagged with the chunk id.
    pub async fn generate(&self, chunk: &TextChunk) -> Result<Vec<ChunkEval>> {
        debug!(chunk = %chunk.id, "generating question-answer pairs");

        let request = ChatRequest::new(self.prompt(chunk)).json();
        let raw = self.chat.chat(request).await?;
        let generated: GeneratedPairs = parse_json_payload(&raw)?;

        Ok(generated
            .pairs
            .into_iter()
            .map(|pair| ChunkEval {
                question: pair.question,
                answer: pair.answer,
                chunk_id: chunk.id.clone(),
            })
            .collect())
    }

    /// Generate a dataset across chunks with bounded concurrency.
    ///
    /// A chunk whose generation fails is recorded in the report and skipped;
    /// the rest of the batch completes.
    pub async fn generate_dataset(
        &self,
        chunks: Vec<TextChunk>,
        max_concurrency: usize,
    ) -> Result<BatchReport<ChunkEval>> {
        let report = run_batch(
            chunks,
            |chunk| async move { self.generate(&chunk).await },
            max_concurrency,
        )
        .await?;

        info!(
            pairs = report.records.len(),
            chunks_failed = report.failures.len(),
            "synthetic dataset generated"
        );
        Ok(report)
    }
}

/// Serialized dataset layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetFile {
    pub generated_at: DateTime<Utc>,
    pub evals: Vec<ChunkEval>,
}

/// Write a dataset as pretty-printed JSON.
pub fn save_dataset(path: impl AsRef<Path>, evals: &[ChunkEval]) -> Result<()> {
    let file = DatasetFile {
        generated_at: Utc::now(),
        evals: evals.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a dataset written by [`save_dataset`].
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<ChunkEval>> {
    let json = std::fs::read_to_string(path)?;
    let file: DatasetFile = serde_json::from_str(&json)?;
    Ok(file.evals)
}

/// Relevance judgment for one chunk against a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevancyLabel {
    pub chunk_id: String,
    pub reasoning: String,
    pub is_relevant: bool,
    pub confidence_score: f32,
}

#[derive(Deserialize)]
struct RelevancyVerdict {
    labels: Vec<RelevancyLabel>,
}

/// LLM judge that labels chunks as relevant or not to a query.
///
/// Used as a quality check on bootstrapped datasets: a generated question
/// whose source chunk is judged irrelevant is a bad training signal.
pub struct RelevancyJudge {
    chat: Arc<dyn ChatProvider>,
}

impl RelevancyJudge {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }

    fn system_prompt() -> &'static str {
        "You are an AI assistant specialized in assessing the relevance of text chunks \
         to specific queries. Your task is to meticulously analyze the content, considering \
         various aspects such as key concepts, direct matches, contextual information, and \
         supporting details. Provide a comprehensive and nuanced reasoning for your relevance \
         determination. Your assessment should be thorough, unbiased, and well-justified."
    }

    fn user_prompt(query: &str, chunks: &[TextChunk]) -> String {
        let mut prompt = format!(
            "Determine if the following chunks are relevant to the query: '{}'\n\n",
            query
        );
        for chunk in chunks {
            let _ = writeln!(
                prompt,
                "<chunk id=\"{}\">\n{}\n</chunk>\n",
                chunk.id, chunk.content
            );
        }
        prompt.push_str(
            "Instructions for reasoning about relevancy:\n\
             1. Identify key concepts and topics in both the query and the chunk.\n\
             2. Look for direct matches or closely related ideas between the query and chunk.\n\
             3. Consider if the chunk provides context, background, or supporting information for the query.\n\
             4. Evaluate if the chunk contains specific details, examples, or explanations that address the query.\n\
             5. Assess whether the information in the chunk is necessary or helpful in answering the query.\n\
             6. Think about the depth and breadth of information provided in relation to the query.\n\
             7. Consider any temporal or causal relationships between the query and the chunk content.\n\
             8. Determine if the chunk introduces new, relevant information or merely repeats what's already known.\n\
             9. Be very careful with logic and reasoning.\n\n\
             For each chunk, decide if it is relevant or not, provide a detailed explanation, \
             and a confidence score between 0 and 1. Respond with a JSON object of the form \
             {\"labels\": [{\"chunk_id\": ..., \"reasoning\": ..., \"is_relevant\": ..., \"confidence_score\": ...}]}.\n",
        );
        prompt
    }

    /// Judge each chunk's relevance to the query.
    pub async fn judge(&self, query: &str, chunks: &[TextChunk]) -> Result<Vec<RelevancyLabel>> {
        let request = ChatRequest::new(Self::user_prompt(query, chunks))
            .with_system(Self::system_prompt())
            .json();

        let raw = self.chat.chat(request).await?;
        let verdict: RelevancyVerdict = parse_json_payload(&raw)?;

        for label in &verdict.labels {
            if !(0.0..=1.0).contains(&label.confidence_score) {
                return Err(DendriteError::Generation(format!(
                    "confidence score {} for chunk {} outside [0, 1]",
                    label.confidence_score, label.chunk_id
                )));
            }
        }

        Ok(verdict.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockChatProvider;

    fn sample_chunks() -> Vec<TextChunk> {
        vec![
            TextChunk::new("chunk1", "It is lightweight and the battery lasts longer than other brands."),
            TextChunk::new("chunk2", "It goes through plastics and wood like butter."),
        ]
    }

    #[test]
    fn test_prompt_mentions_count_and_examples() {
        let chat = Arc::new(MockChatProvider::new());
        let generator = SyntheticGenerator::new(
            chat,
            2,
            vec!["What does the reviewer like about the product?".to_string()],
        );

        let prompt = generator.prompt(&sample_chunks()[0]);
        assert!(prompt.contains("`2` question-answer pairs"));
        assert!(prompt.contains("- What does the reviewer like about the product?"));
        assert!(prompt.contains("<content>"));
    }

    #[tokio::test]
    async fn test_generate_tags_pairs_with_chunk_id() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(
            r#"{"pairs": [
                {"question": "How long does the battery last?", "answer": "Longer than other brands."},
                {"question": "Is it heavy?", "answer": "No, it is lightweight."}
            ]}"#,
        );

        let generator = SyntheticGenerator::new(chat, 2, vec![]);
        let evals = generator.generate(&sample_chunks()[0]).await.unwrap();

        assert_eq!(evals.len(), 2);
        assert!(evals.iter().all(|e| e.chunk_id == "chunk1"));
    }

    #[tokio::test]
    async fn test_generate_dataset_isolates_chunk_failures() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"pairs": [{"question": "q1", "answer": "a1"}]}"#);
        chat.push_error("rate limited");

        let generator = SyntheticGenerator::new(chat, 1, vec![]);
        let report = generator
            .generate_dataset(sample_chunks(), 1)
            .await
            .unwrap();

        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_a_generation_failure_not_a_panic() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response("this is not json");

        let generator = SyntheticGenerator::new(chat, 1, vec![]);
        let result = generator.generate(&sample_chunks()[0]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relevancy_judge_validates_confidence_range() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(
            r#"{"labels": [{"chunk_id": "chunk1", "reasoning": "direct match", "is_relevant": true, "confidence_score": 1.7}]}"#,
        );

        let judge = RelevancyJudge::new(chat);
        let result = judge.judge("battery life", &sample_chunks()).await;
        assert!(matches!(result, Err(DendriteError::Generation(_))));
    }

    #[tokio::test]
    async fn test_relevancy_judge_parses_labels() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(
            r#"{"labels": [
                {"chunk_id": "chunk1", "reasoning": "mentions battery", "is_relevant": true, "confidence_score": 0.9},
                {"chunk_id": "chunk2", "reasoning": "about cutting", "is_relevant": false, "confidence_score": 0.8}
            ]}"#,
        );

        let judge = RelevancyJudge::new(chat);
        let labels = judge.judge("battery life", &sample_chunks()).await.unwrap();

        assert_eq!(labels.len(), 2);
        assert!(labels[0].is_relevant);
        assert!(!labels[1].is_relevant);
    }
}
