//! Question classifiers.
//!
//! Two strategies over the same [`LabelSet`]:
//!
//! - [`LabelClassifier`] sends the full label descriptions and examples as
//!   the system prompt and asks the model to pick labels.
//! - [`ExampleClassifier`] additionally embeds every labeled example into
//!   an in-memory index and augments the user prompt with the query's
//!   nearest labeled neighbors.

use crate::embedding::EmbeddingProvider;
use crate::error::{DendriteError, Result};
use crate::harness::{run_batch, BatchReport};
use crate::labels::LabelSet;
use crate::providers::{parse_json_payload, ChatProvider, ChatRequest};
use crate::types::{cosine_similarity, Vector};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

/// Labels predicted for one query, with optional model reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub correct_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// A classified query: the input paired with its validated prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    pub prediction: Prediction,
}

fn validate_prediction(labels: &LabelSet, prediction: Prediction) -> Result<Prediction> {
    for name in &prediction.correct_labels {
        if !labels.contains(name) {
            return Err(DendriteError::Classification(format!(
                "predicted label '{}' not in {:?}",
                name,
                labels.label_names()
            )));
        }
    }
    Ok(prediction)
}

/// Classifier driven entirely by label descriptions and examples.
pub struct LabelClassifier {
    labels: LabelSet,
    chat: Arc<dyn ChatProvider>,
}

impl LabelClassifier {
    pub fn new(labels: LabelSet, chat: Arc<dyn ChatProvider>) -> Self {
        Self { labels, chat }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Classify one query. Predicted labels are validated against the set.
    pub async fn predict(&self, query: &str) -> Result<Prediction> {
        debug!(query, "classifying");

        let request = ChatRequest::new(self.labels.user_prompt(query))
            .with_system(self.labels.system_prompt())
            .json();

        let raw = self.chat.chat(request).await?;
        let prediction: Prediction = parse_json_payload(&raw)?;
        validate_prediction(&self.labels, prediction)
    }

    /// Classify many queries with bounded concurrency. A query whose
    /// prediction fails (provider error, unparseable reply, unknown label)
    /// is recorded as a failure; the rest complete.
    pub async fn predict_batch(
        &self,
        queries: Vec<String>,
        max_concurrency: usize,
    ) -> Result<BatchReport<LabeledQuery>> {
        let report = run_batch(
            queries,
            |query| async move {
                let prediction = self.predict(&query).await?;
                Ok(vec![LabeledQuery { query, prediction }])
            },
            max_concurrency,
        )
        .await?;

        info!(
            classified = report.succeeded,
            failed = report.failures.len(),
            "batch classification complete"
        );
        Ok(report)
    }
}

/// A labeled example retrieved from the index.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub text: String,
    pub label: String,
    pub distance: f32,
}

struct LabeledExample {
    text: String,
    label: String,
    embedding: Vector,
}

/// Classifier that augments the prompt with nearest labeled examples.
///
/// Call [`ExampleClassifier::fit`] before predicting: it embeds every
/// positive and negative example in the label set into the index.
pub struct ExampleClassifier {
    labels: LabelSet,
    chat: Arc<dyn ChatProvider>,
    embeddings: Arc<dyn EmbeddingProvider>,
    fetch_n_examples: usize,
    index: RwLock<Vec<LabeledExample>>,
}

impl ExampleClassifier {
    pub fn new(
        labels: LabelSet,
        chat: Arc<dyn ChatProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            labels,
            chat,
            embeddings,
            fetch_n_examples: 2,
            index: RwLock::new(Vec::new()),
        }
    }

    pub fn with_fetch_n_examples(mut self, n: usize) -> Self {
        self.fetch_n_examples = n;
        self
    }

    /// Embed every labeled example into the index.
    pub async fn fit(&self) -> Result<()> {
        let mut texts = Vec::new();
        let mut tags = Vec::new();
        for label in &self.labels.labels {
            for example in label
                .examples
                .positive
                .iter()
                .chain(label.examples.negative.iter())
            {
                texts.push(example.clone());
                tags.push(label.name.clone());
            }
        }

        let vectors = self.embeddings.embed_batch(&texts).await?;

        let mut index = self.index.write();
        index.clear();
        for ((text, label), embedding) in texts.into_iter().zip(tags).zip(vectors) {
            index.push(LabeledExample {
                text,
                label,
                embedding,
            });
        }

        info!(examples = index.len(), "example index fitted");
        Ok(())
    }

    /// Retrieve the `n` nearest labeled examples to the query.
    pub async fn nearest(&self, query: &str, n: usize) -> Result<Vec<Neighbor>> {
        if self.index.read().is_empty() {
            return Err(DendriteError::Classification(
                "example index is empty, call fit first".to_string(),
            ));
        }

        let query_embedding = self.embeddings.embed(query).await?;

        let mut neighbors: Vec<Neighbor> = {
            let index = self.index.read();
            index
                .iter()
                .map(|example| Neighbor {
                    text: example.text.clone(),
                    label: example.label.clone(),
                    distance: 1.0 - cosine_similarity(&query_embedding, &example.embedding),
                })
                .collect()
        };

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(n);

        Ok(neighbors)
    }

    /// Render the retrieval-augmented user prompt for one query.
    pub async fn user_prompt(&self, query: &str) -> Result<String> {
        let neighbors = self.nearest(query, self.fetch_n_examples).await?;

        let mut prompt = format!(
            "Classify the following document:\n\n<doc>\n{}\n</doc>\n\n\
             Similar examples:\n<examples>\n",
            query
        );
        for neighbor in &neighbors {
            let _ = write!(
                prompt,
                "<example>\n<distance> {:.2} </distance>\n<label> {} </label>\n\
                 <similar_document> {} </similar_document>\n</example>\n",
                neighbor.distance, neighbor.label, neighbor.text
            );
        }
        prompt.push_str("</examples>\n\nProvide your classification based on the above information.\n");
        Ok(prompt)
    }

    /// Classify one query with example-augmented context.
    pub async fn predict(&self, query: &str) -> Result<Prediction> {
        let user_prompt = self.user_prompt(query).await?;

        let request = ChatRequest::new(user_prompt)
            .with_system(self.labels.system_prompt())
            .json();

        let raw = self.chat.chat(request).await?;
        let prediction: Prediction = parse_json_payload(&raw)?;
        validate_prediction(&self.labels, prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::providers::MockChatProvider;

    fn sample_labels() -> LabelSet {
        LabelSet::from_yaml_str(
            r#"
task: "Classify product questions"
description: "Assign each question a type."
labels:
  - name: comparison
    description: "Comparison to other specific products"
    examples:
      positive: ["Is this more durable than the MX-500?"]
      negative: ["What is this made of?"]
  - name: materials
    description: "Questions about the materials used in the product"
    examples:
      positive: ["What is this made of?"]
      negative: ["When will this be back in stock?"]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_predict_accepts_known_label() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"correct_labels": ["materials"]}"#);

        let classifier = LabelClassifier::new(sample_labels(), chat);
        let prediction = classifier.predict("What is this made of?").await.unwrap();
        assert_eq!(prediction.correct_labels, vec!["materials"]);
        assert!(prediction.reasoning.is_none());
    }

    #[tokio::test]
    async fn test_predict_rejects_unknown_label() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"correct_labels": ["made_up_label"]}"#);

        let classifier = LabelClassifier::new(sample_labels(), chat);
        let result = classifier.predict("What is this made of?").await;
        assert!(matches!(result, Err(DendriteError::Classification(_))));
    }

    #[tokio::test]
    async fn test_predict_keeps_reasoning_when_present() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(
            r#"{"correct_labels": ["comparison"], "reasoning": "mentions another model"}"#,
        );

        let classifier = LabelClassifier::new(sample_labels(), chat);
        let prediction = classifier
            .predict("Is this better than the K-20?")
            .await
            .unwrap();
        assert_eq!(
            prediction.reasoning.as_deref(),
            Some("mentions another model")
        );
    }

    #[tokio::test]
    async fn test_predict_batch_isolates_bad_predictions() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"correct_labels": ["materials"]}"#);
        chat.push_response(r#"{"correct_labels": ["nonsense"]}"#);

        let classifier = LabelClassifier::new(sample_labels(), chat);
        let report = classifier
            .predict_batch(
                vec![
                    "What is this made of?".to_string(),
                    "Is this better than the K-20?".to_string(),
                ],
                1,
            )
            .await
            .unwrap();

        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.records[0].prediction.correct_labels, vec!["materials"]);
    }

    #[tokio::test]
    async fn test_example_classifier_requires_fit() {
        let chat = Arc::new(MockChatProvider::new());
        let embeddings = Arc::new(MockEmbeddingProvider::new(64));
        let classifier = ExampleClassifier::new(sample_labels(), chat, embeddings);

        let result = classifier.nearest("What is this made of?", 2).await;
        assert!(matches!(result, Err(DendriteError::Classification(_))));
    }

    #[tokio::test]
    async fn test_example_classifier_retrieves_exact_example_first() {
        let chat = Arc::new(MockChatProvider::new());
        let embeddings = Arc::new(MockEmbeddingProvider::new(64));
        let classifier = ExampleClassifier::new(sample_labels(), chat, embeddings);

        classifier.fit().await.unwrap();

        let neighbors = classifier.nearest("What is this made of?", 1).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].text, "What is this made of?");
        assert!(neighbors[0].distance < 1e-5);
    }

    #[tokio::test]
    async fn test_example_classifier_prompt_includes_neighbors() {
        let chat = Arc::new(MockChatProvider::new());
        let embeddings = Arc::new(MockEmbeddingProvider::new(64));
        let classifier = ExampleClassifier::new(sample_labels(), chat, embeddings);

        classifier.fit().await.unwrap();

        let prompt = classifier.user_prompt("What is this made of?").await.unwrap();
        assert!(prompt.contains("<doc>\nWhat is this made of?\n</doc>"));
        assert!(prompt.contains("<distance>"));
        assert!(prompt.contains("<label>"));
    }

    #[tokio::test]
    async fn test_example_classifier_predict() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"correct_labels": ["materials"]}"#);
        let embeddings = Arc::new(MockEmbeddingProvider::new(64));
        let classifier = ExampleClassifier::new(sample_labels(), chat, embeddings);

        classifier.fit().await.unwrap();

        let prediction = classifier.predict("What is this made of?").await.unwrap();
        assert_eq!(prediction.correct_labels, vec!["materials"]);
    }
}
