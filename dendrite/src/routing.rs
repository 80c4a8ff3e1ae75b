//! Tool routing and router evaluation.
//!
//! A router maps a user question to the names of the tools needed to
//! answer it. Evaluation pairs each question's expected tool set with the
//! router's prediction and scores the whole run with micro-averaged
//! precision and recall over the tool-name sets.

use crate::error::Result;
use crate::harness::{run_batch, BatchItem, BatchReport};
use crate::providers::{parse_json_payload, ChatProvider, ChatRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

/// A callable tool: name plus the description the router sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// The product-support tool catalog used by the routing evaluations.
pub fn product_tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("ShippingDateRequest", "Check when a product will be shipped"),
        ToolSpec::new("ShippingCostRequest", "Check the cost of shipping a product"),
        ToolSpec::new("ProductDimensionsRequest", "Check the dimensions of a product"),
        ToolSpec::new(
            "PriceHistoryRequest",
            "Check the price history of a product (e.g. identifying historical price fluctuations)",
        ),
        ToolSpec::new("ProductComparisonRequest", "Compare two products"),
        ToolSpec::new(
            "LogDesiredFeatureRequest",
            "Record a user's desire for a certain product feature",
        ),
        ToolSpec::new(
            "ExtractDataFromImageRequest",
            "Use our product images with multimodal llm to extract info about the product",
        ),
        ToolSpec::new(
            "ProductMaterialsRequest",
            "Check what materials a product is made of",
        ),
    ]
}

/// Render one "Name: description" line per tool.
pub fn describe_tools(tools: &[ToolSpec]) -> String {
    let mut description = String::new();
    for tool in tools {
        let _ = writeln!(description, "{}: {}", tool.name, tool.description);
    }
    description
}

/// Names of the functions a question requires (or the router predicted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionList {
    pub func_names: Vec<String>,
}

impl FunctionList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            func_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            func_names: Vec::new(),
        }
    }
}

/// A question annotated with the tools it should route to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedQuestion {
    pub question: String,
    pub required_tools: FunctionList,
}

impl BatchItem for RoutedQuestion {
    fn item_id(&self) -> String {
        self.question.clone()
    }
}

/// Expected vs. predicted tools for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEval {
    pub question: String,
    pub expected: FunctionList,
    pub predicted: FunctionList,
}

/// Routes questions to tools via function-calling.
pub struct ToolRouter {
    chat: Arc<dyn ChatProvider>,
    tools: Vec<ToolSpec>,
}

impl ToolRouter {
    pub fn new(chat: Arc<dyn ChatProvider>, tools: Vec<ToolSpec>) -> Self {
        Self { chat, tools }
    }

    fn system_prompt(&self) -> String {
        format!(
            "Identify the tools that will help you answer the user's question.\n\
             Respond with the names of 0, 1 or 2 tools to use. The available tools are\n\
             {}\n\
             Don't make unnecessary function calls.\n\n\
             Respond with a JSON object of the form {{\"func_names\": [...]}}.",
            describe_tools(&self.tools)
        )
    }

    /// Route one question to the tools that should answer it.
    pub async fn route(&self, question: &str) -> Result<FunctionList> {
        debug!(question, "routing");

        let request = ChatRequest::new(question)
            .with_system(self.system_prompt())
            .with_temperature(0.0)
            .json();

        let raw = self.chat.chat(request).await?;
        parse_json_payload(&raw)
    }

    /// Route every question with bounded concurrency, pairing each
    /// prediction with its expected tool set.
    ///
    /// Questions whose routing call fails are recorded in the report and
    /// excluded from scoring — the caller decides whether that failure
    /// rate invalidates the run.
    pub async fn evaluate(
        &self,
        questions: Vec<RoutedQuestion>,
        max_concurrency: usize,
    ) -> Result<BatchReport<RoutingEval>> {
        let report = run_batch(
            questions,
            |question| async move {
                let predicted = self.route(&question.question).await?;
                Ok(vec![RoutingEval {
                    question: question.question,
                    expected: question.required_tools,
                    predicted,
                }])
            },
            max_concurrency,
        )
        .await?;

        info!(
            routed = report.succeeded,
            failed = report.failures.len(),
            "routing evaluation complete"
        );
        Ok(report)
    }
}

/// Micro-averaged routing quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingScore {
    pub precision: f64,
    pub recall: f64,
}

/// Score routing evaluations by set intersection of expected vs. predicted
/// tool names, summed across all questions.
pub fn routing_precision_recall(evals: &[RoutingEval]) -> RoutingScore {
    let mut true_positives = 0usize;
    let mut false_positives = 0usize;
    let mut false_negatives = 0usize;

    for eval in evals {
        let expected: HashSet<&str> = eval.expected.func_names.iter().map(String::as_str).collect();
        let predicted: HashSet<&str> =
            eval.predicted.func_names.iter().map(String::as_str).collect();

        true_positives += expected.intersection(&predicted).count();
        false_positives += predicted.difference(&expected).count();
        false_negatives += expected.difference(&predicted).count();
    }

    let precision = if true_positives + false_positives > 0 {
        true_positives as f64 / (true_positives + false_positives) as f64
    } else {
        0.0
    };
    let recall = if true_positives + false_negatives > 0 {
        true_positives as f64 / (true_positives + false_negatives) as f64
    } else {
        0.0
    };

    RoutingScore { precision, recall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockChatProvider;
    use approx::assert_relative_eq;

    fn eval(expected: &[&str], predicted: &[&str]) -> RoutingEval {
        RoutingEval {
            question: "q".to_string(),
            expected: FunctionList::new(expected.iter().copied()),
            predicted: FunctionList::new(predicted.iter().copied()),
        }
    }

    #[test]
    fn test_describe_tools_one_line_per_tool() {
        let description = describe_tools(&product_tool_catalog());
        assert_eq!(description.lines().count(), 8);
        assert!(description.contains("ShippingDateRequest: Check when a product will be shipped"));
    }

    #[test]
    fn test_perfect_routing_scores_one() {
        let evals = vec![
            eval(&["ShippingDateRequest"], &["ShippingDateRequest"]),
            eval(&[], &[]),
        ];
        let score = routing_precision_recall(&evals);
        assert_relative_eq!(score.precision, 1.0);
        assert_relative_eq!(score.recall, 1.0);
    }

    #[test]
    fn test_mixed_routing_arithmetic() {
        // TP = 2, FP = 1, FN = 1
        let evals = vec![
            eval(
                &["ShippingDateRequest", "ShippingCostRequest"],
                &["ShippingDateRequest", "ProductComparisonRequest"],
            ),
            eval(&["PriceHistoryRequest"], &["PriceHistoryRequest"]),
            eval(&["ProductMaterialsRequest"], &[]),
        ];
        let score = routing_precision_recall(&evals);
        assert_relative_eq!(score.precision, 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(score.recall, 2.0 / 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_evals_score_zero() {
        let score = routing_precision_recall(&[]);
        assert_relative_eq!(score.precision, 0.0);
        assert_relative_eq!(score.recall, 0.0);
    }

    #[tokio::test]
    async fn test_route_parses_function_list() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"func_names": ["ShippingDateRequest"]}"#);

        let router = ToolRouter::new(chat, product_tool_catalog());
        let predicted = router.route("When will my saw ship?").await.unwrap();
        assert_eq!(predicted.func_names, vec!["ShippingDateRequest"]);
    }

    #[tokio::test]
    async fn test_evaluate_drops_failed_routes_from_records() {
        let chat = Arc::new(MockChatProvider::new());
        chat.push_response(r#"{"func_names": ["ShippingDateRequest"]}"#);
        chat.push_error("connection reset");

        let router = ToolRouter::new(chat, product_tool_catalog());
        let questions = vec![
            RoutedQuestion {
                question: "When will my saw ship?".to_string(),
                required_tools: FunctionList::new(["ShippingDateRequest"]),
            },
            RoutedQuestion {
                question: "What is it made of?".to_string(),
                required_tools: FunctionList::new(["ProductMaterialsRequest"]),
            },
        ];

        let report = router.evaluate(questions, 1).await.unwrap();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.failures.len(), 1);

        let score = routing_precision_recall(&report.records);
        assert_relative_eq!(score.precision, 1.0);
        assert_relative_eq!(score.recall, 1.0);
    }
}
