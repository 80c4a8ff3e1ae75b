//! YAML-configured label definitions for question classification.
//!
//! A label set declares the classification task, the labels, and positive/
//! negative example queries per label. The whole set renders into a system
//! prompt; predicted labels are validated against it.

use crate::error::{DendriteError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

static SNAKE_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("static pattern"));

/// Positive and negative example queries for one label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelExamples {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// One classification label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub description: String,
    pub examples: LabelExamples,
}

/// A classification task loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSet {
    pub task: String,
    pub description: String,
    pub labels: Vec<Label>,
    /// Cap on examples rendered per label in the prompt.
    #[serde(default = "default_n_examples")]
    pub n_examples: usize,
}

fn default_n_examples() -> usize {
    100
}

impl LabelSet {
    /// Parse and validate a label set from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let set: Self = serde_yaml::from_str(yaml)?;
        set.validate()?;
        Ok(set)
    }

    /// Load a label set from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(DendriteError::Label(
                "label set must declare at least one label".to_string(),
            ));
        }

        for label in &self.labels {
            if !SNAKE_CASE.is_match(&label.name) {
                return Err(DendriteError::Label(format!(
                    "label name '{}' must be snake_case",
                    label.name
                )));
            }
        }

        let mut names: Vec<&str> = self.labels.iter().map(|l| l.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.labels.len() {
            return Err(DendriteError::Label("duplicate label names".to_string()));
        }

        Ok(())
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    /// Render the classification system prompt.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!(
            "<task>\n{}\n</task>\n\n<description>\n{}\n</description>\n\n<labels>\n",
            self.task, self.description
        );

        for label in &self.labels {
            let _ = write!(
                prompt,
                "<label>\n<name>\n{}\n</name>\n\n<description>\n{}\n</description>\n\n<examples>\n",
                label.name, label.description
            );

            prompt.push_str("<positive>\n");
            for example in label.examples.positive.iter().take(self.n_examples) {
                let _ = writeln!(prompt, "<example>\n{}\n</example>", example);
            }
            prompt.push_str("</positive>\n\n<negative>\n");
            for example in label.examples.negative.iter().take(self.n_examples) {
                let _ = writeln!(prompt, "<example>\n{}\n</example>", example);
            }
            prompt.push_str("</negative>\n</examples>\n</label>\n\n");
        }

        prompt.push_str(
            "</labels>\n\n\
             Instructions:\n\
             1. Carefully read the user's query.\n\
             2. Compare the query to the descriptions and examples for each label.\n\
             3. Use the provided examples as a guide:\n\
                - Positive examples show queries that should be classified under that label.\n\
                - Negative examples show queries that should not be classified under that label.\n\
             4. Consider both the content and the intent of the query when matching to a label.\n\
             5. Choose the most appropriate label that matches the query's intent and content.\n\
             6. If the query doesn't clearly fit any label, choose the closest match based on \
             similarity to the examples and description.\n\
             7. Provide your classification as label names from the list above.\n\
             8. Do not assume any specific task unless it's explicitly mentioned in the 'task' variable.\n",
        );
        prompt
    }

    /// Render the user prompt for one query.
    pub fn user_prompt(&self, query: &str) -> String {
        format!("Correctly classify:\n\n{}", query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
task: "Classify product questions"
description: "Assign each incoming product question to a question type."
labels:
  - name: comparison
    description: "Comparison to other specific products in the same category"
    examples:
      positive:
        - "Is this more durable than the MX-500?"
      negative:
        - "Were most people happy with this product overall?"
  - name: time_sensitive
    description: "A question whose answer depends on when it is asked"
    examples:
      positive:
        - "When will this be back in stock?"
      negative:
        - "What is this made of?"
"#;

    #[test]
    fn test_load_from_yaml() {
        let set = LabelSet::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(set.labels.len(), 2);
        assert_eq!(set.label_names(), vec!["comparison", "time_sensitive"]);
        assert_eq!(set.n_examples, 100);
        assert!(set.contains("comparison"));
        assert!(!set.contains("visual"));
    }

    #[test]
    fn test_rejects_non_snake_case_names() {
        let yaml = SAMPLE_YAML.replace("time_sensitive", "TimeSensitive");
        let result = LabelSet::from_yaml_str(&yaml);
        assert!(matches!(result, Err(DendriteError::Label(_))));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let yaml = SAMPLE_YAML.replace("time_sensitive", "comparison");
        let result = LabelSet::from_yaml_str(&yaml);
        assert!(matches!(result, Err(DendriteError::Label(_))));
    }

    #[test]
    fn test_system_prompt_contains_labels_and_examples() {
        let set = LabelSet::from_yaml_str(SAMPLE_YAML).unwrap();
        let prompt = set.system_prompt();

        assert!(prompt.contains("<task>"));
        assert!(prompt.contains("comparison"));
        assert!(prompt.contains("Is this more durable than the MX-500?"));
        assert!(prompt.contains("Positive examples show queries"));
    }

    #[test]
    fn test_n_examples_caps_rendered_examples() {
        let mut set = LabelSet::from_yaml_str(SAMPLE_YAML).unwrap();
        set.labels[0].examples.positive = vec![
            "example one".to_string(),
            "example two".to_string(),
            "example three".to_string(),
        ];
        set.n_examples = 2;

        let prompt = set.system_prompt();
        assert!(prompt.contains("example one"));
        assert!(prompt.contains("example two"));
        assert!(!prompt.contains("example three"));
    }

    #[test]
    fn test_user_prompt() {
        let set = LabelSet::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(
            set.user_prompt("Where is this made?"),
            "Correctly classify:\n\nWhere is this made?"
        );
    }
}
