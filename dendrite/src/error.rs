//! Error types for the evaluation toolkit.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DendriteError>;

#[derive(Debug, Error)]
pub enum DendriteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Rerank error: {0}")]
    Rerank(String),

    #[error("Label error: {0}")]
    Label(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
