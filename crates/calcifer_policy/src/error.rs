//! Error types for policy module.

use calcifer_core::{CoreError, MergeConflict};
use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while building or running policies.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Evaluation fault: {0}")]
    Fault(#[from] CoreError),

    #[error("{0}")]
    MergeConflict(#[from] MergeConflict),

    #[error("Invalid rule {rule}: {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Invalid evaluator configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
