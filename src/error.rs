//! Error types shared across the harness.

use thiserror::Error;

use crate::array::ArrayError;

/// Errors raised while loading or validating a benchmark configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for a benchmark run.
///
/// Nothing is recovered locally: every variant aborts the run.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown source type '{0}'")]
    UnknownSourceType(String),

    #[error("unknown operation type '{0}'")]
    UnknownOperationType(String),

    /// The array runtime failed during load, transform or materialization.
    #[error("array runtime failure: {0}")]
    Load(#[from] ArrayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start worker pool: {0}")]
    Scheduler(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = BenchError> = std::result::Result<T, E>;
