// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source unavailable: {location}: {reason}")]
    SourceUnavailable { location: String, reason: String },

    #[error("could not parse table from {location}: {reason}")]
    ParseError { location: String, reason: String },

    #[error("{stage}: missing required columns: {}", columns.join(", "))]
    MissingColumns {
        stage: String,
        columns: Vec<String>,
    },

    #[error("run halted by failing checks: {}", checks.join(", "))]
    CheckFailure { checks: Vec<String> },

    #[error("failed to write {path}: {reason}")]
    ExportWriteError { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stage graph error: {0}")]
    Graph(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
