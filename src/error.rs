//! Error types for the batch embedding pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to configuration. All of these are fatal before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding service: {0}")]
    ConnectionError(String),

    #[error("embedding service error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding service returned {got} vectors for {want} inputs")]
    CountMismatch { got: usize, want: usize },

    #[error("embedding dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            // A request that could not be built will not build on the next attempt either
            EmbeddingError::RequestError(e) => !e.is_builder(),
            EmbeddingError::ConnectionError(_)
            | EmbeddingError::ServerError(_)
            | EmbeddingError::InvalidResponse(_)
            | EmbeddingError::CountMismatch { .. }
            | EmbeddingError::DimensionMismatch { .. }
            | EmbeddingError::Timeout => true,
        }
    }
}

/// Errors related to checkpoint persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Errors related to reading input tables and writing output artifacts.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parse error at line {line}: {source}")]
    JsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("text column '{0}' not found in input")]
    MissingColumn(String),

    #[error("row {row}: text column '{column}' is not a string")]
    InvalidText { row: usize, column: String },

    #[error("row {row}: expected a JSON object")]
    NotAnObject { row: usize },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("record {0} has not been processed; refusing to write an incomplete artifact")]
    Incomplete(usize),
}

/// Errors that end a pipeline run.
///
/// Configuration problems surface earlier, when `PipelineOptions` is built.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("checkpoint error: {0}")]
    Store(#[from] StoreError),

    #[error("output error: {0}")]
    Output(#[from] DatasetError),

    #[error(
        "checkpoint does not match the current run ({0}); rerun with --fresh to discard it"
    )]
    CheckpointMismatch(String),
}
