use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Count mismatch: {vectors} vectors but {records} records")]
    CountMismatch { vectors: usize, records: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index has not been initialized")]
    IndexUninitialized,

    #[error("Document '{0}' contains no text")]
    EmptyDocument(String),

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed stream fragment: {0}")]
    MalformedStreamFragment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agents;
pub mod cache;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
