//! Error types for tree construction and retrieval

use thiserror::Error;

/// Result type alias for tree operations
pub type Result<T> = std::result::Result<T, TreeError>;

/// Main error type for building and querying trees
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while splitting raw text into leaf segments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("Chunk token budget must be greater than 0")]
    ZeroBudget,
}

/// Errors raised by embedding and summarization providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited => true,
            ProviderError::InvalidResponse(_) => true,
            ProviderError::Api { status, .. } => *status >= 500 || *status == 429,
            ProviderError::AuthenticationFailed
            | ProviderError::DimensionMismatch { .. }
            | ProviderError::RetriesExhausted { .. } => false,
        }
    }
}

/// Numerical failures inside the clusterer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error("Embedding missing for node {node} under model '{model}'")]
    MissingEmbedding { node: usize, model: String },

    #[error("Inconsistent embedding dimension: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Mixture model did not produce finite likelihood")]
    NonFiniteLikelihood,

    #[error("Invalid clustering parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },
}

/// Errors related to tree persistence
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl From<config::ConfigError> for TreeError {
    fn from(err: config::ConfigError) -> Self {
        TreeError::Config(err.to_string())
    }
}
