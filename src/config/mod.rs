//! Configuration management for tree building and retrieval

use indexmap::IndexMap;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub builder: TreeBuilderConfig,
    pub retriever: TreeRetrieverConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Named embedding models available to the builder and retriever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name -> provider settings, in declaration order
    pub models: IndexMap<String, EmbeddingModelConfig>,
}

/// Provider settings for one embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingModelConfig {
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Remote(RemoteEmbeddingConfig),
    /// In-process feature-hashing model
    Local(LocalEmbeddingConfig),
}

/// Configuration for a network-backed embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEmbeddingConfig {
    /// Embeddings endpoint URL
    pub api_url: String,

    /// API authentication token (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub api_token: Secret<String>,

    /// Model name sent with each request
    #[serde(default)]
    pub model: Option<String>,

    /// Expected vector dimension, checked on every response when set
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Maximum batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Enable caching
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Cache maximum size
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

/// Configuration for the in-process embedding model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEmbeddingConfig {
    /// Output vector dimension
    #[serde(default = "default_local_dimension")]
    pub dimension: usize,
}

/// Summarization provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummarizationConfig {
    /// OpenAI-compatible `/v1/chat/completions` endpoint
    Remote(RemoteSummarizationConfig),
    /// In-process lead-sentence summarizer
    Extractive(ExtractiveSummarizationConfig),
}

/// Configuration for a network-backed summarization model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSummarizationConfig {
    /// Chat completions endpoint URL
    pub api_url: String,

    /// API authentication token (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub api_token: Secret<String>,

    /// Model name sent with each request
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,

    /// Input budget; longer contexts are truncated before the request
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
}

/// Configuration for the extractive summarizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractiveSummarizationConfig {
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

impl SummarizationConfig {
    pub fn max_input_tokens(&self) -> usize {
        match self {
            SummarizationConfig::Remote(c) => c.max_input_tokens,
            SummarizationConfig::Extractive(c) => c.max_input_tokens,
        }
    }
}

/// Retry policy applied by both gateways to network-backed providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Add up to one initial backoff of random delay
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// How survivors are chosen from a scored candidate set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Keep candidates scoring above `threshold`
    Threshold,
    /// Keep the `top_k` best candidates
    TopK,
}

/// Tree construction parameters.
///
/// The leading fields have no serde defaults: a build configuration must
/// spell them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeBuilderConfig {
    /// Token budget per leaf chunk
    pub max_tokens: usize,

    /// Maximum number of summary layers above the leaves
    pub num_layers: usize,

    /// Posterior membership cutoff used in threshold selection
    pub threshold: f64,

    /// Clusters per node in top-k selection
    pub top_k: usize,

    pub selection_mode: SelectionMode,

    /// Output cap for each cluster summary
    pub summarization_length: usize,

    /// Every model each new node is embedded under
    pub embedding_models: Vec<String>,

    /// Model whose vectors drive clustering
    pub cluster_embedding_model: String,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Concurrent cluster summarizations per layer
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sentences carried from one chunk into the next
    #[serde(default)]
    pub chunk_overlap: usize,

    #[serde(default)]
    pub token_estimator: TokenEstimator,
}

/// Tunables of the global/local mixture clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Target dimension after reduction
    #[serde(default = "default_reduction_dimension")]
    pub reduction_dimension: usize,

    /// Upper bound of the component-count sweep
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Clusters above this member token total are re-clustered
    #[serde(default = "default_max_tokens_per_cluster")]
    pub max_tokens_per_cluster: usize,

    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,

    /// Populations at or below this size form a single cluster.
    /// Defaults to `reduction_dimension + 1`.
    #[serde(default)]
    pub min_cluster_size: Option<usize>,

    /// EM iterations per fit
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl ClusteringConfig {
    pub fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
            .unwrap_or(self.reduction_dimension + 1)
            .max(1)
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            reduction_dimension: default_reduction_dimension(),
            max_clusters: default_max_clusters(),
            max_tokens_per_cluster: default_max_tokens_per_cluster(),
            max_recursion_depth: default_max_recursion_depth(),
            min_cluster_size: None,
            max_iter: default_max_iter(),
            seed: default_seed(),
        }
    }
}

/// Retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeRetrieverConfig {
    pub threshold: f32,

    pub top_k: usize,

    pub selection_mode: SelectionMode,

    /// Model used to embed queries; nodes must carry it
    pub context_embedding_model: String,

    /// Traversal entry layer (defaults to the root layer)
    #[serde(default)]
    pub start_layer: Option<usize>,

    /// Traversal depth (defaults to every layer from the start layer down)
    #[serde(default)]
    pub num_layers: Option<usize>,

    /// Token budget of the returned context
    pub max_tokens: usize,

    /// Score all layers as one pool instead of traversing
    #[serde(default = "default_collapse_tree")]
    pub collapse_tree: bool,

    #[serde(default)]
    pub token_estimator: TokenEstimator,
}

/// Token estimation methods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TokenEstimator {
    CharacterBased { chars_per_token: f32 },
    WordBased { words_per_token: f32 },
}

impl Default for TokenEstimator {
    fn default() -> Self {
        TokenEstimator::CharacterBased { chars_per_token: 4.0 }
    }
}

/// Tree persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub codec: CodecType,
}

/// Codec types for tree serialization
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    #[default]
    Json,
    MessagePack,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_batch_size() -> usize { 32 }
fn default_timeout() -> u64 { 30 }
fn default_summary_timeout() -> u64 { 120 }
fn default_cache_enabled() -> bool { true }
fn default_cache_ttl() -> u64 { 3600 }
fn default_cache_size() -> usize { 10_000 }
fn default_local_dimension() -> usize { 256 }
fn default_max_input_tokens() -> usize { 3500 }
fn default_max_attempts() -> u32 { 6 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 20_000 }
fn default_multiplier() -> f64 { 2.0 }
fn default_jitter() -> bool { true }
fn default_reduction_dimension() -> usize { 10 }
fn default_max_clusters() -> usize { 50 }
fn default_max_tokens_per_cluster() -> usize { 3500 }
fn default_max_recursion_depth() -> usize { 4 }
fn default_max_iter() -> usize { 100 }
fn default_seed() -> u64 { 224 }
fn default_workers() -> usize { 4 }
fn default_collapse_tree() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        loader::load_config(path)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        loader::load_config_with_env(path)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Offline configuration: in-process embedding and extractive summaries
    pub fn default_config() -> Self {
        let mut models = IndexMap::new();
        models.insert(
            "hashing".to_string(),
            EmbeddingModelConfig::Local(LocalEmbeddingConfig {
                dimension: default_local_dimension(),
            }),
        );

        Self {
            embedding: EmbeddingConfig { models },
            summarization: SummarizationConfig::Extractive(ExtractiveSummarizationConfig {
                max_input_tokens: default_max_input_tokens(),
            }),
            retry: RetryConfig::default(),
            builder: TreeBuilderConfig {
                max_tokens: 100,
                num_layers: 5,
                threshold: 0.1,
                top_k: 5,
                selection_mode: SelectionMode::Threshold,
                summarization_length: 100,
                embedding_models: vec!["hashing".to_string()],
                cluster_embedding_model: "hashing".to_string(),
                clustering: ClusteringConfig::default(),
                workers: default_workers(),
                chunk_overlap: 0,
                token_estimator: TokenEstimator::default(),
            },
            retriever: TreeRetrieverConfig {
                threshold: 0.5,
                top_k: 5,
                selection_mode: SelectionMode::TopK,
                context_embedding_model: "hashing".to_string(),
                start_layer: None,
                num_layers: None,
                max_tokens: 3500,
                collapse_tree: default_collapse_tree(),
                token_estimator: TokenEstimator::default(),
            },
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Custom serializer for Secret<String>
fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}
