//! Tree Retriever - recursive cluster-and-summarize indexing of long documents
//!
//! Text is split into leaf chunks, which are embedded, softly clustered with a
//! Gaussian mixture and summarized cluster by cluster. The summaries form the
//! next layer, and the process repeats until a single root remains or the
//! layer cap is reached. Queries are answered either from all layers at once
//! (collapsed retrieval) or by walking down from a chosen layer.
//!
//! ## Features
//!
//! - **Pluggable providers**: remote OpenAI-compatible or in-process embedding
//!   and summarization backends, resolved by name at construction time
//! - **Bounded retries**: exponential backoff with jitter for remote providers
//! - **Soft clustering**: PCA reduction, BIC-selected diagonal GMM, global and
//!   local passes
//! - **Concurrent layers**: clusters of one layer are summarized on a bounded
//!   worker pool
//! - **Persistence**: JSON or MessagePack round-trips with structural validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tree_retriever::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default_config();
//!
//!     let builder = TreeBuilder::from_config(&config)?;
//!     let tree = builder
//!         .build_from_text("Once upon a time there was a girl named Cinderella. ...")
//!         .await?;
//!
//!     let embeddings = EmbeddingGateway::from_config(&config.embedding, &config.retry)?;
//!     let retriever = TreeRetriever::new(&tree, &config.retriever, &embeddings)?;
//!     let result = retriever.retrieve("How did Cinderella reach her happy ending?").await?;
//!     println!("{}", result.context());
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cluster;
pub mod config;
pub mod embedding;
pub mod error;
pub mod observability;
pub mod retry;
pub mod summarization;
pub mod tree;

pub use config::Config;
pub use error::{Result, TreeError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chunking::{Chunker, TokenEstimator};
    pub use crate::cluster::{Clusterer, Membership, RaptorClustering, Selection};
    pub use crate::config::{Config, SelectionMode, TreeBuilderConfig, TreeRetrieverConfig};
    pub use crate::embedding::{EmbeddingGateway, EmbeddingProvider};
    pub use crate::error::{Result, TreeError};
    pub use crate::summarization::{SummarizationProvider, SummarizerGateway};
    pub use crate::tree::{
        Node, NodeId, RetrievalOptions, RetrievalResult, Tree, TreeBuilder, TreeCodec, TreeRetriever,
    };
}
