//! Query-time node selection over a built tree

use super::{cosine_similarity, NodeId, Tree};
use crate::chunking::TokenEstimator;
use crate::config::validation::validate_retriever_config;
use crate::config::{SelectionMode, TreeRetrieverConfig};
use crate::embedding::{BoundEmbedder, EmbeddingGateway};
use crate::error::{ProviderError, Result, TreeError};
use std::collections::BTreeSet;
use tracing::debug;

/// Per-query retrieval parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    /// Score every layer as one pool instead of walking down from a layer
    pub collapse_tree: bool,
    pub selection_mode: SelectionMode,
    pub threshold: f32,
    pub top_k: usize,
    /// Token budget of the whole result
    pub max_tokens: usize,
    /// Traversal entry layer, the root layer when unset
    pub start_layer: Option<usize>,
    /// Layers visited by traversal, every layer from the start when unset
    pub num_layers: Option<usize>,
}

impl From<&TreeRetrieverConfig> for RetrievalOptions {
    fn from(config: &TreeRetrieverConfig) -> Self {
        Self {
            collapse_tree: config.collapse_tree,
            selection_mode: config.selection_mode,
            threshold: config.threshold,
            top_k: config.top_k,
            max_tokens: config.max_tokens,
            start_layer: config.start_layer,
            num_layers: config.num_layers,
        }
    }
}

impl RetrievalOptions {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(TreeError::Config("top_k must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TreeError::Config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_tokens == 0 {
            return Err(TreeError::Config("max_tokens must be greater than 0".to_string()));
        }
        if self.num_layers == Some(0) {
            return Err(TreeError::Config("Traversal depth must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// One selected node
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedNode {
    pub id: NodeId,
    pub layer: usize,
    pub score: f32,
    pub text: String,
    pub token_count: usize,
}

/// Selected nodes, most relevant first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub nodes: Vec<RetrievedNode>,
}

impl RetrievalResult {
    pub fn texts(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.text.as_str()).collect()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    /// Node texts joined by blank lines
    pub fn context(&self) -> String {
        self.texts().join("\n\n")
    }

    pub fn total_tokens(&self) -> usize {
        self.nodes.iter().map(|node| node.token_count).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    id: NodeId,
    layer: usize,
    score: f32,
}

/// Read-only view answering queries against one tree
pub struct TreeRetriever<'t> {
    tree: &'t Tree,
    embedder: BoundEmbedder,
    /// Vector length of the context model in this tree, `None` when empty
    dimension: Option<usize>,
    defaults: RetrievalOptions,
    estimator: TokenEstimator,
}

impl<'t> TreeRetriever<'t> {
    /// Validate `config` and check every node carries the context model
    pub fn new(tree: &'t Tree, config: &TreeRetrieverConfig, embeddings: &EmbeddingGateway) -> Result<Self> {
        validate_retriever_config(config)?;
        let embedder = embeddings.bind(&config.context_embedding_model)?;

        if let Some(node) = tree
            .all_nodes()
            .values()
            .find(|node| node.embedding(embedder.name()).is_none())
        {
            return Err(TreeError::Config(format!(
                "Node {} has no '{}' embedding",
                node.id,
                embedder.name()
            )));
        }
        let dimension = tree
            .all_nodes()
            .values()
            .find_map(|node| node.embedding(embedder.name()))
            .map(<[f32]>::len);

        Ok(Self {
            tree,
            embedder,
            dimension,
            defaults: RetrievalOptions::from(config),
            estimator: TokenEstimator::new(config.token_estimator),
        })
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn defaults(&self) -> &RetrievalOptions {
        &self.defaults
    }

    /// Retrieve with the configured defaults
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_with(query, &self.defaults).await
    }

    pub async fn retrieve_with(&self, query: &str, options: &RetrievalOptions) -> Result<RetrievalResult> {
        options.validate()?;
        if query.trim().is_empty() || self.tree.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let query_embedding = self.embedder.embed(query).await?;
        self.retrieve_by_embedding(&query_embedding, options)
    }

    /// Select nodes for an already embedded query
    pub fn retrieve_by_embedding(&self, query_embedding: &[f32], options: &RetrievalOptions) -> Result<RetrievalResult> {
        options.validate()?;
        if self.tree.is_empty() {
            return Ok(RetrievalResult::default());
        }
        if let Some(expected) = self.dimension {
            if query_embedding.len() != expected {
                return Err(ProviderError::DimensionMismatch {
                    expected,
                    actual: query_embedding.len(),
                }
                .into());
            }
        }

        let selected = if options.collapse_tree {
            self.collapsed(query_embedding, options)?
        } else {
            self.traverse(query_embedding, options)?
        };

        Ok(self.within_budget(selected, options.max_tokens))
    }

    fn collapsed(&self, query: &[f32], options: &RetrievalOptions) -> Result<Vec<Scored>> {
        let scored = self.score(self.tree.all_nodes().keys().copied(), query)?;
        let selected = select(scored, options);
        debug!("Collapsed retrieval selected {} nodes", selected.len());
        Ok(selected)
    }

    fn traverse(&self, query: &[f32], options: &RetrievalOptions) -> Result<Vec<Scored>> {
        let top = self.tree.num_layers();
        let start = options.start_layer.unwrap_or(top).min(top);
        let depth = options.num_layers.unwrap_or(start + 1).min(start + 1);

        let mut selected = select(self.score(self.tree.layer(start).iter().copied(), query)?, options);
        debug!("Layer {}: selected {} nodes", start, selected.len());

        for _ in 1..depth {
            let children: BTreeSet<NodeId> = selected
                .iter()
                .filter_map(|scored| self.tree.node(scored.id))
                .flat_map(|node| node.children.iter().copied())
                .collect();
            if children.is_empty() {
                break;
            }

            selected = select(self.score(children.into_iter(), query)?, options);
            debug!(
                "Layer {}: selected {} nodes",
                selected.first().map_or(0, |scored| scored.layer),
                selected.len()
            );
        }

        Ok(selected)
    }

    fn score(&self, ids: impl Iterator<Item = NodeId>, query: &[f32]) -> Result<Vec<Scored>> {
        let model = self.embedder.name();
        ids.map(|id| -> Result<Scored> {
            let node = self
                .tree
                .node(id)
                .ok_or_else(|| TreeError::InvalidTree(format!("Unknown node {}", id)))?;
            let embedding = node
                .embedding(model)
                .ok_or_else(|| TreeError::InvalidTree(format!("Node {} has no '{}' embedding", id, model)))?;
            let score = cosine_similarity(query, embedding).ok_or(ProviderError::DimensionMismatch {
                expected: embedding.len(),
                actual: query.len(),
            })?;
            Ok(Scored {
                id,
                layer: self.tree.layer_of(id).unwrap_or(0),
                score,
            })
        })
        .collect()
    }

    /// Keep nodes in order until the next one would exceed `max_tokens`
    fn within_budget(&self, selected: Vec<Scored>, max_tokens: usize) -> RetrievalResult {
        let mut nodes = Vec::with_capacity(selected.len());
        let mut total = 0;

        for scored in selected {
            let Some(node) = self.tree.node(scored.id) else {
                continue;
            };
            let token_count = self.estimator.estimate(&node.text);
            if total + token_count > max_tokens {
                debug!("Token budget of {} reached after {} nodes", max_tokens, nodes.len());
                break;
            }
            total += token_count;
            nodes.push(RetrievedNode {
                id: scored.id,
                layer: scored.layer,
                score: scored.score,
                text: node.text.clone(),
                token_count,
            });
        }

        RetrievalResult { nodes }
    }
}

/// Rank by descending score, then ascending layer, then ascending id, and
/// keep the candidates the selection mode admits
fn select(mut scored: Vec<Scored>, options: &RetrievalOptions) -> Vec<Scored> {
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.layer.cmp(&b.layer))
            .then(a.id.cmp(&b.id))
    });

    match options.selection_mode {
        SelectionMode::Threshold => scored.retain(|s| s.score > options.threshold),
        SelectionMode::TopK => scored.truncate(options.top_k),
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenEstimator as TokenEstimatorConfig;
    use crate::embedding::{Deployment, EmbeddingProvider};
    use crate::retry::RetryPolicy;
    use crate::tree::tests::sample_tree;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Embeds every query as a fixed vector
    struct FixedQuery(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedQuery {
        async fn embed_single(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Ok(self.0.clone())
        }

        fn embedding_dimension(&self) -> Option<usize> {
            Some(self.0.len())
        }

        fn deployment(&self) -> Deployment {
            Deployment::InProcess
        }
    }

    /// Like `FixedQuery` but without a declared dimension
    struct UndeclaredQuery(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for UndeclaredQuery {
        async fn embed_single(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            Ok(self.0.clone())
        }

        fn embedding_dimension(&self) -> Option<usize> {
            None
        }

        fn deployment(&self) -> Deployment {
            Deployment::Remote
        }
    }

    fn gateway(query: Vec<f32>) -> EmbeddingGateway {
        EmbeddingGateway::new(RetryPolicy::none()).with_model("m", Arc::new(FixedQuery(query)))
    }

    fn config() -> TreeRetrieverConfig {
        TreeRetrieverConfig {
            threshold: 0.5,
            top_k: 2,
            selection_mode: SelectionMode::TopK,
            context_embedding_model: "m".to_string(),
            start_layer: None,
            num_layers: None,
            max_tokens: 1000,
            collapse_tree: true,
            token_estimator: TokenEstimatorConfig::WordBased { words_per_token: 1.0 },
        }
    }

    #[tokio::test]
    async fn test_collapsed_top_k_ranks_all_layers() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0, 0.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();

        let result = retriever.retrieve("stepmother").await.unwrap();

        // Leaf 0 matches exactly; its parent 4 beats sibling leaf 1
        assert_eq!(result.node_ids(), vec![0, 4]);
        assert_eq!(result.nodes[0].layer, 0);
        assert_eq!(result.nodes[1].layer, 1);
        assert!(result.nodes[0].score >= result.nodes[1].score);
    }

    #[tokio::test]
    async fn test_collapsed_threshold() {
        let tree = sample_tree();
        let gateway = gateway(vec![0.0, 0.0, 1.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        let options = RetrievalOptions {
            selection_mode: SelectionMode::Threshold,
            threshold: 0.6,
            ..retriever.defaults().clone()
        };

        let result = retriever.retrieve_with("slipper", &options).await.unwrap();

        assert_eq!(result.node_ids(), vec![3, 5]);
        assert!(result.nodes.iter().all(|node| node.score > 0.6));
    }

    #[tokio::test]
    async fn test_traversal_descends_to_leaves() {
        let tree = sample_tree();
        let gateway = gateway(vec![0.0, 0.2, 1.0]);
        let mut config = config();
        config.collapse_tree = false;
        config.top_k = 1;
        let retriever = TreeRetriever::new(&tree, &config, &gateway).unwrap();

        // root 6 -> best of {4, 5} is 5 -> best of {2, 3} is 3
        let result = retriever.retrieve("slipper").await.unwrap();
        assert_eq!(result.node_ids(), vec![3]);
        assert_eq!(result.nodes[0].layer, 0);
    }

    #[tokio::test]
    async fn test_traversal_depth_limits_descent() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0, 0.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        let options = RetrievalOptions {
            collapse_tree: false,
            start_layer: Some(1),
            num_layers: Some(1),
            ..retriever.defaults().clone()
        };

        let result = retriever.retrieve_with("home", &options).await.unwrap();
        assert_eq!(result.node_ids(), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_start_layer_beyond_depth_is_clamped() {
        let tree = sample_tree();
        let gateway = gateway(vec![0.0, 1.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        let options = RetrievalOptions {
            collapse_tree: false,
            start_layer: Some(10),
            num_layers: Some(10),
            ..retriever.defaults().clone()
        };
        let from_root = RetrievalOptions {
            start_layer: None,
            num_layers: None,
            ..options.clone()
        };

        let clamped = retriever.retrieve_with("fairy", &options).await.unwrap();
        assert_eq!(clamped, retriever.retrieve_with("fairy", &from_root).await.unwrap());
        assert!(clamped.nodes.iter().all(|node| node.layer == 0));
    }

    #[tokio::test]
    async fn test_token_budget_truncates() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0, 0.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        let options = RetrievalOptions {
            top_k: 7,
            max_tokens: 9,
            ..retriever.defaults().clone()
        };

        // Node 0 has 5 words, node 4 has 4, the next one no longer fits
        let result = retriever.retrieve_with("stepmother", &options).await.unwrap();
        assert_eq!(result.node_ids(), vec![0, 4]);
        assert_eq!(result.total_tokens(), 9);
        assert_eq!(
            result.context(),
            "Cinderella lived with her stepmother.\n\nCinderella suffered at home."
        );
    }

    #[tokio::test]
    async fn test_empty_query_and_empty_tree() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0, 0.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        assert!(retriever.retrieve("  ").await.unwrap().is_empty());

        let empty = Tree::default();
        let retriever = TreeRetriever::new(&empty, &config(), &gateway).unwrap();
        assert!(retriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0, 0.0, 0.0]);
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();
        let options = RetrievalOptions {
            top_k: 0,
            ..retriever.defaults().clone()
        };

        assert!(matches!(
            retriever.retrieve_with("query", &options).await,
            Err(TreeError::Config(_))
        ));
    }

    #[test]
    fn test_missing_context_model_rejected() {
        let tree = sample_tree();
        let gateway = gateway(vec![1.0]).with_model("other", Arc::new(FixedQuery(vec![1.0])));
        let mut config = config();
        config.context_embedding_model = "other".to_string();

        assert!(matches!(
            TreeRetriever::new(&tree, &config, &gateway),
            Err(TreeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_query_of_wrong_length_rejected() {
        let tree = sample_tree();
        let gateway =
            EmbeddingGateway::new(RetryPolicy::none()).with_model("m", Arc::new(UndeclaredQuery(vec![0.0, 1.0])));
        let retriever = TreeRetriever::new(&tree, &config(), &gateway).unwrap();

        assert!(matches!(
            retriever.retrieve("stepsisters").await,
            Err(TreeError::Provider(ProviderError::DimensionMismatch { expected: 3, actual: 2 }))
        ));
        for collapse_tree in [true, false] {
            let options = RetrievalOptions {
                collapse_tree,
                ..retriever.defaults().clone()
            };
            assert!(retriever.retrieve_by_embedding(&[1.0, 0.0, 0.0, 0.0], &options).is_err());
        }
    }

    #[test]
    fn test_ranking_is_total_with_nan_scores() {
        let scored = |id, score| Scored { id, layer: 0, score };
        let options = RetrievalOptions {
            collapse_tree: true,
            selection_mode: SelectionMode::TopK,
            threshold: 0.5,
            top_k: 4,
            max_tokens: 100,
            start_layer: None,
            num_layers: None,
        };

        let forward = select(vec![scored(0, 0.2), scored(1, f32::NAN), scored(2, 0.9), scored(3, 0.2)], &options);
        let backward = select(vec![scored(3, 0.2), scored(2, 0.9), scored(1, f32::NAN), scored(0, 0.2)], &options);

        let ids = |selected: &[Scored]| selected.iter().map(|s| s.id).collect::<Vec<_>>();
        assert_eq!(ids(&forward), ids(&backward));
        assert_eq!(&ids(&forward)[1..], &[2, 0, 3]);
    }
}
