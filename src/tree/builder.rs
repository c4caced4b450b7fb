//! Recursive cluster-and-summarize tree construction.
//!
//! Leaves are embedded under every configured model. Each layer step
//! clusters the current layer on the cluster model's vectors, then
//! summarizes and embeds every cluster concurrently on a bounded worker pool.
//! Layers are strictly sequential and ids are allocated in cluster discovery
//! order, so identical inputs and provider answers give identical trees.
//! Any failure discards everything built so far.

use super::{Node, NodeId, Tree};
use crate::chunking::{Chunker, TokenEstimator};
use crate::cluster::{ClusterItem, Clusterer, Membership, RaptorClustering, Selection};
use crate::config::validation::validate_builder_config;
use crate::config::{Config, TreeBuilderConfig};
use crate::embedding::{BoundEmbedder, EmbeddingGateway};
use crate::error::{ChunkingError, ClusteringError, Result, TreeError};
use crate::summarization::SummarizerGateway;
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Builds trees with one fixed configuration and set of providers
pub struct TreeBuilder {
    config: TreeBuilderConfig,
    chunker: Chunker,
    estimator: TokenEstimator,
    cluster_embedder: BoundEmbedder,
    embedders: Arc<Vec<BoundEmbedder>>,
    summarizer: SummarizerGateway,
    clusterer: Arc<dyn Clusterer>,
}

impl TreeBuilder {
    /// Validate `config` and resolve its models against `embeddings`.
    /// Nothing is sent to any provider here.
    pub fn new(
        config: TreeBuilderConfig,
        embeddings: &EmbeddingGateway,
        summarizer: SummarizerGateway,
        clusterer: Arc<dyn Clusterer>,
    ) -> Result<Self> {
        validate_builder_config(&config)?;

        let embedders = config
            .embedding_models
            .iter()
            .map(|name| embeddings.bind(name))
            .collect::<Result<Vec<_>>>()?;
        let cluster_embedder = embeddings.bind(&config.cluster_embedding_model)?;

        let estimator = TokenEstimator::new(config.token_estimator);
        let chunker = Chunker::new(estimator).with_overlap(config.chunk_overlap);

        Ok(Self {
            config,
            chunker,
            estimator,
            cluster_embedder,
            embedders: Arc::new(embedders),
            summarizer,
            clusterer,
        })
    }

    /// Wire gateways and the mixture clusterer from a full configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let embeddings = EmbeddingGateway::from_config(&config.embedding, &config.retry)?;
        let estimator = TokenEstimator::new(config.builder.token_estimator);
        let summarizer = SummarizerGateway::from_config(&config.summarization, &config.retry, estimator)?;
        let clusterer = Arc::new(RaptorClustering::new(config.builder.clustering.clone()));

        Self::new(config.builder.clone(), &embeddings, summarizer, clusterer)
    }

    pub fn config(&self) -> &TreeBuilderConfig {
        &self.config
    }

    /// Chunk `text` and build a tree over the chunks
    pub async fn build_from_text(&self, text: &str) -> Result<Tree> {
        let chunks = self.chunker.split(text, self.config.max_tokens)?;
        info!("Split input into {} chunks", chunks.len());
        self.build_from_chunks(chunks).await
    }

    /// Build a tree whose leaves are `chunks`, in order
    pub async fn build_from_chunks(&self, chunks: Vec<String>) -> Result<Tree> {
        let chunks: Vec<String> = chunks.into_iter().filter(|c| !c.trim().is_empty()).collect();
        if chunks.is_empty() {
            return Err(ChunkingError::EmptyInput.into());
        }

        let started = Instant::now();
        let mut all_nodes = self.create_leaves(chunks).await?;
        let mut layers: Vec<Vec<NodeId>> = vec![all_nodes.keys().copied().collect()];
        let next_id = AtomicUsize::new(all_nodes.len());

        info!("Created {} leaf nodes", all_nodes.len());

        for layer in 0..self.config.num_layers {
            let current = layers.last().cloned().unwrap_or_default();
            if current.len() <= 1 {
                info!("Layer {} has a single node; stopping", layer);
                break;
            }

            let membership = self.cluster_layer(&all_nodes, &current).await?;
            if membership.is_empty() {
                break;
            }

            let new_nodes = self.summarize_clusters(&all_nodes, &membership, &next_id).await?;
            let ids: Vec<NodeId> = new_nodes.iter().map(|node| node.id).collect();
            all_nodes.extend(new_nodes.into_iter().map(|node| (node.id, node)));

            info!(
                "Constructed layer {}: {} nodes from {} clusters",
                layer + 1,
                ids.len(),
                membership.len()
            );
            layers.push(ids);

            if membership.len() == 1 {
                info!("Layer {} collapsed into a single cluster; stopping", layer);
                break;
            }
        }

        let tree = Tree::new(all_nodes, layers)?;
        info!(
            "Built tree with {} nodes in {} layers ({:?})",
            tree.len(),
            tree.num_layers() + 1,
            started.elapsed()
        );
        Ok(tree)
    }

    async fn create_leaves(&self, chunks: Vec<String>) -> Result<BTreeMap<NodeId, Node>> {
        let mut nodes: Vec<Node> = chunks
            .into_iter()
            .enumerate()
            .map(|(id, text)| Node::leaf(id, text))
            .collect();
        let texts: Vec<String> = nodes.iter().map(|node| node.text.clone()).collect();

        for embedder in self.embedders.iter() {
            let vectors = embedder.embed_batch(&texts).await?;
            for (node, vector) in nodes.iter_mut().zip(vectors) {
                node.embeddings.insert(embedder.name().to_string(), vector);
            }
        }

        Ok(nodes.into_iter().map(|node| (node.id, node)).collect())
    }

    async fn cluster_layer(&self, all_nodes: &BTreeMap<NodeId, Node>, layer: &[NodeId]) -> Result<Membership> {
        let model = self.cluster_embedder.name();
        let items = layer
            .iter()
            .map(|id| -> Result<ClusterItem> {
                let node = all_nodes
                    .get(id)
                    .ok_or_else(|| TreeError::Internal(format!("Layer references missing node {}", id)))?;
                let embedding = node.embedding(model).ok_or_else(|| ClusteringError::MissingEmbedding {
                    node: *id,
                    model: model.to_string(),
                })?;
                Ok(ClusterItem {
                    id: *id,
                    embedding: embedding.to_vec(),
                    token_count: self.estimator.estimate(&node.text),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = Selection::new(self.config.selection_mode, self.config.threshold, self.config.top_k);
        let clusterer = self.clusterer.clone();
        let membership = tokio::task::spawn_blocking(move || clusterer.cluster(&items, selection))
            .await
            .map_err(|e| TreeError::Internal(format!("Clustering task failed: {}", e)))??;

        if !membership.covers(layer.iter().copied()) {
            return Err(TreeError::Internal("Clustering left nodes without a cluster".to_string()));
        }
        Ok(membership)
    }

    async fn summarize_clusters(
        &self,
        all_nodes: &BTreeMap<NodeId, Node>,
        membership: &Membership,
        next_id: &AtomicUsize,
    ) -> Result<Vec<Node>> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut handles: Vec<JoinHandle<Result<Node>>> = Vec::with_capacity(membership.len());

        for members in membership.clusters() {
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            let texts: Vec<String> = members
                .iter()
                .filter_map(|member| all_nodes.get(member))
                .map(|node| node.text.clone())
                .collect();
            let children: BTreeSet<NodeId> = members.iter().copied().collect();

            let semaphore = Arc::clone(&semaphore);
            let summarizer = self.summarizer.clone();
            let embedders = Arc::clone(&self.embedders);
            let summary_length = self.config.summarization_length;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| TreeError::Internal(e.to_string()))?;

                let summary = summarizer.summarize(&texts, summary_length).await?;
                let mut node = Node::new(id, summary, children);
                let vectors = try_join_all(embedders.iter().map(|embedder| embedder.embed(&node.text))).await?;
                for (embedder, vector) in embedders.iter().zip(vectors) {
                    node.embeddings.insert(embedder.name().to_string(), vector);
                }

                debug!("Node {} summarizes {} children", id, node.children.len());
                Ok(node)
            }));
        }

        let mut nodes = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let outcome = handle
                .await
                .map_err(|e| TreeError::Internal(format!("Cluster worker failed: {}", e)))
                .and_then(|result| result);
            match outcome {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    pending.for_each(|handle| handle.abort());
                    return Err(e);
                }
            }
        }
        Ok(nodes)
    }
}
