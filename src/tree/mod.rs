//! Layered summary tree: data model, construction and retrieval

pub mod builder;
pub mod codec;
pub mod retriever;

pub use builder::TreeBuilder;
pub use codec::{JsonCodec, MessagePackCodec, TreeCodec};
pub use retriever::{RetrievalOptions, RetrievalResult, RetrievedNode, TreeRetriever};

use crate::error::{Result, TreeError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Identifier of a node, unique within its tree
pub type NodeId = usize;

/// One chunk or summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    /// Embedding per model name
    pub embeddings: IndexMap<String, Vec<f32>>,
    /// Nodes summarized into this one; empty for leaves
    pub children: BTreeSet<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, text: impl Into<String>, children: BTreeSet<NodeId>) -> Self {
        Self {
            id,
            text: text.into(),
            embeddings: IndexMap::new(),
            children,
        }
    }

    pub fn leaf(id: NodeId, text: impl Into<String>) -> Self {
        Self::new(id, text, BTreeSet::new())
    }

    pub fn with_embedding(mut self, model: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embeddings.insert(model.into(), vector);
        self
    }

    pub fn embedding(&self, model: &str) -> Option<&[f32]> {
        self.embeddings.get(model).map(Vec::as_slice)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Immutable, structurally validated summary tree.
///
/// Layer 0 holds the leaves, the last layer holds the roots. Every node sits
/// in exactly one layer and summarizes nodes of a single lower layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TreeParts")]
pub struct Tree {
    all_nodes: BTreeMap<NodeId, Node>,
    root_nodes: BTreeSet<NodeId>,
    leaf_nodes: BTreeSet<NodeId>,
    layer_to_nodes: Vec<Vec<NodeId>>,
    #[serde(skip)]
    layer_of: HashMap<NodeId, usize>,
}

/// Serialized shape of a tree, validated before it becomes a [`Tree`]
#[derive(Deserialize)]
struct TreeParts {
    all_nodes: BTreeMap<NodeId, Node>,
    root_nodes: BTreeSet<NodeId>,
    leaf_nodes: BTreeSet<NodeId>,
    layer_to_nodes: Vec<Vec<NodeId>>,
}

impl TryFrom<TreeParts> for Tree {
    type Error = TreeError;

    fn try_from(parts: TreeParts) -> Result<Self> {
        let tree = Tree::new(parts.all_nodes, parts.layer_to_nodes)?;
        if tree.root_nodes != parts.root_nodes {
            return Err(TreeError::InvalidTree(
                "Root nodes do not match the top layer".to_string(),
            ));
        }
        if tree.leaf_nodes != parts.leaf_nodes {
            return Err(TreeError::InvalidTree(
                "Leaf nodes do not match layer 0".to_string(),
            ));
        }
        Ok(tree)
    }
}

impl Tree {
    /// Assemble a tree from its nodes and layers, deriving roots and leaves
    pub fn new(all_nodes: BTreeMap<NodeId, Node>, layer_to_nodes: Vec<Vec<NodeId>>) -> Result<Self> {
        let leaf_nodes = layer_to_nodes
            .first()
            .map(|layer| layer.iter().copied().collect())
            .unwrap_or_default();
        let root_nodes = layer_to_nodes
            .last()
            .map(|layer| layer.iter().copied().collect())
            .unwrap_or_default();

        let mut tree = Self {
            all_nodes,
            root_nodes,
            leaf_nodes,
            layer_to_nodes,
            layer_of: HashMap::new(),
        };
        tree.index_layers()?;
        tree.validate()?;
        Ok(tree)
    }

    fn index_layers(&mut self) -> Result<()> {
        self.layer_of.clear();
        for (layer, ids) in self.layer_to_nodes.iter().enumerate() {
            for id in ids {
                if let Some(previous) = self.layer_of.insert(*id, layer) {
                    return Err(TreeError::InvalidTree(format!(
                        "Node {} appears in layers {} and {}",
                        id, previous, layer
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check the structural invariants
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(TreeError::InvalidTree(message));

        for (key, node) in &self.all_nodes {
            if *key != node.id {
                return invalid(format!("Node stored under {} has id {}", key, node.id));
            }
            if !self.layer_of.contains_key(key) {
                return invalid(format!("Node {} belongs to no layer", key));
            }
        }

        let mut dimensions: HashMap<&str, usize> = HashMap::new();
        for (layer, ids) in self.layer_to_nodes.iter().enumerate() {
            if ids.is_empty() {
                return invalid(format!("Layer {} is empty", layer));
            }

            for id in ids {
                let Some(node) = self.all_nodes.get(id) else {
                    return invalid(format!("Layer {} lists unknown node {}", layer, id));
                };

                if layer == 0 && !node.is_leaf() {
                    return invalid(format!("Leaf layer node {} has children", id));
                }
                if layer > 0 && node.is_leaf() {
                    return invalid(format!("Node {} in layer {} has no children", id, layer));
                }

                let child_layers: BTreeSet<Option<usize>> = node
                    .children
                    .iter()
                    .map(|child| self.layer_of.get(child).copied())
                    .collect();
                if child_layers.len() > 1 {
                    return invalid(format!("Children of node {} span several layers", id));
                }
                if let Some(child_layer) = child_layers.into_iter().next() {
                    match child_layer {
                        Some(l) if l < layer => {}
                        _ => return invalid(format!("Children of node {} are not in a lower layer", id)),
                    }
                }

                for (model, vector) in &node.embeddings {
                    let expected = *dimensions.entry(model.as_str()).or_insert(vector.len());
                    if vector.len() != expected {
                        return invalid(format!(
                            "Node {} has a {}-dimensional '{}' embedding, expected {}",
                            id,
                            vector.len(),
                            model,
                            expected
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn all_nodes(&self) -> &BTreeMap<NodeId, Node> {
        &self.all_nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.all_nodes.get(&id)
    }

    pub fn root_nodes(&self) -> &BTreeSet<NodeId> {
        &self.root_nodes
    }

    pub fn leaf_nodes(&self) -> &BTreeSet<NodeId> {
        &self.leaf_nodes
    }

    pub fn layer_to_nodes(&self) -> &[Vec<NodeId>] {
        &self.layer_to_nodes
    }

    /// Node ids of `layer`, empty when out of range
    pub fn layer(&self, layer: usize) -> &[NodeId] {
        self.layer_to_nodes.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn layer_of(&self, id: NodeId) -> Option<usize> {
        self.layer_of.get(&id).copied()
    }

    /// Index of the top layer; 0 for a leaves-only or empty tree
    pub fn num_layers(&self) -> usize {
        self.layer_to_nodes.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.all_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_nodes.is_empty()
    }
}

/// Cosine similarity, 0 when either vector has zero norm.
/// `None` when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        Some(0.0)
    } else {
        Some(dot / (norm_a * norm_b))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Leaves 0..4, summaries 4 and 5, root 6
    pub(crate) fn sample_tree() -> Tree {
        let mut nodes = BTreeMap::new();
        let leaves = [
            ("Cinderella lived with her stepmother.", [1.0, 0.0, 0.0]),
            ("Her stepsisters were cruel.", [0.9, 0.1, 0.0]),
            ("A fairy godmother appeared.", [0.0, 1.0, 0.0]),
            ("The prince found the glass slipper.", [0.0, 0.2, 1.0]),
        ];
        for (id, (text, vector)) in leaves.iter().enumerate() {
            nodes.insert(id, Node::leaf(id, *text).with_embedding("m", vector.to_vec()));
        }
        nodes.insert(
            4,
            Node::new(4, "Cinderella suffered at home.", BTreeSet::from([0, 1]))
                .with_embedding("m", vec![1.0, 0.05, 0.0]),
        );
        nodes.insert(
            5,
            Node::new(5, "Magic and a prince changed her life.", BTreeSet::from([2, 3]))
                .with_embedding("m", vec![0.0, 0.7, 0.7]),
        );
        nodes.insert(
            6,
            Node::new(6, "The story of Cinderella.", BTreeSet::from([4, 5]))
                .with_embedding("m", vec![0.5, 0.5, 0.5]),
        );

        Tree::new(nodes, vec![vec![0, 1, 2, 3], vec![4, 5], vec![6]]).unwrap()
    }

    #[test]
    fn test_roots_and_leaves_follow_layers() {
        let tree = sample_tree();

        assert_eq!(tree.num_layers(), 2);
        assert_eq!(tree.root_nodes(), &BTreeSet::from([6]));
        assert_eq!(tree.leaf_nodes(), &BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(tree.layer_of(5), Some(1));
        assert_eq!(tree.layer(7), &[] as &[NodeId]);
    }

    #[test]
    fn test_node_in_two_layers_rejected() {
        let tree = sample_tree();
        let mut layers = tree.layer_to_nodes().to_vec();
        layers[1].push(0);

        let err = Tree::new(tree.all_nodes().clone(), layers).unwrap_err();
        assert!(matches!(err, TreeError::InvalidTree(_)));
    }

    #[test]
    fn test_children_must_be_below() {
        let tree = sample_tree();
        let mut nodes = tree.all_nodes().clone();
        if let Some(node) = nodes.get_mut(&4) {
            node.children = BTreeSet::from([0, 5]);
        }

        assert!(Tree::new(nodes, tree.layer_to_nodes().to_vec()).is_err());
    }

    #[test]
    fn test_orphan_node_rejected() {
        let tree = sample_tree();
        let mut nodes = tree.all_nodes().clone();
        nodes.insert(9, Node::leaf(9, "stray"));

        assert!(Tree::new(nodes, tree.layer_to_nodes().to_vec()).is_err());
    }

    #[test]
    fn test_mixed_embedding_dimensions_rejected() {
        let tree = sample_tree();
        let mut nodes = tree.all_nodes().clone();
        if let Some(node) = nodes.get_mut(&2) {
            node.embeddings.insert("m".to_string(), vec![1.0]);
        }

        assert!(Tree::new(nodes, tree.layer_to_nodes().to_vec()).is_err());
    }

    #[test]
    fn test_empty_tree_is_valid() {
        let tree = Tree::new(BTreeMap::new(), Vec::new()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.num_layers(), 0);
        assert!(tree.root_nodes().is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        approx::assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap(), 1.0);
        approx::assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 2.0]).unwrap(), 0.0);
        approx::assert_abs_diff_eq!(
            cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]).unwrap(),
            -1.0,
            epsilon = 1e-6
        );
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
    }

    #[test]
    fn test_cosine_similarity_rejects_unequal_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[1.0]), None);
    }
}
