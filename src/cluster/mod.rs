//! Soft clustering of embedded nodes

pub mod gmm;
pub mod raptor;
pub mod reduction;

pub use gmm::{FittedMixture, GaussianMixture};
pub use raptor::RaptorClustering;
pub use reduction::Pca;

use crate::config::SelectionMode;
use crate::error::ClusteringError;
use crate::tree::NodeId;
use std::collections::BTreeMap;

/// One node offered to the clusterer
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterItem {
    pub id: NodeId,
    pub embedding: Vec<f32>,
    pub token_count: usize,
}

/// How a node picks the clusters it joins from its membership probabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Every cluster with probability strictly above the cutoff
    Threshold(f64),
    /// The `k` most probable clusters
    TopK(usize),
}

impl Selection {
    pub fn new(mode: SelectionMode, threshold: f64, top_k: usize) -> Self {
        match mode {
            SelectionMode::Threshold => Selection::Threshold(threshold),
            SelectionMode::TopK => Selection::TopK(top_k),
        }
    }

    pub fn validate(&self) -> Result<(), ClusteringError> {
        match *self {
            Selection::Threshold(t) if !(0.0..=1.0).contains(&t) => Err(ClusteringError::InvalidParameter {
                name: "threshold",
                message: format!("{} is outside [0, 1]", t),
            }),
            Selection::TopK(0) => Err(ClusteringError::InvalidParameter {
                name: "top_k",
                message: "must be greater than 0".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Cluster indices chosen for one row of probabilities, ascending.
    ///
    /// Never empty for a non-empty row: when nothing survives, the single
    /// most probable cluster is kept. Equal probabilities favour the lower
    /// index.
    pub fn select(&self, probabilities: &[f64]) -> Vec<usize> {
        let by_probability = |a: &usize, b: &usize| {
            probabilities[*b].total_cmp(&probabilities[*a]).then(a.cmp(b))
        };

        let mut chosen: Vec<usize> = match *self {
            Selection::Threshold(cutoff) => (0..probabilities.len())
                .filter(|&c| probabilities[c] > cutoff)
                .collect(),
            Selection::TopK(k) => {
                let mut order: Vec<usize> = (0..probabilities.len()).collect();
                order.sort_by(by_probability);
                order.truncate(k);
                order
            }
        };

        if chosen.is_empty() {
            chosen.extend((0..probabilities.len()).min_by(by_probability));
        }
        chosen.sort_unstable();
        chosen
    }
}

/// Many-to-many relation between nodes and the clusters they joined.
///
/// Member lists are ascending and deduplicated; empty clusters and exact
/// duplicates of an earlier cluster are dropped. Cluster order is discovery
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    clusters: Vec<Vec<NodeId>>,
    by_node: BTreeMap<NodeId, Vec<usize>>,
}

impl Membership {
    pub fn from_clusters(clusters: impl IntoIterator<Item = Vec<NodeId>>) -> Self {
        let mut membership = Self::default();
        for mut members in clusters {
            members.sort_unstable();
            members.dedup();
            if members.is_empty() || membership.clusters.contains(&members) {
                continue;
            }

            let index = membership.clusters.len();
            for id in &members {
                membership.by_node.entry(*id).or_default().push(index);
            }
            membership.clusters.push(members);
        }
        membership
    }

    pub fn clusters(&self) -> &[Vec<NodeId>] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<Vec<NodeId>> {
        self.clusters
    }

    /// Indices of the clusters `node` belongs to
    pub fn clusters_of(&self, node: NodeId) -> &[usize] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node in `nodes` belongs to at least one cluster
    pub fn covers(&self, nodes: impl IntoIterator<Item = NodeId>) -> bool {
        nodes.into_iter().all(|id| !self.clusters_of(id).is_empty())
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Partitions embedded nodes into possibly overlapping groups
pub trait Clusterer: Send + Sync {
    fn cluster(&self, items: &[ClusterItem], selection: Selection) -> Result<Membership, ClusteringError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let selection = Selection::Threshold(0.3);
        assert_eq!(selection.select(&[0.3, 0.45, 0.25]), vec![1]);
        assert_eq!(selection.select(&[0.31, 0.69, 0.0]), vec![0, 1]);
    }

    #[test]
    fn test_nothing_above_threshold_keeps_best() {
        let selection = Selection::Threshold(0.9);
        assert_eq!(selection.select(&[0.2, 0.5, 0.3]), vec![1]);
        // Ties resolve to the lower index
        assert_eq!(selection.select(&[0.5, 0.5]), vec![0]);
    }

    #[test]
    fn test_top_k() {
        let selection = Selection::TopK(2);
        assert_eq!(selection.select(&[0.1, 0.4, 0.2, 0.3]), vec![1, 3]);
        assert_eq!(Selection::TopK(5).select(&[0.6, 0.4]), vec![0, 1]);
        assert_eq!(Selection::TopK(1).select(&[0.25, 0.25, 0.5]), vec![2]);
    }

    #[test]
    fn test_nan_probability_has_fixed_rank() {
        // NaN orders above every number rather than comparing equal to all
        let probabilities = [0.4, f64::NAN, 0.6, 0.5];
        assert_eq!(Selection::TopK(2).select(&probabilities), vec![1, 2]);
        assert_eq!(Selection::Threshold(0.99).select(&probabilities), vec![1]);
    }

    #[test]
    fn test_invalid_selection() {
        assert!(Selection::TopK(0).validate().is_err());
        assert!(Selection::Threshold(1.5).validate().is_err());
        assert!(Selection::Threshold(f64::NAN).validate().is_err());
        assert!(Selection::new(SelectionMode::Threshold, 0.1, 0).validate().is_ok());
    }

    #[test]
    fn test_membership_adjacency() {
        let membership = Membership::from_clusters(vec![vec![3, 1], vec![], vec![1, 2], vec![1, 3]]);

        assert_eq!(membership.clusters(), &[vec![1, 3], vec![1, 2]]);
        assert_eq!(membership.clusters_of(1), &[0, 1]);
        assert_eq!(membership.clusters_of(2), &[1]);
        assert!(membership.clusters_of(9).is_empty());
        assert!(membership.covers([1, 2, 3]));
        assert!(!membership.covers([4]));
    }
}
