//! Global/local mixture clustering of one tree layer.
//!
//! A global pass fits a mixture over the whole (reduced) layer; each global
//! cluster larger than the minimum clustering size is then reduced and fitted
//! again on its own. Clusters whose members exceed the token budget are
//! clustered again, down to a bounded recursion depth.

use super::gmm::GaussianMixture;
use super::reduction::{normalized_matrix, Pca};
use super::{ClusterItem, Clusterer, Membership, Selection};
use crate::config::ClusteringConfig;
use crate::error::ClusteringError;
use crate::tree::NodeId;
use ndarray::{Array2, Axis};
use tracing::debug;

/// Soft clusterer used by the tree builder
#[derive(Debug, Clone)]
pub struct RaptorClustering {
    config: ClusteringConfig,
}

impl RaptorClustering {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Reduce `data`, fit the BIC-selected mixture and pick clusters per row.
    /// Returns the component count and each row's chosen components.
    fn soft_assign(&self, data: &Array2<f64>, selection: Selection) -> Result<(usize, Vec<Vec<usize>>), ClusteringError> {
        let n = data.nrows();
        let components = self.config.reduction_dimension.min(n.saturating_sub(2)).max(1);
        let reduced = Pca::new(components).with_seed(self.config.seed).fit_transform(data);

        let mixture = GaussianMixture::default()
            .with_max_iter(self.config.max_iter)
            .with_seed(self.config.seed)
            .fit_by_bic(&reduced, self.config.max_clusters)?;

        let probabilities = mixture.predict_proba(&reduced);
        let assignments = probabilities
            .rows()
            .into_iter()
            .map(|row| selection.select(&row.to_vec()))
            .collect();

        Ok((mixture.n_components(), assignments))
    }

    /// Clusters of row indices into `data`, in discovery order
    fn global_local(&self, data: &Array2<f64>, selection: Selection) -> Result<Vec<Vec<usize>>, ClusteringError> {
        let min_size = self.config.min_cluster_size();
        let (n_global, global) = self.soft_assign(data, selection)?;
        let mut clusters = Vec::new();

        for g in 0..n_global {
            let members: Vec<usize> = (0..data.nrows()).filter(|&i| global[i].contains(&g)).collect();
            if members.is_empty() {
                continue;
            }
            if members.len() <= min_size {
                clusters.push(members);
                continue;
            }

            let subset = data.select(Axis(0), &members);
            let (n_local, local) = self.soft_assign(&subset, selection)?;
            for l in 0..n_local {
                let local_members: Vec<usize> = local
                    .iter()
                    .enumerate()
                    .filter(|(_, chosen)| chosen.contains(&l))
                    .map(|(i, _)| members[i])
                    .collect();
                if !local_members.is_empty() {
                    clusters.push(local_members);
                }
            }
        }

        debug!(
            "Global pass found {} clusters, {} after local passes",
            n_global,
            clusters.len()
        );
        Ok(clusters)
    }

    fn cluster_at(&self, items: &[ClusterItem], selection: Selection, depth: usize) -> Result<Vec<Vec<NodeId>>, ClusteringError> {
        if items.len() <= self.config.min_cluster_size() {
            return Ok(vec![items.iter().map(|item| item.id).collect()]);
        }

        let rows: Vec<&[f32]> = items.iter().map(|item| item.embedding.as_slice()).collect();
        let data = normalized_matrix(&rows)?;

        let mut clusters = Vec::new();
        for members in self.global_local(&data, selection)? {
            let tokens: usize = members.iter().map(|&i| items[i].token_count).sum();
            let splittable = members.len() > 1 && members.len() < items.len();

            if tokens > self.config.max_tokens_per_cluster && splittable && depth < self.config.max_recursion_depth {
                debug!(
                    "Re-clustering {} nodes holding {} tokens (depth {})",
                    members.len(),
                    tokens,
                    depth + 1
                );
                let subset: Vec<ClusterItem> = members.iter().map(|&i| items[i].clone()).collect();
                clusters.extend(self.cluster_at(&subset, selection, depth + 1)?);
            } else {
                clusters.push(members.iter().map(|&i| items[i].id).collect());
            }
        }
        Ok(clusters)
    }
}

impl Clusterer for RaptorClustering {
    fn cluster(&self, items: &[ClusterItem], selection: Selection) -> Result<Membership, ClusteringError> {
        selection.validate()?;
        if items.is_empty() {
            return Ok(Membership::default());
        }

        let membership = Membership::from_clusters(self.cluster_at(items, selection, 0)?);
        debug!("Clustered {} nodes into {} clusters", items.len(), membership.len());
        Ok(membership)
    }
}
