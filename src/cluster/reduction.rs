//! Dimensionality reduction ahead of mixture fitting.
//!
//! Embeddings are L2-normalised, centred and projected onto their leading
//! principal axes. Axes are found by power iteration with deflation, so only
//! matrix-vector products over the data are needed and no `d x d` covariance
//! is ever materialised.

use crate::error::ClusteringError;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CONVERGENCE_TOL: f64 = 1e-10;
const MIN_VARIANCE: f64 = 1e-12;

/// Stack embedding rows into an L2-normalised matrix
pub fn normalized_matrix(rows: &[&[f32]]) -> Result<Array2<f64>, ClusteringError> {
    let n = rows.len();
    let d = rows.first().map_or(0, |row| row.len());
    if d == 0 {
        return Err(ClusteringError::InvalidParameter {
            name: "embedding",
            message: "must have at least one dimension".to_string(),
        });
    }

    let mut flat = Vec::with_capacity(n * d);
    for row in rows {
        if row.len() != d {
            return Err(ClusteringError::DimensionMismatch {
                expected: d,
                found: row.len(),
            });
        }
        let norm = row.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        let scale = if norm > 0.0 { norm.recip() } else { 1.0 };
        flat.extend(row.iter().map(|v| *v as f64 * scale));
    }

    if flat.iter().any(|v| !v.is_finite()) {
        return Err(ClusteringError::InvalidParameter {
            name: "embedding",
            message: "contains non-finite values".to_string(),
        });
    }

    Array2::from_shape_vec((n, d), flat).map_err(|e| ClusteringError::InvalidParameter {
        name: "embedding",
        message: e.to_string(),
    })
}

/// Principal component projection
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    max_iter: usize,
    seed: u64,
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 200,
            seed: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Project `data` onto at most `n_components` principal axes.
    ///
    /// Axes carrying no variance are dropped; data with no variance at all
    /// projects onto a single zero column.
    pub fn fit_transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let (n, d) = data.dim();
        let mean = data.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        let centered = data - &mean;

        let target = self.n_components.min(d).max(1);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut axes: Vec<Array1<f64>> = Vec::with_capacity(target);

        while axes.len() < target {
            let start = Array1::from_shape_fn(d, |_| rng.gen::<f64>() - 0.5);
            let Some(axis) = self.leading_axis(&centered, start, &axes) else {
                break;
            };
            let variance = centered.dot(&axis).mapv(|x| x * x).sum();
            if variance <= MIN_VARIANCE {
                break;
            }
            axes.push(axis);
        }

        if axes.is_empty() {
            return Array2::zeros((n, 1));
        }

        let basis = Array2::from_shape_fn((d, axes.len()), |(i, j)| axes[j][i]);
        centered.dot(&basis)
    }

    /// Dominant eigenvector of `XᵀX` orthogonal to `found`
    fn leading_axis(
        &self,
        centered: &Array2<f64>,
        start: Array1<f64>,
        found: &[Array1<f64>],
    ) -> Option<Array1<f64>> {
        let mut axis = unit(orthogonalize(start, found))?;

        for _ in 0..self.max_iter {
            let next = centered.t().dot(&centered.dot(&axis));
            let next = unit(orthogonalize(next, found))?;
            let delta = (&next - &axis).mapv(f64::abs).sum();
            axis = next;
            if delta < CONVERGENCE_TOL {
                break;
            }
        }

        // Sign convention: largest coordinate positive
        let pivot = axis
            .iter()
            .enumerate()
            .fold((0, 0.0f64), |best, (i, v)| if v.abs() > best.1 { (i, v.abs()) } else { best })
            .0;
        if axis[pivot] < 0.0 {
            axis.mapv_inplace(|v| -v);
        }
        Some(axis)
    }
}

fn orthogonalize(mut v: Array1<f64>, basis: &[Array1<f64>]) -> Array1<f64> {
    for b in basis {
        let projection = v.dot(b);
        v.scaled_add(-projection, b);
    }
    v
}

fn unit(v: Array1<f64>) -> Option<Array1<f64>> {
    let norm = v.dot(&v).sqrt();
    if norm <= MIN_VARIANCE || !norm.is_finite() {
        None
    } else {
        Some(v / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_rows_are_normalized() {
        let a = [3.0f32, 4.0];
        let b = [0.0f32, 2.0];
        let m = normalized_matrix(&[&a, &b]).unwrap();

        assert_abs_diff_eq!(m[[0, 0]], 0.6, epsilon = 1e-9);
        assert_abs_diff_eq!(m[[0, 1]], 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(m[[1, 1]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let a = [1.0f32, 0.0];
        let b = [1.0f32];
        assert_eq!(
            normalized_matrix(&[&a, &b]),
            Err(ClusteringError::DimensionMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn test_leading_axis_follows_spread() {
        // Points spread along x, barely along y
        let data = array![[-2.0, 0.01], [-1.0, -0.01], [0.0, 0.0], [1.0, 0.01], [2.0, -0.01]];
        let projected = Pca::new(1).with_seed(7).fit_transform(&data);

        assert_eq!(projected.dim(), (5, 1));
        assert_abs_diff_eq!(projected[[0, 0]], -2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(projected[[4, 0]], 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_rank_deficient_input_drops_axes() {
        let data = array![[1.0, 1.0, 0.0], [2.0, 2.0, 0.0], [3.0, 3.0, 0.0]];
        let projected = Pca::new(3).fit_transform(&data);

        assert_eq!(projected.ncols(), 1);
    }

    #[test]
    fn test_constant_input_projects_to_zero() {
        let data = array![[0.5, 0.5], [0.5, 0.5]];
        let projected = Pca::new(2).fit_transform(&data);

        assert_eq!(projected, Array2::<f64>::zeros((2, 1)));
    }
}
