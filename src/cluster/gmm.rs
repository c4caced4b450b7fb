//! Gaussian mixture model with diagonal covariances.
//!
//! Fitted by expectation-maximisation:
//!
//! **E-step**: responsibilities
//! ```text
//! γₙₖ = πₖ N(xₙ | μₖ, σ²ₖ) / Σⱼ πⱼ N(xₙ | μⱼ, σ²ⱼ)
//! ```
//!
//! **M-step**: weighted means, variances (plus `reg_covar`) and mixing weights.
//!
//! The number of components is chosen by sweeping candidate counts and
//! keeping the fit with the lowest Bayesian information criterion
//! `BIC = -2 ln L + p ln n`, where `p = 2kd + (k - 1)` free parameters.

use crate::error::ClusteringError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Unfitted mixture model parameters
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    n_components: usize,
    max_iter: usize,
    tol: f64,
    seed: u64,
    reg_covar: f64,
}

impl GaussianMixture {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            max_iter: 100,
            tol: 1e-3,
            seed: 0,
            reg_covar: 1e-6,
        }
    }

    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Stop once the mean per-sample log-likelihood gain drops below `tol`
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Fit the configured number of components (capped at the sample count)
    pub fn fit(&self, data: &Array2<f64>) -> Result<FittedMixture, ClusteringError> {
        let (n, d) = data.dim();
        if n == 0 || d == 0 {
            return Err(ClusteringError::InvalidParameter {
                name: "data",
                message: "must be non-empty".to_string(),
            });
        }
        if self.n_components == 0 {
            return Err(ClusteringError::InvalidParameter {
                name: "n_components",
                message: "must be > 0".to_string(),
            });
        }

        let k = self.n_components.min(n);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut means = init_means(data, k, &mut rng);

        // Variances: data variance per dimension
        let spread = data.var_axis(Axis(0), 0.0);
        let mut variances = Array2::from_shape_fn((k, d), |(_, j)| spread[j] + self.reg_covar);

        let mut weights = Array1::from_elem(k, 1.0 / k as f64);

        let mut previous = f64::NEG_INFINITY;
        for iter in 0..self.max_iter {
            let log_probs = weighted_log_probs(data, &weights, &means, &variances);
            let (resp, log_likelihood) = normalize_log_probs(&log_probs);
            if !log_likelihood.is_finite() {
                return Err(ClusteringError::NonFiniteLikelihood);
            }

            self.m_step(data, &resp, &mut weights, &mut means, &mut variances);

            if (log_likelihood - previous).abs() / (n as f64) < self.tol {
                debug!("Mixture with {} components converged after {} iterations", k, iter + 1);
                break;
            }
            previous = log_likelihood;
        }

        let (_, log_likelihood) = normalize_log_probs(&weighted_log_probs(data, &weights, &means, &variances));
        if !log_likelihood.is_finite() {
            return Err(ClusteringError::NonFiniteLikelihood);
        }

        Ok(FittedMixture {
            weights,
            means,
            variances,
            log_likelihood,
            n_samples: n,
        })
    }

    /// Fit every component count in `1..=max_components` (also capped below
    /// the sample count) and keep the one with the lowest BIC. Ties go to
    /// fewer components.
    pub fn fit_by_bic(&self, data: &Array2<f64>, max_components: usize) -> Result<FittedMixture, ClusteringError> {
        let n = data.nrows();
        let upper = max_components.min(n.saturating_sub(1)).max(1);

        let mut best: Option<(f64, FittedMixture)> = None;
        for k in 1..=upper {
            let fitted = self.clone().with_n_components(k).fit(data)?;
            let bic = fitted.bic();
            if best.as_ref().map_or(true, |(lowest, _)| bic < *lowest) {
                best = Some((bic, fitted));
            }
        }

        let (bic, fitted) = best.ok_or(ClusteringError::NonFiniteLikelihood)?;
        debug!(
            "Selected {} mixture components for {} samples (BIC {:.3})",
            fitted.n_components(),
            n,
            bic
        );
        Ok(fitted)
    }

    fn m_step(
        &self,
        data: &Array2<f64>,
        resp: &Array2<f64>,
        weights: &mut Array1<f64>,
        means: &mut Array2<f64>,
        variances: &mut Array2<f64>,
    ) {
        let (n, d) = data.dim();
        let k = weights.len();
        let resp_sum = resp.sum_axis(Axis(0));

        for c in 0..k {
            weights[c] = resp_sum[c] / n as f64;

            // Components nobody is responsible for keep their parameters
            if resp_sum[c] <= 1e-10 {
                continue;
            }

            let mut mean = Array1::<f64>::zeros(d);
            for i in 0..n {
                mean.scaled_add(resp[[i, c]], &data.row(i));
            }
            mean /= resp_sum[c];

            let mut variance = Array1::<f64>::zeros(d);
            for i in 0..n {
                let diff = &data.row(i) - &mean;
                variance.scaled_add(resp[[i, c]], &diff.mapv(|x| x * x));
            }
            variance /= resp_sum[c];
            variance += self.reg_covar;

            means.row_mut(c).assign(&mean);
            variances.row_mut(c).assign(&variance);
        }
    }
}

impl Default for GaussianMixture {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Mixture parameters after EM
#[derive(Debug, Clone)]
pub struct FittedMixture {
    weights: Array1<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
    log_likelihood: f64,
    n_samples: usize,
}

impl FittedMixture {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Total log-likelihood of the training data
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Bayesian information criterion of the fit
    pub fn bic(&self) -> f64 {
        let k = self.means.nrows() as f64;
        let d = self.means.ncols() as f64;
        let parameters = 2.0 * k * d + (k - 1.0);
        -2.0 * self.log_likelihood + parameters * (self.n_samples as f64).ln()
    }

    /// Posterior membership probabilities, one row per sample
    pub fn predict_proba(&self, data: &Array2<f64>) -> Array2<f64> {
        let log_probs = weighted_log_probs(data, &self.weights, &self.means, &self.variances);
        normalize_log_probs(&log_probs).0
    }
}

/// k-means++ seeding: first mean uniform, the rest sampled proportionally to
/// squared distance from the closest mean chosen so far
fn init_means(data: &Array2<f64>, k: usize, rng: &mut impl Rng) -> Array2<f64> {
    let (n, d) = data.dim();
    let mut means = Array2::zeros((k, d));
    means.row_mut(0).assign(&data.row(rng.gen_range(0..n)));

    for c in 1..k {
        let distances: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|point| {
                (0..c)
                    .map(|prev| {
                        let diff = &point - &means.row(prev);
                        diff.dot(&diff)
                    })
                    .fold(f64::MAX, f64::min)
            })
            .collect();

        let total: f64 = distances.iter().sum();
        let selected = if total > 0.0 {
            let threshold = rng.gen::<f64>() * total;
            let mut cumsum = 0.0;
            distances
                .iter()
                .position(|dist| {
                    cumsum += dist;
                    cumsum >= threshold
                })
                .unwrap_or(n - 1)
        } else {
            rng.gen_range(0..n)
        };
        means.row_mut(c).assign(&data.row(selected));
    }

    means
}

/// `ln πₖ + ln N(xₙ | μₖ, σ²ₖ)` for every sample and component
fn weighted_log_probs(
    data: &Array2<f64>,
    weights: &Array1<f64>,
    means: &Array2<f64>,
    variances: &Array2<f64>,
) -> Array2<f64> {
    let n = data.nrows();
    let k = weights.len();
    Array2::from_shape_fn((n, k), |(i, c)| {
        weights[c].ln() + log_gaussian(data.row(i), means.row(c), variances.row(c))
    })
}

/// Responsibilities and total log-likelihood from weighted log densities
fn normalize_log_probs(log_probs: &Array2<f64>) -> (Array2<f64>, f64) {
    let mut resp = log_probs.clone();
    let mut total = 0.0;
    for mut row in resp.rows_mut() {
        let norm = logsumexp(row.view());
        total += norm;
        row.mapv_inplace(|v| (v - norm).exp());
    }
    (resp, total)
}

fn log_gaussian(point: ArrayView1<'_, f64>, mean: ArrayView1<'_, f64>, var: ArrayView1<'_, f64>) -> f64 {
    let d = point.len() as f64;
    let mut log_prob = -0.5 * d * (2.0 * std::f64::consts::PI).ln();
    for ((x, m), v) in point.iter().zip(mean.iter()).zip(var.iter()) {
        let diff = x - m;
        log_prob -= 0.5 * v.ln();
        log_prob -= 0.5 * diff * diff / v;
    }
    log_prob
}

fn logsumexp(values: ArrayView1<'_, f64>) -> f64 {
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val + values.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.00, 0.05],
            [0.07, 0.00],
            [0.03, 0.11],
            [0.12, 0.06],
            [0.05, 0.03],
            [0.09, 0.09],
            [5.02, 4.96],
            [4.93, 5.08],
            [5.11, 5.01],
            [4.98, 4.91],
            [5.06, 5.12],
            [4.95, 5.04],
        ]
    }

    #[test]
    fn test_separates_blobs() {
        let data = two_blobs();
        let fitted = GaussianMixture::new(2).with_seed(224).fit(&data).unwrap();
        let proba = fitted.predict_proba(&data);

        let label = |i: usize| if proba[[i, 0]] > proba[[i, 1]] { 0 } else { 1 };
        assert!((0..6).all(|i| label(i) == label(0)));
        assert!((6..12).all(|i| label(i) == label(6)));
        assert_ne!(label(0), label(6));
    }

    #[test]
    fn test_responsibilities_sum_to_one() {
        let data = array![[0.0], [2.5], [5.0]];
        let fitted = GaussianMixture::new(2).with_seed(1).fit(&data).unwrap();

        for row in fitted.predict_proba(&data).rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(fitted.weights().sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bic_prefers_two_components_for_two_blobs() {
        let fitted = GaussianMixture::default()
            .with_seed(224)
            .fit_by_bic(&two_blobs(), 4)
            .unwrap();

        assert_eq!(fitted.n_components(), 2);
    }

    #[test]
    fn test_sweep_capped_below_sample_count() {
        let data = array![[0.0, 1.0], [1.0, 0.0]];
        let fitted = GaussianMixture::default().fit_by_bic(&data, 50).unwrap();

        assert_eq!(fitted.n_components(), 1);
    }

    #[test]
    fn test_zero_components_rejected() {
        let err = GaussianMixture::new(0).fit(&two_blobs()).unwrap_err();
        assert!(matches!(err, ClusteringError::InvalidParameter { name: "n_components", .. }));
    }
}
