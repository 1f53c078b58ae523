//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::marker::PhantomData;

/// How a bounded iterative estimator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Termination {
    /// The estimator's convergence predicate was satisfied.
    Converged,
    /// The iteration budget ran out first; the best-so-far result was kept.
    MaxIterations,
}

impl Termination {
    pub fn converged(&self) -> bool {
        matches!(self, Termination::Converged)
    }
}

/// Configuration for robust estimation
#[derive(Debug, Clone)]
pub struct RobustConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    /// Probability of having drawn at least one outlier-free sample.
    /// Drives the adaptive stopping test.
    pub confidence: f64,
    pub min_sample_size: usize,
    /// Fixed RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            min_sample_size: 4,
            seed: Some(42),
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    pub residual: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl<M> RobustResult<M> {
    fn failed(n: usize, iterations: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
            iterations,
            termination: Termination::MaxIterations,
        }
    }

    pub fn inlier_indices(&self) -> Vec<usize> {
        self.inliers
            .iter()
            .enumerate()
            .filter(|(_, &is_inlier)| is_inlier)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;

    /// Re-fit the winning model over its full inlier set.
    /// The default keeps the minimal-sample model.
    fn refine(&self, _model: &Self::Model, _inliers: &[&D]) -> Option<Self::Model> {
        None
    }
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        &self.config
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult::failed(n, 0);
        }

        let mut best_model = None;
        let mut best_inliers = vec![false; n];
        let mut best_num_inliers = 0;
        let mut best_residual = f64::INFINITY;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Samples the best inlier ratio so far calls for, not capped by the budget
        let mut required = f64::INFINITY;
        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        while iterations < self.config.max_iterations {
            if (iterations as f64) >= required {
                termination = Termination::Converged;
                break;
            }
            iterations += 1;

            // 1. Sample
            let picked = rand::seq::index::sample(&mut rng, n, k);
            let sample: Vec<&D> = picked.iter().map(|i| &data[i]).collect();

            // 2. Estimate
            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };

            // 3. Score
            let mut inliers = vec![false; n];
            let mut num_inliers = 0;
            let mut total_error = 0.0;

            for (j, d) in data.iter().enumerate() {
                let err = estimator.compute_error(&model, d);
                if err < self.config.threshold {
                    inliers[j] = true;
                    num_inliers += 1;
                    total_error += err;
                }
            }

            let residual = if num_inliers > 0 {
                total_error / num_inliers as f64
            } else {
                f64::INFINITY
            };

            if num_inliers > best_num_inliers
                || (num_inliers == best_num_inliers && num_inliers > 0 && residual < best_residual)
            {
                best_num_inliers = num_inliers;
                best_inliers = inliers;
                best_model = Some(model);
                best_residual = residual;

                required = adaptive_iterations(best_num_inliers as f64 / n as f64, k, self.config.confidence);
            }
        }

        if (iterations as f64) >= required {
            termination = Termination::Converged;
        }

        let Some(model) = best_model else {
            return RobustResult::failed(n, iterations);
        };

        let inlier_refs: Vec<&D> = data
            .iter()
            .zip(&best_inliers)
            .filter(|(_, &is_inlier)| is_inlier)
            .map(|(d, _)| d)
            .collect();
        let model = estimator.refine(&model, &inlier_refs).unwrap_or(model);

        RobustResult {
            model: Some(model),
            inliers: best_inliers,
            num_inliers: best_num_inliers,
            residual: best_residual,
            iterations,
            termination,
        }
    }
}

/// Number of samples needed to draw one all-inlier sample with probability
/// `confidence`, given the current inlier ratio. Infinite when no sample can
/// be expected to be all inliers.
fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> f64 {
    let p_good = inlier_ratio.powi(sample_size as i32);
    if p_good <= f64::EPSILON {
        return f64::INFINITY;
    }
    if p_good >= 1.0 - f64::EPSILON {
        return 1.0;
    }
    let required = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    required.max(1.0)
}
