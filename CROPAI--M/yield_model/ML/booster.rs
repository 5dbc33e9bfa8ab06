//! Gradient-boosted regression trees with a squared-error objective.
//!
//! Each round fits a tree to the gradient of the current ensemble using
//! second-order leaf weights `-T_alpha(G) / (H + lambda)`, where `T_alpha`
//! soft-thresholds the gradient sum by `reg_alpha`. Splits are found by
//! exact greedy search and kept only when their gain exceeds `gamma`.

use rand::{rngs::SmallRng, seq::index, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::TrainingFailure,
    features::{FeatureImportance, FEATURE_COUNT},
};

/// Hyperparameters of one boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    /// Boosting rounds.
    pub n_estimators: usize,
    /// Maximum depth per tree.
    pub max_depth: usize,
    /// Shrinkage applied to every leaf weight.
    pub learning_rate: f64,
    /// Fraction of rows sampled per tree.
    pub subsample: f64,
    /// Fraction of features sampled per tree.
    pub colsample_bytree: f64,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// L1 regularisation on leaf weights.
    pub reg_alpha: f64,
    /// L2 regularisation on leaf weights.
    pub reg_lambda: f64,
    /// Minimum loss reduction to keep a split.
    pub gamma: f64,
    /// Row/column sampling seed.
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }
}

impl BoosterParams {
    /// Checks every parameter against its domain.
    pub fn validate(&self) -> Result<(), TrainingFailure> {
        let fail = |msg: String| Err(TrainingFailure::InvalidParams(msg));
        if self.n_estimators == 0 {
            return fail("n_estimators must be > 0".into());
        }
        if self.max_depth == 0 {
            return fail("max_depth must be > 0".into());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return fail(format!("learning_rate must be in (0, 1], got {}", self.learning_rate));
        }
        for (name, ratio) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return fail(format!("{name} must be in (0, 1], got {ratio}"));
            }
        }
        for (name, value) in [
            ("min_child_weight", self.min_child_weight),
            ("reg_alpha", self.reg_alpha),
            ("reg_lambda", self.reg_lambda),
            ("gamma", self.gamma),
        ] {
            if !value.is_finite() || value < 0.0 {
                return fail(format!("{name} must be >= 0, got {value}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        gain: f64,
    },
    Leaf {
        weight: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { weight } => return *weight,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree over the gradients of the current round. Hessians are all
/// 1 under squared error, so the hessian sum of a node is its row count.
struct TreeBuilder<'a> {
    rows: &'a [[f64; FEATURE_COUNT]],
    grad: &'a [f64],
    features: &'a [usize],
    params: &'a BoosterParams,
    nodes: Vec<TreeNode>,
}

impl TreeBuilder<'_> {
    fn build(mut self, indices: Vec<usize>) -> RegressionTree {
        self.grow(indices, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn grow(&mut self, mut indices: Vec<usize>, depth: usize) -> usize {
        let grad_sum: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let hess_sum = indices.len() as f64;

        let split = if depth < self.params.max_depth && indices.len() >= 2 {
            self.best_split(&mut indices, grad_sum, hess_sum)
        } else {
            None
        };

        let Some(split) = split else {
            let idx = self.nodes.len();
            self.nodes.push(TreeNode::Leaf {
                weight: self.params.learning_rate * self.leaf_weight(grad_sum, hess_sum),
            });
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { weight: 0.0 });
        let left_child = self.grow(left, depth + 1);
        let right_child = self.grow(right, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_child,
            right: right_child,
            gain: split.gain,
        };
        node_idx
    }

    fn best_split(
        &self,
        indices: &mut [usize],
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<SplitCandidate> {
        let parent_score = self.score(grad_sum, hess_sum);
        let min_child = self.params.min_child_weight;
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.features {
            indices.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));
            let mut left_grad = 0.0;
            for (pos, pair) in indices.windows(2).enumerate() {
                left_grad += self.grad[pair[0]];
                let here = self.rows[pair[0]][feature];
                let next = self.rows[pair[1]][feature];
                if here == next {
                    continue;
                }
                let left_hess = (pos + 1) as f64;
                let right_hess = hess_sum - left_hess;
                if left_hess < min_child || right_hess < min_child {
                    continue;
                }
                let gain = 0.5
                    * (self.score(left_grad, left_hess)
                        + self.score(grad_sum - left_grad, right_hess)
                        - parent_score);
                if gain - self.params.gamma <= 0.0 {
                    continue;
                }
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn score(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        let g = soft_threshold(grad_sum, self.params.reg_alpha);
        g * g / (hess_sum + self.params.reg_lambda)
    }

    fn leaf_weight(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        let denom = hess_sum + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -soft_threshold(grad_sum, self.params.reg_alpha) / denom
    }
}

fn soft_threshold(value: f64, alpha: f64) -> f64 {
    if value > alpha {
        value - alpha
    } else if value < -alpha {
        value + alpha
    } else {
        0.0
    }
}

fn sample_count(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).round() as usize).clamp(1, total)
}

/// Fitted ensemble mapping a 7-feature vector to a yield.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    params: BoosterParams,
    base_score: f64,
    trees: Vec<RegressionTree>,
    importance: FeatureImportance,
}

impl GradientBoostedRegressor {
    /// Fits an ensemble on row-major features and targets.
    pub fn fit(
        params: &BoosterParams,
        rows: &[[f64; FEATURE_COUNT]],
        targets: &[f64],
    ) -> Result<Self, TrainingFailure> {
        params.validate()?;
        if rows.is_empty() {
            return Err(TrainingFailure::InsufficientSamples {
                required: 1,
                actual: 0,
            });
        }
        if rows.len() != targets.len() {
            return Err(TrainingFailure::InvalidParams(format!(
                "{} feature rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }

        let n = rows.len();
        let mut rng = SmallRng::seed_from_u64(params.seed);
        let base_score = targets.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut gain_totals = [0.0; FEATURE_COUNT];
        let mut split_counts = [0usize; FEATURE_COUNT];

        let row_count = sample_count(n, params.subsample);
        let col_count = sample_count(FEATURE_COUNT, params.colsample_bytree);

        for _ in 0..params.n_estimators {
            for ((g, pred), target) in grad.iter_mut().zip(&predictions).zip(targets) {
                *g = pred - target;
            }
            let row_sample = if row_count < n {
                index::sample(&mut rng, n, row_count).into_vec()
            } else {
                (0..n).collect()
            };
            let mut features = if col_count < FEATURE_COUNT {
                index::sample(&mut rng, FEATURE_COUNT, col_count).into_vec()
            } else {
                (0..FEATURE_COUNT).collect()
            };
            features.sort_unstable();

            let tree = TreeBuilder {
                rows,
                grad: &grad,
                features: &features,
                params,
                nodes: Vec::new(),
            }
            .build(row_sample);

            for node in &tree.nodes {
                if let TreeNode::Split { feature, gain, .. } = node {
                    gain_totals[*feature] += gain;
                    split_counts[*feature] += 1;
                }
            }
            for (pred, row) in predictions.iter_mut().zip(rows) {
                *pred += tree.predict(row);
            }
            trees.push(tree);
        }

        let mut average_gain = [0.0; FEATURE_COUNT];
        for (slot, (total, count)) in average_gain
            .iter_mut()
            .zip(gain_totals.iter().zip(split_counts.iter()))
        {
            if *count > 0 {
                *slot = total / *count as f64;
            }
        }

        Ok(Self {
            params: *params,
            base_score,
            trees,
            importance: FeatureImportance::normalized(average_gain),
        })
    }

    /// Prediction for one feature vector.
    #[must_use]
    pub fn predict_one(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        self.base_score + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }

    /// Predictions for a batch of feature vectors.
    #[must_use]
    pub fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Average split gain per feature, normalised to sum to 1.
    #[must_use]
    pub const fn feature_importance(&self) -> FeatureImportance {
        self.importance
    }

    /// Hyperparameters the ensemble was fitted with.
    #[must_use]
    pub const fn params(&self) -> &BoosterParams {
        &self.params
    }

    /// Number of fitted trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classical_ml::func::r2_score, features::Feature};
    use rand::Rng;

    fn linear_data(n: usize) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        let mut rng = SmallRng::seed_from_u64(3);
        let rows: Vec<[f64; FEATURE_COUNT]> = (0..n)
            .map(|_| std::array::from_fn(|_| rng.gen_range(0.0..10.0)))
            .collect();
        let targets = rows.iter().map(|r| 100.0 * r[6] + 5.0 * r[0]).collect();
        (rows, targets)
    }

    fn small_params() -> BoosterParams {
        BoosterParams {
            n_estimators: 60,
            max_depth: 3,
            learning_rate: 0.2,
            ..BoosterParams::default()
        }
    }

    #[test]
    fn fits_dominant_feature() {
        let (rows, targets) = linear_data(200);
        let model = GradientBoostedRegressor::fit(&small_params(), &rows, &targets).unwrap();
        let r2 = r2_score(&model.predict(&rows), &targets);
        assert!(r2 > 0.9, "r2 = {r2}");
        assert_eq!(model.feature_importance().top(), Feature::Rainfall);
        assert_eq!(model.n_trees(), 60);
    }

    #[test]
    fn constant_target_predicts_constant() {
        let (rows, _) = linear_data(30);
        let targets = vec![1500.0; rows.len()];
        let model = GradientBoostedRegressor::fit(&small_params(), &rows, &targets).unwrap();
        assert!((model.predict_one(&rows[0]) - 1500.0).abs() < 1e-9);
        assert_eq!(model.feature_importance().as_array(), &[0.0; FEATURE_COUNT]);
    }

    #[test]
    fn subsampled_fit_is_reproducible() {
        let (rows, targets) = linear_data(120);
        let params = BoosterParams {
            subsample: 0.6,
            colsample_bytree: 0.6,
            ..small_params()
        };
        let a = GradientBoostedRegressor::fit(&params, &rows, &targets).unwrap();
        let b = GradientBoostedRegressor::fit(&params, &rows, &targets).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn large_gamma_prunes_every_split() {
        let (rows, targets) = linear_data(50);
        let params = BoosterParams {
            gamma: 1e15,
            ..small_params()
        };
        let model = GradientBoostedRegressor::fit(&params, &rows, &targets).unwrap();
        let mean = targets.iter().sum::<f64>() / targets.len() as f64;
        assert!((model.predict_one(&rows[0]) - mean).abs() < 1e-6);
    }

    #[test]
    fn rejects_invalid_params_and_shapes() {
        let (rows, targets) = linear_data(10);
        let bad = BoosterParams {
            subsample: 0.0,
            ..BoosterParams::default()
        };
        assert!(matches!(
            GradientBoostedRegressor::fit(&bad, &rows, &targets),
            Err(TrainingFailure::InvalidParams(_))
        ));
        assert!(GradientBoostedRegressor::fit(&small_params(), &rows, &targets[..5]).is_err());
        assert!(matches!(
            GradientBoostedRegressor::fit(&small_params(), &[], &[]),
            Err(TrainingFailure::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn soft_threshold_shrinks_toward_zero() {
        assert_eq!(soft_threshold(5.0, 1.0), 4.0);
        assert_eq!(soft_threshold(-5.0, 1.0), -4.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }
}
