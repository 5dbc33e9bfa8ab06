use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{rngs::SmallRng, seq::index, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    classical_ml::{
        booster::{BoosterParams, GradientBoostedRegressor},
        func::{kfold, r2_score},
    },
    error::{TrainingFailure, YieldResult},
    features::FEATURE_COUNT,
    telemetry::{emit, YieldTelemetry},
};

/// Discrete values tried for each hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSpace {
    /// Boosting rounds.
    pub n_estimators: Vec<usize>,
    /// Tree depth.
    pub max_depth: Vec<usize>,
    /// Shrinkage.
    pub learning_rate: Vec<f64>,
    /// Row sampling ratio.
    pub subsample: Vec<f64>,
    /// Column sampling ratio.
    pub colsample_bytree: Vec<f64>,
    /// Minimum child hessian.
    pub min_child_weight: Vec<f64>,
    /// L1 leaf regularisation.
    pub reg_alpha: Vec<f64>,
    /// L2 leaf regularisation.
    pub reg_lambda: Vec<f64>,
    /// Minimum split gain.
    pub gamma: Vec<f64>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![400, 300, 500, 800, 1200],
            max_depth: vec![3, 4, 5, 8, 10],
            learning_rate: vec![0.01, 0.05, 0.2],
            subsample: vec![0.9, 0.6, 0.8],
            colsample_bytree: vec![0.9, 0.6, 0.8],
            min_child_weight: vec![1.0, 3.0, 5.0, 7.0],
            reg_alpha: vec![0.0, 0.1, 0.5, 1.0],
            reg_lambda: vec![1.0, 1.5, 2.0, 3.0],
            gamma: vec![0.0, 0.1, 0.3, 0.5],
        }
    }
}

impl ParamSpace {
    fn dims(&self) -> [usize; 9] {
        [
            self.n_estimators.len(),
            self.max_depth.len(),
            self.learning_rate.len(),
            self.subsample.len(),
            self.colsample_bytree.len(),
            self.min_child_weight.len(),
            self.reg_alpha.len(),
            self.reg_lambda.len(),
            self.gamma.len(),
        ]
    }

    /// Number of distinct configurations.
    #[must_use]
    pub fn grid_size(&self) -> usize {
        self.dims().iter().product()
    }

    /// Rejects empty value lists and out-of-domain values.
    pub fn validate(&self) -> Result<(), TrainingFailure> {
        const NAMES: [&str; 9] = [
            "n_estimators",
            "max_depth",
            "learning_rate",
            "subsample",
            "colsample_bytree",
            "min_child_weight",
            "reg_alpha",
            "reg_lambda",
            "gamma",
        ];
        if let Some((name, _)) = NAMES.iter().zip(self.dims()).find(|(_, len)| *len == 0) {
            return Err(TrainingFailure::InvalidParams(format!(
                "search space for {name} is empty"
            )));
        }
        // Fields are validated independently, so one value at a time suffices.
        let mut params = BoosterParams::default();
        for &v in &self.n_estimators {
            params.n_estimators = v;
            params.validate()?;
        }
        for &v in &self.max_depth {
            params.max_depth = v;
            params.validate()?;
        }
        for &v in &self.learning_rate {
            params.learning_rate = v;
            params.validate()?;
        }
        for &v in &self.subsample {
            params.subsample = v;
            params.validate()?;
        }
        for &v in &self.colsample_bytree {
            params.colsample_bytree = v;
            params.validate()?;
        }
        for &v in &self.min_child_weight {
            params.min_child_weight = v;
            params.validate()?;
        }
        for &v in &self.reg_alpha {
            params.reg_alpha = v;
            params.validate()?;
        }
        for &v in &self.reg_lambda {
            params.reg_lambda = v;
            params.validate()?;
        }
        for &v in &self.gamma {
            params.gamma = v;
            params.validate()?;
        }
        Ok(())
    }

    /// Decodes a flat grid index into a configuration. The last dimension
    /// varies fastest.
    #[must_use]
    pub fn candidate(&self, mut flat: usize, seed: u64) -> BoosterParams {
        let dims = self.dims();
        let mut digits = [0usize; 9];
        for (digit, len) in digits.iter_mut().zip(dims.iter()).rev() {
            *digit = flat % len;
            flat /= len;
        }
        BoosterParams {
            n_estimators: self.n_estimators[digits[0]],
            max_depth: self.max_depth[digits[1]],
            learning_rate: self.learning_rate[digits[2]],
            subsample: self.subsample[digits[3]],
            colsample_bytree: self.colsample_bytree[digits[4]],
            min_child_weight: self.min_child_weight[digits[5]],
            reg_alpha: self.reg_alpha[digits[6]],
            reg_lambda: self.reg_lambda[digits[7]],
            gamma: self.gamma[digits[8]],
            seed,
        }
    }
}

/// Randomized-search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Configurations sampled from the grid.
    pub iterations: usize,
    /// Cross-validation folds.
    pub folds: usize,
    /// Held-out share of the dataset.
    pub test_ratio: f64,
    /// Seed for the split, the candidate draw, and every booster.
    pub seed: u64,
    /// Evaluate candidates on the rayon pool.
    pub parallel: bool,
    /// Grid sampled from.
    pub space: ParamSpace,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            folds: 3,
            test_ratio: 0.2,
            seed: 42,
            parallel: true,
            space: ParamSpace::default(),
        }
    }
}

impl SearchConfig {
    /// Validates fold count, ratio, iteration budget, and the grid.
    pub fn validate(&self) -> Result<(), TrainingFailure> {
        if self.iterations == 0 {
            return Err(TrainingFailure::InvalidParams(
                "search iterations must be > 0".into(),
            ));
        }
        if self.folds < 2 {
            return Err(TrainingFailure::InvalidParams(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.folds
            )));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(TrainingFailure::InvalidParams(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        self.space.validate()
    }
}

/// Cross-validated score of one sampled configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Position in the sampled candidate list.
    pub index: usize,
    /// Configuration evaluated.
    pub params: BoosterParams,
    /// R² per fold.
    pub fold_scores: Vec<f64>,
    /// Mean R² over folds.
    pub mean_r2: f64,
}

/// Result of a completed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Winning candidate.
    pub best: CandidateScore,
    /// Every candidate, in sampled order.
    pub candidates: Vec<CandidateScore>,
}

/// Randomized hyperparameter search with K-fold cross-validation.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    config: SearchConfig,
}

impl RandomizedSearch {
    /// Creates a search from its settings.
    #[must_use]
    pub const fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Samples `iterations` distinct configurations, or the whole grid when
    /// it is smaller.
    #[must_use]
    pub fn sample_candidates(&self) -> Vec<BoosterParams> {
        let space = &self.config.space;
        let grid = space.grid_size();
        let amount = self.config.iterations.min(grid);
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        index::sample(&mut rng, grid, amount)
            .into_iter()
            .map(|flat| space.candidate(flat, self.config.seed))
            .collect()
    }

    /// Scores every sampled configuration and picks the highest mean R².
    /// Ties go to the earliest sampled candidate, so the winner does not
    /// depend on evaluation order.
    pub fn run(
        &self,
        rows: &[[f64; FEATURE_COUNT]],
        targets: &[f64],
        telemetry: Option<&YieldTelemetry>,
    ) -> YieldResult<SearchOutcome> {
        self.config.validate()?;
        if rows.len() < self.config.folds {
            return Err(TrainingFailure::InsufficientSamples {
                required: self.config.folds,
                actual: rows.len(),
            }
            .into());
        }

        let candidates = self.sample_candidates();
        let folds: Vec<Fold> = kfold(rows.len(), self.config.folds)
            .into_iter()
            .map(|(train, validation)| Fold::gather(rows, targets, &train, &validation))
            .collect();
        emit(
            telemetry,
            LogLevel::Info,
            "search_started",
            json!({
                "candidates": candidates.len(),
                "folds": folds.len(),
                "grid_size": self.config.space.grid_size(),
                "parallel": self.config.parallel,
            }),
        );

        let completed = AtomicUsize::new(0);
        let step = (candidates.len() / 10).max(1);
        let total = candidates.len();
        let evaluate = |(index, params): (usize, &BoosterParams)| {
            let score = score_candidate(index, params, &folds);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Ok(score) = &score {
                emit(
                    telemetry,
                    LogLevel::Debug,
                    "search_candidate_scored",
                    json!({ "candidate": index, "mean_r2": score.mean_r2 }),
                );
            }
            if done % step == 0 || done == total {
                emit(
                    telemetry,
                    LogLevel::Info,
                    "search_progress",
                    json!({ "completed": done, "total": total }),
                );
            }
            score
        };

        let scored: Vec<CandidateScore> = if self.config.parallel {
            candidates
                .par_iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<_, _>>()?
        } else {
            candidates
                .iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<_, _>>()?
        };

        let best = select_best(&scored).clone();
        emit(
            telemetry,
            LogLevel::Info,
            "search_best",
            json!({
                "candidate": best.index,
                "mean_r2": best.mean_r2,
                "params": best.params,
            }),
        );
        Ok(SearchOutcome {
            best,
            candidates: scored,
        })
    }
}

/// Highest finite mean R²; ties keep the lowest index.
fn select_best(scored: &[CandidateScore]) -> &CandidateScore {
    let key = |c: &CandidateScore| {
        if c.mean_r2.is_finite() {
            c.mean_r2
        } else {
            f64::NEG_INFINITY
        }
    };
    scored
        .iter()
        .skip(1)
        .fold(&scored[0], |best, c| if key(c) > key(best) { c } else { best })
}

struct Fold {
    train_rows: Vec<[f64; FEATURE_COUNT]>,
    train_targets: Vec<f64>,
    valid_rows: Vec<[f64; FEATURE_COUNT]>,
    valid_targets: Vec<f64>,
}

impl Fold {
    fn gather(
        rows: &[[f64; FEATURE_COUNT]],
        targets: &[f64],
        train: &[usize],
        validation: &[usize],
    ) -> Self {
        Self {
            train_rows: train.iter().map(|&i| rows[i]).collect(),
            train_targets: train.iter().map(|&i| targets[i]).collect(),
            valid_rows: validation.iter().map(|&i| rows[i]).collect(),
            valid_targets: validation.iter().map(|&i| targets[i]).collect(),
        }
    }
}

fn score_candidate(
    index: usize,
    params: &BoosterParams,
    folds: &[Fold],
) -> Result<CandidateScore, TrainingFailure> {
    let fold_scores = folds
        .iter()
        .map(|fold| {
            let model =
                GradientBoostedRegressor::fit(params, &fold.train_rows, &fold.train_targets)?;
            Ok(r2_score(&model.predict(&fold.valid_rows), &fold.valid_targets))
        })
        .collect::<Result<Vec<f64>, TrainingFailure>>()?;
    let mean_r2 = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
    Ok(CandidateScore {
        index,
        params: *params,
        fold_scores,
        mean_r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn compact_space() -> ParamSpace {
        ParamSpace {
            n_estimators: vec![20, 40],
            max_depth: vec![2, 3],
            learning_rate: vec![0.1, 0.3],
            subsample: vec![1.0, 0.8],
            colsample_bytree: vec![1.0],
            min_child_weight: vec![1.0],
            reg_alpha: vec![0.0],
            reg_lambda: vec![1.0],
            gamma: vec![0.0],
        }
    }

    fn data(n: usize) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        let mut rng = SmallRng::seed_from_u64(11);
        let rows: Vec<[f64; FEATURE_COUNT]> = (0..n)
            .map(|_| std::array::from_fn(|_| rng.gen_range(0.0..10.0)))
            .collect();
        let targets = rows.iter().map(|r| 50.0 * r[3] + 20.0 * r[5]).collect();
        (rows, targets)
    }

    fn config(parallel: bool) -> SearchConfig {
        SearchConfig {
            iterations: 6,
            parallel,
            space: compact_space(),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn default_space_matches_reference_grid() {
        let space = ParamSpace::default();
        assert_eq!(space.grid_size(), 5 * 5 * 3 * 3 * 3 * 4 * 4 * 4 * 4);
        assert!(space.validate().is_ok());
        let first = space.candidate(0, 42);
        assert_eq!(first.n_estimators, 400);
        assert_eq!(first.gamma, 0.0);
        let last = space.candidate(space.grid_size() - 1, 42);
        assert_eq!(last.n_estimators, 1200);
        assert_eq!(last.gamma, 0.5);
        assert_eq!(space.candidate(1, 42).gamma, 0.1);
    }

    #[test]
    fn sampled_candidates_are_distinct_and_capped_by_grid() {
        let search = RandomizedSearch::new(SearchConfig {
            iterations: 200,
            space: compact_space(),
            ..SearchConfig::default()
        });
        let candidates = search.sample_candidates();
        assert_eq!(candidates.len(), 16);
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            RandomizedSearch::new(SearchConfig::default())
                .sample_candidates()
                .len(),
            200
        );
    }

    #[test]
    fn parallel_and_sequential_pick_same_winner() {
        let (rows, targets) = data(90);
        let parallel = RandomizedSearch::new(config(true))
            .run(&rows, &targets, None)
            .unwrap();
        let sequential = RandomizedSearch::new(config(false))
            .run(&rows, &targets, None)
            .unwrap();
        assert_eq!(parallel.best, sequential.best);
        assert_eq!(parallel.candidates, sequential.candidates);
        assert_eq!(parallel.candidates.len(), 6);
        assert!(parallel.best.mean_r2 > 0.3);
        assert_eq!(parallel.best.fold_scores.len(), 3);
    }

    #[test]
    fn ties_resolve_to_first_index() {
        let make = |index, mean_r2| CandidateScore {
            index,
            params: BoosterParams::default(),
            fold_scores: vec![mean_r2],
            mean_r2,
        };
        let scored = vec![make(0, 0.5), make(1, 0.9), make(2, 0.9), make(3, f64::NAN)];
        assert_eq!(select_best(&scored).index, 1);
    }

    #[test]
    fn rejects_bad_settings() {
        let (rows, targets) = data(10);
        let one_fold = SearchConfig {
            folds: 1,
            ..config(false)
        };
        assert!(RandomizedSearch::new(one_fold)
            .run(&rows, &targets, None)
            .is_err());
        let mut empty = config(false);
        empty.space.gamma.clear();
        assert!(matches!(
            empty.validate(),
            Err(TrainingFailure::InvalidParams(msg)) if msg.contains("gamma")
        ));
    }
}
