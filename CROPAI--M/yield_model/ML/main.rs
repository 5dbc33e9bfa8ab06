//! Yield regression: boosted trees, randomized search, evaluation.

/// Gradient-boosted regression trees.
pub mod booster;
/// Splitting and scoring helpers.
pub mod func;
/// Persistable fitted model.
pub mod model;
/// Reporting utilities.
pub mod reporter;
/// Randomized hyperparameter search.
pub mod search;

use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    error::{TrainingFailure, YieldResult},
    prep::dataset::Dataset,
    telemetry::{emit, YieldTelemetry},
};
use booster::GradientBoostedRegressor;
use func::{r2_score, root_mean_squared_error, test_size, train_test_split};
use model::{ModelMetrics, TrainedModel, DEFAULT_YIELD_CEILING};
use reporter::TrainingReport;
use search::{RandomizedSearch, SearchConfig};

/// Fitted model together with its report.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Model ready for inference or persistence.
    pub model: TrainedModel,
    /// Metrics and winning configuration.
    pub report: TrainingReport,
}

/// Split, search, refit, evaluate.
#[derive(Debug, Clone, Default)]
pub struct YieldTrainer {
    config: SearchConfig,
}

impl YieldTrainer {
    /// Creates a trainer with the given search settings.
    #[must_use]
    pub const fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Search settings.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Trains without telemetry.
    pub fn train(&self, dataset: &Dataset) -> YieldResult<TrainingOutcome> {
        self.train_with_telemetry(dataset, None)
    }

    /// Trains with optional progress logging. Any failure aborts the run.
    pub fn train_with_telemetry(
        &self,
        dataset: &Dataset,
        telemetry: Option<&YieldTelemetry>,
    ) -> YieldResult<TrainingOutcome> {
        self.config.validate()?;
        self.check_size(dataset.len())?;

        let (train_idx, test_idx) =
            train_test_split(dataset.len(), self.config.test_ratio, self.config.seed);
        let (train_rows, train_targets) = dataset.matrix(&train_idx);
        let (test_rows, test_targets) = dataset.matrix(&test_idx);
        emit(
            telemetry,
            LogLevel::Info,
            "training_split",
            json!({ "train": train_rows.len(), "test": test_rows.len(), "seed": self.config.seed }),
        );

        let search = RandomizedSearch::new(self.config.clone()).run(
            &train_rows,
            &train_targets,
            telemetry,
        )?;
        let best = search.best;

        let booster = GradientBoostedRegressor::fit(&best.params, &train_rows, &train_targets)?;
        let predictions = booster.predict(&test_rows);
        let metrics = ModelMetrics {
            r2: r2_score(&predictions, &test_targets),
            rmse: root_mean_squared_error(&predictions, &test_targets),
            cv_r2: best.mean_r2,
        };
        let ceiling = dataset
            .yield_range()
            .map_or(DEFAULT_YIELD_CEILING, |(_, max)| max);
        let model = TrainedModel::new(booster, metrics).with_yield_ceiling(ceiling);
        let report = TrainingReport {
            run_id: model.run_id,
            r2: metrics.r2,
            rmse: metrics.rmse,
            cv_r2: metrics.cv_r2,
            best_params: best.params,
            candidates_evaluated: search.candidates.len(),
            train_samples: train_rows.len(),
            test_samples: test_rows.len(),
            artifact: None,
        };
        emit(
            telemetry,
            LogLevel::Info,
            "training_complete",
            json!({
                "run_id": report.run_id.to_string(),
                "r2": report.r2,
                "rmse": report.rmse,
                "cv_r2": report.cv_r2,
            }),
        );
        Ok(TrainingOutcome { model, report })
    }

    /// Smallest dataset that leaves one held-out row and one row per fold.
    fn check_size(&self, actual: usize) -> Result<(), TrainingFailure> {
        let fits = |n: usize| {
            let n_test = test_size(n, self.config.test_ratio);
            n_test >= 1 && n - n_test >= self.config.folds
        };
        if fits(actual) {
            return Ok(());
        }
        let required = (1..).find(|&n| fits(n)).unwrap_or(usize::MAX);
        Err(TrainingFailure::InsufficientSamples { required, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::SoilClimate,
        prep::{dataset::Sample, label::LabelFormula, DataPreparer},
    };
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use search::ParamSpace;

    fn synthetic(n: usize) -> Dataset {
        let mut rng = SmallRng::seed_from_u64(5);
        let measurements: Vec<SoilClimate> = (0..n)
            .map(|_| {
                SoilClimate::from_vector([
                    rng.gen_range(0.0..140.0),
                    rng.gen_range(5.0..145.0),
                    rng.gen_range(5.0..205.0),
                    rng.gen_range(8.0..44.0),
                    rng.gen_range(14.0..100.0),
                    rng.gen_range(3.5..9.9),
                    rng.gen_range(20.0..300.0),
                ])
            })
            .collect();
        DataPreparer::new(LabelFormula::default()).label(&measurements)
    }

    fn fast_config() -> SearchConfig {
        SearchConfig {
            iterations: 3,
            space: ParamSpace {
                n_estimators: vec![60, 80],
                max_depth: vec![3],
                learning_rate: vec![0.2, 0.3],
                subsample: vec![0.9],
                colsample_bytree: vec![0.9],
                min_child_weight: vec![1.0],
                reg_alpha: vec![0.0],
                reg_lambda: vec![1.0],
                gamma: vec![0.0],
            },
            ..SearchConfig::default()
        }
    }

    #[test]
    fn trains_and_reports_held_out_metrics() {
        let outcome = YieldTrainer::new(fast_config())
            .train(&synthetic(150))
            .unwrap();
        let report = &outcome.report;
        assert_eq!(report.test_samples, 30);
        assert_eq!(report.train_samples, 120);
        assert_eq!(report.candidates_evaluated, 3);
        assert!(report.r2 > 0.5, "r2 = {}", report.r2);
        assert!(report.rmse > 0.0);
        assert_eq!(report.run_id, outcome.model.run_id);
        let (_, max_label) = synthetic(150).yield_range().unwrap();
        assert_eq!(outcome.model.yield_ceiling, max_label);
        assert!(outcome.model.check_schema().is_ok());
    }

    #[test]
    fn tiny_dataset_is_rejected() {
        let dataset = Dataset::new(vec![
            Sample {
                inputs: SoilClimate::from_vector([1.0; 7]),
                yield_kg_ha: 900.0,
            };
            3
        ]);
        match YieldTrainer::new(fast_config()).train(&dataset) {
            Err(crate::error::YieldError::Training(TrainingFailure::InsufficientSamples {
                required,
                actual,
            })) => {
                assert_eq!(actual, 3);
                assert_eq!(required, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
