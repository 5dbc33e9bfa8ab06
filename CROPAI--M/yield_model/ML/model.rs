use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    classical_ml::booster::{BoosterParams, GradientBoostedRegressor},
    error::TrainingFailure,
    features::{Feature, FeatureImportance, SoilClimate},
};

/// Held-out and cross-validation metrics of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// R² on the held-out partition.
    pub r2: f64,
    /// RMSE on the held-out partition (kg/ha).
    pub rmse: f64,
    /// Mean cross-validated R² of the winning configuration.
    pub cv_r2: f64,
}

/// Upper clamp used when an artifact predates recorded label bounds.
pub const DEFAULT_YIELD_CEILING: f64 = 8000.0;

const fn default_yield_ceiling() -> f64 {
    DEFAULT_YIELD_CEILING
}

/// Regressor plus the metadata needed to trust it at inference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Training run identifier.
    pub run_id: Uuid,
    /// When training finished.
    pub trained_at: DateTime<Utc>,
    /// Column order the booster was fitted on.
    pub feature_schema: Vec<String>,
    /// Evaluation results.
    pub metrics: ModelMetrics,
    /// Largest label seen in training (kg/ha). Estimates are clamped to it.
    #[serde(default = "default_yield_ceiling")]
    pub yield_ceiling: f64,
    booster: GradientBoostedRegressor,
}

impl TrainedModel {
    /// Wraps a fitted booster, stamping it with the canonical schema.
    #[must_use]
    pub fn new(booster: GradientBoostedRegressor, metrics: ModelMetrics) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            feature_schema: Feature::schema(),
            metrics,
            yield_ceiling: DEFAULT_YIELD_CEILING,
            booster,
        }
    }

    /// Records the label ceiling of the training data.
    #[must_use]
    pub fn with_yield_ceiling(mut self, ceiling: f64) -> Self {
        self.yield_ceiling = ceiling;
        self
    }

    /// Fails when the recorded column order differs from `Feature::ALL`.
    pub fn check_schema(&self) -> Result<(), TrainingFailure> {
        let expected = Feature::schema();
        if self.feature_schema == expected {
            Ok(())
        } else {
            Err(TrainingFailure::SchemaMismatch {
                expected,
                found: self.feature_schema.clone(),
            })
        }
    }

    /// Raw yield estimate (kg/ha) before flooring.
    #[must_use]
    pub fn estimate(&self, inputs: &SoilClimate) -> f64 {
        self.booster.predict_one(&inputs.to_vector())
    }

    /// Per-feature importance of the ensemble.
    #[must_use]
    pub const fn feature_importance(&self) -> FeatureImportance {
        self.booster.feature_importance()
    }

    /// Hyperparameters of the ensemble.
    #[must_use]
    pub const fn params(&self) -> &BoosterParams {
        self.booster.params()
    }

    /// Underlying booster.
    #[must_use]
    pub const fn booster(&self) -> &GradientBoostedRegressor {
        &self.booster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> TrainedModel {
        let rows: Vec<[f64; 7]> = (0..20).map(|i| [f64::from(i); 7]).collect();
        let targets: Vec<f64> = (0..20).map(|i| 600.0 + 50.0 * f64::from(i)).collect();
        let params = BoosterParams {
            n_estimators: 10,
            max_depth: 2,
            ..BoosterParams::default()
        };
        let booster = GradientBoostedRegressor::fit(&params, &rows, &targets).unwrap();
        TrainedModel::new(
            booster,
            ModelMetrics {
                r2: 0.9,
                rmse: 40.0,
                cv_r2: 0.88,
            },
        )
    }

    #[test]
    fn schema_check_detects_reordered_columns() {
        let mut model = tiny_model();
        assert!(model.check_schema().is_ok());
        model.feature_schema.swap(0, 1);
        assert!(matches!(
            model.check_schema(),
            Err(TrainingFailure::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn estimate_uses_canonical_vector() {
        let model = tiny_model();
        let inputs = SoilClimate::from_vector([19.0; 7]);
        assert_eq!(
            model.estimate(&inputs),
            model.booster().predict_one(&[19.0; 7])
        );
        assert_eq!(model.params().n_estimators, 10);
    }

    #[test]
    fn ceiling_survives_serde_and_defaults_when_absent() {
        let model = tiny_model().with_yield_ceiling(7321.0);
        let mut value = serde_json::to_value(&model).unwrap();
        let back: TrainedModel = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(back.yield_ceiling, 7321.0);

        value.as_object_mut().unwrap().remove("yield_ceiling");
        let legacy: TrainedModel = serde_json::from_value(value).unwrap();
        assert_eq!(legacy.yield_ceiling, DEFAULT_YIELD_CEILING);
    }
}
