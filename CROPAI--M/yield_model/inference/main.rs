//! Yield estimation against a resident model.

/// Threshold advisories and recommendation lines.
pub mod advisor;

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    artifact::ArtifactStore,
    classical_ml::model::TrainedModel,
    error::YieldResult,
    features::{Feature, SoilClimate},
    telemetry::{emit, YieldTelemetry},
};

/// Estimates are never reported below this (kg/ha).
pub const YIELD_FLOOR: f64 = 500.0;
/// Raw estimates above this are labelled [`Confidence::Good`].
pub const GOOD_CONFIDENCE_ABOVE: f64 = 2000.0;

/// Rounds half to even and clamps into `[YIELD_FLOOR, ceiling]`.
#[must_use]
pub fn reported_yield(raw: f64, ceiling: f64) -> f64 {
    raw.round_ties_even().clamp(YIELD_FLOOR, ceiling.max(YIELD_FLOOR))
}

/// Coarse quality label for an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// Raw estimate above 2000 kg/ha.
    Good,
    /// Everything else.
    Moderate,
}

impl Confidence {
    /// Label for a raw estimate.
    #[must_use]
    pub fn for_estimate(estimate: f64) -> Self {
        if estimate > GOOD_CONFIDENCE_ABOVE {
            Self::Good
        } else {
            Self::Moderate
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => f.write_str("Good"),
            Self::Moderate => f.write_str("Moderate"),
        }
    }
}

/// Answer to a single prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Rounded estimate in kg/ha, between [`YIELD_FLOOR`] and the model's
    /// training label ceiling.
    pub predicted_yield: f64,
    /// Priority line first, at most five entries.
    pub recommendations: Vec<String>,
    /// Feature with the largest importance.
    pub most_important_factor: Feature,
    /// Coarse quality label.
    pub confidence: Confidence,
}

/// Holds the resident model and answers predictions. Safe to share across
/// threads; the first prediction loads the artifact when no model is resident.
pub struct YieldPredictor {
    store: ArtifactStore,
    resident: RwLock<Option<Arc<TrainedModel>>>,
    telemetry: Option<YieldTelemetry>,
}

impl fmt::Debug for YieldPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldPredictor")
            .field("store", &self.store)
            .field("resident", &self.is_resident())
            .finish_non_exhaustive()
    }
}

impl YieldPredictor {
    /// Predictor that lazily loads from `store`.
    #[must_use]
    pub fn with_artifact(store: ArtifactStore) -> Self {
        Self {
            store,
            resident: RwLock::new(None),
            telemetry: None,
        }
    }

    /// Predictor serving an already fitted model. `store` is used by
    /// [`Self::reload`].
    #[must_use]
    pub fn from_model(model: TrainedModel, store: ArtifactStore) -> Self {
        Self {
            store,
            resident: RwLock::new(Some(Arc::new(model))),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: YieldTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Artifact backing this predictor.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Whether a model is currently in memory.
    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.resident.read().is_some()
    }

    /// Resident model, loading the artifact on first use.
    pub fn model(&self) -> YieldResult<Arc<TrainedModel>> {
        if let Some(model) = self.resident.read().as_ref() {
            return Ok(Arc::clone(model));
        }
        let mut slot = self.resident.write();
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(self.store.load()?);
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "model_loaded",
            json!({
                "run_id": model.run_id.to_string(),
                "artifact": self.store.path().display().to_string(),
            }),
        );
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Replaces the resident model with the artifact's current contents.
    /// The previous model stays resident if loading fails.
    pub fn reload(&self) -> YieldResult<Arc<TrainedModel>> {
        let model = Arc::new(self.store.load()?);
        *self.resident.write() = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Swaps in a freshly trained model.
    pub fn replace(&self, model: TrainedModel) {
        *self.resident.write() = Some(Arc::new(model));
    }

    /// Estimates yield for the seven raw readings.
    #[allow(clippy::too_many_arguments)]
    pub fn predict(
        &self,
        nitrogen: f64,
        phosphorus: f64,
        potassium: f64,
        temperature: f64,
        humidity: f64,
        ph: f64,
        rainfall: f64,
    ) -> YieldResult<PredictionResult> {
        self.predict_inputs(&SoilClimate {
            nitrogen,
            phosphorus,
            potassium,
            temperature,
            humidity,
            ph,
            rainfall,
        })
    }

    /// Estimates yield for a validated measurement record.
    pub fn predict_inputs(&self, inputs: &SoilClimate) -> YieldResult<PredictionResult> {
        inputs.validate()?;
        let model = self.model()?;
        let raw = model.estimate(inputs);
        let importance = model.feature_importance();
        let result = PredictionResult {
            predicted_yield: reported_yield(raw, model.yield_ceiling),
            recommendations: advisor::recommendations(inputs, &importance),
            most_important_factor: importance.top(),
            confidence: Confidence::for_estimate(raw),
        };
        emit(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "prediction",
            json!({
                "predicted_yield": result.predicted_yield,
                "confidence": result.confidence.to_string(),
                "top_factor": result.most_important_factor.column(),
            }),
        );
        Ok(result)
    }
}
