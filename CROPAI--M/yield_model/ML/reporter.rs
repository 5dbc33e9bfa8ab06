use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classical_ml::booster::BoosterParams;

/// Outcome of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Run identifier, shared with the persisted artifact.
    pub run_id: Uuid,
    /// Held-out R².
    pub r2: f64,
    /// Held-out RMSE (kg/ha).
    pub rmse: f64,
    /// Mean cross-validated R² of the winner.
    pub cv_r2: f64,
    /// Winning hyperparameters.
    pub best_params: BoosterParams,
    /// Configurations scored.
    pub candidates_evaluated: usize,
    /// Rows in the training partition.
    pub train_samples: usize,
    /// Rows in the held-out partition.
    pub test_samples: usize,
    /// Where the model was written, if persisted.
    pub artifact: Option<PathBuf>,
}

impl TrainingReport {
    /// Renders a concise summary string.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[yield] r2={:.3} rmse={:.0} kg/ha cv_r2={:.3} candidates={} train={} test={}",
            self.r2,
            self.rmse,
            self.cv_r2,
            self.candidates_evaluated,
            self.train_samples,
            self.test_samples
        )
    }

    /// Held-out R² as a percentage line.
    #[must_use]
    pub fn accuracy_line(&self) -> String {
        format!("Model ready! Accuracy: {:.1}%", self.r2 * 100.0)
    }
}
