//! End-to-end pipeline: load and label data, train, persist, serve predictions.

use std::path::PathBuf;

use serde_json::{json, Value};
use shared_logging::LogLevel;

use crate::{
    artifact::ArtifactStore,
    classical_ml::{reporter::TrainingReport, TrainingOutcome, YieldTrainer},
    config::AppConfig,
    error::YieldResult,
    inference::YieldPredictor,
    prep::{dataset::Dataset, DataPreparer},
    telemetry::YieldTelemetry,
};

/// Wires the data preparer, trainer, and artifact store together.
#[derive(Debug)]
pub struct YieldPipeline {
    data_path: PathBuf,
    preparer: DataPreparer,
    trainer: YieldTrainer,
    store: ArtifactStore,
    telemetry: Option<YieldTelemetry>,
}

impl YieldPipeline {
    /// Builds a pipeline from loaded configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            data_path: config.data.path.clone(),
            preparer: DataPreparer::new(config.label.clone()),
            trainer: YieldTrainer::new(config.search.clone()),
            store: ArtifactStore::new(config.model.artifact.clone()),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: YieldTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Artifact store the pipeline writes to.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Reads and labels the configured dataset.
    pub fn prepare(&self) -> YieldResult<Dataset> {
        self.preparer
            .load_with_telemetry(&self.data_path, self.telemetry.as_ref())
    }

    /// Trains on `dataset` and persists the winner. Nothing is written when
    /// training fails.
    pub fn train(&self, dataset: &Dataset) -> YieldResult<TrainingOutcome> {
        let mut outcome = self
            .trainer
            .train_with_telemetry(dataset, self.telemetry.as_ref())?;
        self.store.save(&outcome.model)?;
        outcome.report.artifact = Some(self.store.path().to_path_buf());
        self.log(
            LogLevel::Info,
            "model_persisted",
            json!({
                "run_id": outcome.report.run_id.to_string(),
                "artifact": self.store.path().display().to_string(),
            }),
        );
        Ok(outcome)
    }

    /// Loads, trains, persists.
    pub fn run(&self) -> YieldResult<TrainingOutcome> {
        let dataset = self.prepare()?;
        self.train(&dataset)
    }

    /// Runs the pipeline and returns only the report.
    pub fn run_report(&self) -> YieldResult<TrainingReport> {
        self.run().map(|outcome| outcome.report)
    }

    /// Predictor bound to this pipeline's artifact.
    #[must_use]
    pub fn predictor(&self) -> YieldPredictor {
        let predictor = YieldPredictor::with_artifact(self.store.clone());
        match self.telemetry.clone() {
            Some(telemetry) => predictor.with_telemetry(telemetry),
            None => predictor,
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            let _ = telemetry.log(level, message, metadata);
        }
    }
}
