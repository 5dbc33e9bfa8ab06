#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! CropAI yield stack: data preparation, boosted-tree training with randomized
//! search, model persistence, and rule-based farming advice.

/// Error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Model inputs and importance records.
#[path = "../features.rs"]
pub mod features;

/// Structured logging helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Dataset loading and synthetic labelling.
#[path = "../prep/main.rs"]
pub mod prep;

/// Regression training pipeline.
#[path = "../ML/main.rs"]
pub mod classical_ml;

/// Model artifact persistence.
#[path = "../artifact.rs"]
pub mod artifact;

/// Prediction and recommendations.
#[path = "../inference/main.rs"]
pub mod inference;

/// Web-facing request/response contract.
#[path = "../service.rs"]
pub mod service;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// High-level orchestration entry point.
#[path = "../main.rs"]
pub mod orchestration_entry;

pub use artifact::ArtifactStore;
pub use classical_ml::{reporter::TrainingReport, TrainingOutcome, YieldTrainer};
pub use config::AppConfig;
pub use error::{TrainingFailure, YieldError, YieldResult};
pub use features::{Feature, FeatureImportance, SoilClimate};
pub use inference::{Confidence, PredictionResult, YieldPredictor};
pub use orchestration_entry::YieldPipeline;
pub use prep::{dataset::Dataset, DataPreparer};
pub use service::{PredictionRequest, PredictionResponse, YieldService};
pub use telemetry::{YieldTelemetry, YieldTelemetryBuilder};
