use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the yield crate.
pub type YieldResult<T> = Result<T, YieldError>;

/// Reasons a training run aborts. None of them are retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainingFailure {
    /// Dataset header lacks one or more required feature columns.
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    /// A cell could not be read as a finite number.
    #[error("row {row}: column `{column}` is not a finite number ({value:?})")]
    MalformedRecord {
        /// 1-based data row (header excluded).
        row: usize,
        /// Column name.
        column: String,
        /// Raw cell text.
        value: String,
    },
    /// The source holds a header but no rows.
    #[error("dataset contains no samples")]
    EmptyDataset,
    /// Not enough rows for the requested split and fold count.
    #[error("need at least {required} samples, got {actual}")]
    InsufficientSamples {
        /// Minimum sample count.
        required: usize,
        /// Samples available.
        actual: usize,
    },
    /// Persisted model was trained on a different feature layout.
    #[error("feature schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        /// Canonical feature names.
        expected: Vec<String>,
        /// Names recorded in the artifact.
        found: Vec<String>,
    },
    /// Hyperparameters outside their valid domain.
    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),
}

/// Error kinds surfaced by data preparation, training, and inference.
#[derive(Debug, Error)]
pub enum YieldError {
    /// Dataset source does not exist.
    #[error("dataset not found at {}", path.display())]
    DataNotFound {
        /// Expected dataset path.
        path: PathBuf,
    },
    /// Prediction requested before any model was trained or persisted.
    #[error("model not trained: no artifact at {}", path.display())]
    ModelNotTrained {
        /// Artifact path that was checked.
        path: PathBuf,
    },
    /// Training aborted.
    #[error("training failed: {0}")]
    Training(#[from] TrainingFailure),
    /// Inference input rejected.
    #[error("invalid input `{field}`: {reason}")]
    Validation {
        /// Offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Artifact exists but cannot be decoded.
    #[error("model artifact {} is corrupt: {reason}", path.display())]
    ArtifactCorrupt {
        /// Artifact path.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
    /// Configuration rejected at load.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Description of the bad value.
        reason: String,
    },
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV reader failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON encode/decode failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl YieldError {
    /// Builds a validation error for `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, stable across releases.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DataNotFound { .. } => "data_not_found",
            Self::ModelNotTrained { .. } => "model_not_trained",
            Self::Training(_) => "training_failure",
            Self::Validation { .. } => "validation",
            Self::ArtifactCorrupt { .. } => "artifact_corrupt",
            Self::Config { .. } => "config",
            Self::Io(_) | Self::Csv(_) | Self::Json(_) => "internal",
        }
    }

    /// HTTP-style status for the web collaborator.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::DataNotFound { .. } => 404,
            Self::ModelNotTrained { .. } => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(YieldError::validation("ph", "not a number").status_code(), 400);
        let missing = YieldError::ModelNotTrained {
            path: PathBuf::from("trained_model.json"),
        };
        assert_eq!(missing.status_code(), 503);
        assert_eq!(missing.kind(), "model_not_trained");
        let training: YieldError = TrainingFailure::EmptyDataset.into();
        assert_eq!(training.status_code(), 500);
        assert_eq!(training.kind(), "training_failure");
    }

    #[test]
    fn missing_columns_message_lists_names() {
        let err = TrainingFailure::MissingColumns(vec!["ph".into(), "rainfall".into()]);
        assert_eq!(
            err.to_string(),
            "dataset is missing required columns: ph, rainfall"
        );
    }
}
