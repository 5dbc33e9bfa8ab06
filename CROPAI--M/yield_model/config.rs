use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    artifact::DEFAULT_ARTIFACT,
    classical_ml::search::SearchConfig,
    error::{YieldError, YieldResult},
    prep::label::LabelFormula,
};

/// Default dataset file name.
pub const DEFAULT_DATASET: &str = "Crop_recommendation.csv";

/// Where training data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// CSV with the seven feature columns.
    pub path: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATASET),
        }
    }
}

/// Model persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Artifact file written after training and read by predictions.
    pub artifact: PathBuf,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from(DEFAULT_ARTIFACT),
        }
    }
}

/// Log sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// JSON-lines log file. No file logging when unset.
    pub path: Option<PathBuf>,
    /// Mirror records to stdout.
    pub console: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            path: None,
            console: true,
        }
    }
}

/// Full runtime configuration, usually read from `cropai.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `[data]`
    pub data: DataSection,
    /// `[label]`
    pub label: LabelFormula,
    /// `[search]`
    pub search: SearchConfig,
    /// `[model]`
    pub model: ModelSection,
    /// `[logging]`
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Loads a TOML file. A missing file yields the defaults; relative paths
    /// are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> YieldResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&raw).map_err(|err| match err {
            YieldError::Config { reason } => YieldError::Config {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&source_dir);
        Ok(config)
    }

    /// Parses and validates TOML text without touching paths.
    pub fn from_toml(raw: &str) -> YieldResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| YieldError::Config {
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make training meaningless.
    pub fn validate(&self) -> YieldResult<()> {
        self.label.validate()?;
        self.search.validate().map_err(|err| YieldError::Config {
            reason: err.to_string(),
        })
    }

    fn resolve_paths(&mut self, source_dir: &Path) {
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = source_dir.join(&*candidate);
            }
        };
        resolve(&mut self.data.path);
        resolve(&mut self.model.artifact);
        if let Some(log) = self.logging.path.as_mut() {
            resolve(log);
        }
    }
}
