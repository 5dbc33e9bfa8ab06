use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    classical_ml::model::TrainedModel,
    error::{YieldError, YieldResult},
};

/// Default artifact file name.
pub const DEFAULT_ARTIFACT: &str = "trained_model.json";

/// Bumped whenever the serialized layout changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct ArtifactOwned {
    format_version: u32,
    model: TrainedModel,
}

/// Single-file model store. Every save replaces the previous artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT)
    }
}

impl ArtifactStore {
    /// Creates a store bound to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an artifact is present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Writes the model to a sibling temp file, then renames it over the
    /// artifact. Readers see either the old file or the new one.
    pub fn save(&self, model: &TrainedModel) -> YieldResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_ARTIFACT.to_owned());
        let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        let written = Self::write_to(&tmp, model)
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(YieldError::from));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn write_to(tmp: &Path, model: &TrainedModel) -> YieldResult<()> {
        let file = File::create(tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &ArtifactRef {
                format_version: FORMAT_VERSION,
                model,
            },
        )?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Reads the artifact and checks its version and feature schema.
    pub fn load(&self) -> YieldResult<TrainedModel> {
        if !self.exists() {
            return Err(YieldError::ModelNotTrained {
                path: self.path.clone(),
            });
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let artifact: ArtifactOwned =
            serde_json::from_reader(reader).map_err(|err| YieldError::ArtifactCorrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(YieldError::ArtifactCorrupt {
                path: self.path.clone(),
                reason: format!(
                    "unsupported format version {} (expected {FORMAT_VERSION})",
                    artifact.format_version
                ),
            });
        }
        artifact.model.check_schema()?;
        Ok(artifact.model)
    }
}
