use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{TrainingFailure, YieldError, YieldResult},
    features::{Feature, SoilClimate, FEATURE_COUNT},
};

/// One labelled row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Measurements.
    #[serde(flatten)]
    pub inputs: SoilClimate,
    /// Synthetic yield label (kg/ha).
    #[serde(rename = "yield")]
    pub yield_kg_ha: f64,
}

/// In-memory labelled dataset, read once per training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Wraps already-labelled samples.
    #[must_use]
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Rows in load order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Smallest and largest label.
    #[must_use]
    pub fn yield_range(&self) -> Option<(f64, f64)> {
        let first = self.samples.first()?.yield_kg_ha;
        Some(self.samples.iter().fold((first, first), |(lo, hi), s| {
            (lo.min(s.yield_kg_ha), hi.max(s.yield_kg_ha))
        }))
    }

    /// Feature rows and labels for the rows at `indices`.
    #[must_use]
    pub fn matrix(&self, indices: &[usize]) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        indices
            .iter()
            .map(|&idx| {
                let sample = &self.samples[idx];
                (sample.inputs.to_vector(), sample.yield_kg_ha)
            })
            .unzip()
    }

    /// Writes `N..rainfall,yield` rows with a header.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> YieldResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = Feature::schema();
        header.push("yield".to_owned());
        writer.write_record(&header)?;
        for sample in &self.samples {
            let mut row: Vec<String> = sample
                .inputs
                .to_vector()
                .iter()
                .map(ToString::to_string)
                .collect();
            row.push(sample.yield_kg_ha.to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Reads the seven feature columns from a CSV file with a header row.
/// Extra columns are ignored.
pub fn read_measurements(path: impl AsRef<Path>) -> YieldResult<Vec<SoilClimate>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(YieldError::DataNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut positions = [0usize; FEATURE_COUNT];
    let mut missing = Vec::new();
    for feature in Feature::ALL {
        match headers.iter().position(|header| header == feature.column()) {
            Some(position) => positions[feature.index()] = position,
            None => missing.push(feature.column().to_owned()),
        }
    }
    if !missing.is_empty() {
        return Err(TrainingFailure::MissingColumns(missing).into());
    }

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        let mut values = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let raw = record.get(positions[feature.index()]).unwrap_or_default();
            values[feature.index()] = raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| TrainingFailure::MalformedRecord {
                    row: offset + 1,
                    column: feature.column().to_owned(),
                    value: raw.to_owned(),
                })?;
        }
        rows.push(SoilClimate::from_vector(values));
    }
    if rows.is_empty() {
        return Err(TrainingFailure::EmptyDataset.into());
    }
    Ok(rows)
}
