use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{YieldError, YieldResult};

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 7;

/// Model input, in the column order the booster is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Soil nitrogen (ppm).
    #[serde(rename = "N")]
    Nitrogen,
    /// Soil phosphorus (ppm).
    #[serde(rename = "P")]
    Phosphorus,
    /// Soil potassium (ppm).
    #[serde(rename = "K")]
    Potassium,
    /// Air temperature (°C).
    #[serde(rename = "temperature")]
    Temperature,
    /// Relative humidity (%).
    #[serde(rename = "humidity")]
    Humidity,
    /// Soil pH.
    #[serde(rename = "ph")]
    Ph,
    /// Rainfall (mm).
    #[serde(rename = "rainfall")]
    Rainfall,
}

impl Feature {
    /// Canonical order. Every feature vector is laid out by this array.
    pub const ALL: [Self; FEATURE_COUNT] = [
        Self::Nitrogen,
        Self::Phosphorus,
        Self::Potassium,
        Self::Temperature,
        Self::Humidity,
        Self::Ph,
        Self::Rainfall,
    ];

    /// Dataset column name.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Nitrogen => "N",
            Self::Phosphorus => "P",
            Self::Potassium => "K",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Ph => "ph",
            Self::Rainfall => "rainfall",
        }
    }

    /// Position in the feature vector.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical column names, as recorded in model artifacts.
    #[must_use]
    pub fn schema() -> Vec<String> {
        Self::ALL.iter().map(|f| f.column().to_owned()).collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One set of soil and climate measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilClimate {
    /// Nitrogen (ppm).
    #[serde(rename = "N")]
    pub nitrogen: f64,
    /// Phosphorus (ppm).
    #[serde(rename = "P")]
    pub phosphorus: f64,
    /// Potassium (ppm).
    #[serde(rename = "K")]
    pub potassium: f64,
    /// Temperature (°C).
    pub temperature: f64,
    /// Relative humidity (%).
    pub humidity: f64,
    /// Soil pH.
    pub ph: f64,
    /// Rainfall (mm).
    pub rainfall: f64,
}

impl SoilClimate {
    /// Builds a vector from positional values in `Feature::ALL` order.
    #[must_use]
    pub const fn from_vector(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            nitrogen: values[0],
            phosphorus: values[1],
            potassium: values[2],
            temperature: values[3],
            humidity: values[4],
            ph: values[5],
            rainfall: values[6],
        }
    }

    /// Value of a single feature.
    #[must_use]
    pub const fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Nitrogen => self.nitrogen,
            Feature::Phosphorus => self.phosphorus,
            Feature::Potassium => self.potassium,
            Feature::Temperature => self.temperature,
            Feature::Humidity => self.humidity,
            Feature::Ph => self.ph,
            Feature::Rainfall => self.rainfall,
        }
    }

    /// Feature vector in training order.
    #[must_use]
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        Feature::ALL.map(|feature| self.get(feature))
    }

    /// Rejects NaN and infinite measurements.
    pub fn validate(&self) -> YieldResult<()> {
        for feature in Feature::ALL {
            let value = self.get(feature);
            if !value.is_finite() {
                return Err(YieldError::validation(
                    feature.column(),
                    format!("expected a finite number, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

/// Relative weight of each feature in the fitted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureImportance([f64; FEATURE_COUNT]);

impl FeatureImportance {
    /// Wraps raw per-feature weights, normalising them to sum to 1.
    /// All-zero weights stay zero.
    #[must_use]
    pub fn normalized(weights: [f64; FEATURE_COUNT]) -> Self {
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            Self(weights.map(|w| w / total))
        } else {
            Self([0.0; FEATURE_COUNT])
        }
    }

    /// Weight for a feature.
    #[must_use]
    pub const fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    /// Features sorted by descending weight; equal weights keep canonical order.
    #[must_use]
    pub fn ranked(&self) -> Vec<(Feature, f64)> {
        let mut ranked: Vec<(Feature, f64)> =
            Feature::ALL.iter().map(|&f| (f, self.get(f))).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Most influential feature.
    #[must_use]
    pub fn top(&self) -> Feature {
        self.ranked()[0].0
    }

    /// Raw weights in canonical order.
    #[must_use]
    pub const fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_follows_canonical_order() {
        let inputs = SoilClimate {
            nitrogen: 1.0,
            phosphorus: 2.0,
            potassium: 3.0,
            temperature: 4.0,
            humidity: 5.0,
            ph: 6.0,
            rainfall: 7.0,
        };
        assert_eq!(inputs.to_vector(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(SoilClimate::from_vector(inputs.to_vector()), inputs);
        for (idx, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), idx);
        }
    }

    #[test]
    fn schema_matches_dataset_columns() {
        assert_eq!(
            Feature::schema(),
            vec!["N", "P", "K", "temperature", "humidity", "ph", "rainfall"]
        );
    }

    #[test]
    fn validate_rejects_nan() {
        let mut inputs = SoilClimate::from_vector([40.0, 25.0, 120.0, 26.0, 65.0, 6.8, 580.0]);
        assert!(inputs.validate().is_ok());
        inputs.ph = f64::NAN;
        match inputs.validate() {
            Err(YieldError::Validation { field, .. }) => assert_eq!(field, "ph"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn importance_ranks_and_breaks_ties_by_order() {
        let importance = FeatureImportance::normalized([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0]);
        assert_eq!(importance.top(), Feature::Rainfall);
        assert!((importance.as_array().iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let tied = FeatureImportance::normalized([0.0, 2.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(tied.top(), Feature::Phosphorus);

        let empty = FeatureImportance::normalized([0.0; FEATURE_COUNT]);
        assert_eq!(empty.top(), Feature::Nitrogen);
    }

    #[test]
    fn feature_serializes_as_column_name() {
        assert_eq!(serde_json::to_string(&Feature::Ph).unwrap(), "\"ph\"");
        assert_eq!(serde_json::to_string(&Feature::Nitrogen).unwrap(), "\"N\"");
    }
}
