use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::{Feature, FeatureImportance, SoilClimate};

/// Nitrogen below this (ppm) is flagged.
pub const NITROGEN_MIN: f64 = 30.0;
/// Phosphorus below this (ppm) is flagged.
pub const PHOSPHORUS_MIN: f64 = 20.0;
/// Potassium below this (ppm) is flagged.
pub const POTASSIUM_MIN: f64 = 100.0;
/// Acidic soil threshold.
pub const PH_MIN: f64 = 6.0;
/// Alkaline soil threshold.
pub const PH_MAX: f64 = 8.0;
/// Seasonal rainfall floor (mm).
pub const RAINFALL_MIN: f64 = 400.0;
/// Seasonal rainfall ceiling (mm).
pub const RAINFALL_MAX: f64 = 1000.0;
/// Cool temperature threshold (°C).
pub const TEMPERATURE_MIN: f64 = 20.0;
/// Hot temperature threshold (°C).
pub const TEMPERATURE_MAX: f64 = 35.0;

/// Maximum number of recommendation lines returned to callers.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// A violated agronomic threshold, carrying the offending reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Advisory {
    /// Nitrogen below threshold.
    LowNitrogen(f64),
    /// Phosphorus below threshold.
    LowPhosphorus(f64),
    /// Potassium below threshold.
    LowPotassium(f64),
    /// pH below range.
    AcidicSoil(f64),
    /// pH above range.
    AlkalineSoil(f64),
    /// Too little rain.
    LowRainfall(f64),
    /// Waterlogging risk.
    HighRainfall(f64),
    /// Too cool.
    CoolTemperature(f64),
    /// Heat stress.
    HighTemperature(f64),
}

impl Advisory {
    /// Input the advisory refers to.
    #[must_use]
    pub const fn feature(self) -> Feature {
        match self {
            Self::LowNitrogen(_) => Feature::Nitrogen,
            Self::LowPhosphorus(_) => Feature::Phosphorus,
            Self::LowPotassium(_) => Feature::Potassium,
            Self::AcidicSoil(_) | Self::AlkalineSoil(_) => Feature::Ph,
            Self::LowRainfall(_) | Self::HighRainfall(_) => Feature::Rainfall,
            Self::CoolTemperature(_) | Self::HighTemperature(_) => Feature::Temperature,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LowNitrogen(v) => write!(
                f,
                "Increase nitrogen: {v} ppm is low. Apply urea or organic manure."
            ),
            Self::LowPhosphorus(v) => write!(
                f,
                "Boost phosphorus: {v} ppm needs improvement. Use DAP fertilizer."
            ),
            Self::LowPotassium(v) => write!(
                f,
                "Add potassium: {v} ppm is insufficient. Apply MOP or organic compost."
            ),
            Self::AcidicSoil(v) => write!(
                f,
                "Soil too acidic (pH {v}): apply agricultural lime to improve nutrient uptake."
            ),
            Self::AlkalineSoil(v) => write!(
                f,
                "Soil too alkaline (pH {v}): add organic matter and gypsum."
            ),
            Self::LowRainfall(v) => write!(
                f,
                "Low rainfall ({v} mm): plan additional irrigation or drip systems."
            ),
            Self::HighRainfall(v) => write!(
                f,
                "High rainfall ({v} mm): ensure proper drainage to prevent waterlogging."
            ),
            Self::CoolTemperature(v) => write!(
                f,
                "Cool temperature ({v} °C): consider cold-tolerant varieties \
                 or greenhouse cultivation."
            ),
            Self::HighTemperature(v) => write!(
                f,
                "High temperature ({v} °C): use shade nets and heat-resistant varieties."
            ),
        }
    }
}

/// Every violated threshold, in a fixed order: N, P, K, pH, rainfall, temperature.
#[must_use]
pub fn advisories(inputs: &SoilClimate) -> Vec<Advisory> {
    let mut out = Vec::new();
    if inputs.nitrogen < NITROGEN_MIN {
        out.push(Advisory::LowNitrogen(inputs.nitrogen));
    }
    if inputs.phosphorus < PHOSPHORUS_MIN {
        out.push(Advisory::LowPhosphorus(inputs.phosphorus));
    }
    if inputs.potassium < POTASSIUM_MIN {
        out.push(Advisory::LowPotassium(inputs.potassium));
    }
    if inputs.ph < PH_MIN {
        out.push(Advisory::AcidicSoil(inputs.ph));
    } else if inputs.ph > PH_MAX {
        out.push(Advisory::AlkalineSoil(inputs.ph));
    }
    if inputs.rainfall < RAINFALL_MIN {
        out.push(Advisory::LowRainfall(inputs.rainfall));
    } else if inputs.rainfall > RAINFALL_MAX {
        out.push(Advisory::HighRainfall(inputs.rainfall));
    }
    if inputs.temperature < TEMPERATURE_MIN {
        out.push(Advisory::CoolTemperature(inputs.temperature));
    } else if inputs.temperature > TEMPERATURE_MAX {
        out.push(Advisory::HighTemperature(inputs.temperature));
    }
    out
}

/// Line naming the most influential input.
#[must_use]
pub fn priority_line(top: Feature) -> String {
    format!("Priority focus: {top} has the highest impact on your yield prediction.")
}

/// Priority line followed by the threshold advisories, capped at
/// [`MAX_RECOMMENDATIONS`] entries.
#[must_use]
pub fn recommendations(inputs: &SoilClimate, importance: &FeatureImportance) -> Vec<String> {
    std::iter::once(priority_line(importance.top()))
        .chain(advisories(inputs).iter().map(ToString::to_string))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> SoilClimate {
        SoilClimate::from_vector([40.0, 25.0, 120.0, 26.0, 65.0, 6.8, 580.0])
    }

    fn importance_topped_by(feature: Feature) -> FeatureImportance {
        let mut weights = [0.1; 7];
        weights[feature.index()] = 0.9;
        FeatureImportance::normalized(weights)
    }

    #[test]
    fn safe_inputs_yield_only_priority_line() {
        let recs = recommendations(&example(), &importance_topped_by(Feature::Rainfall));
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("Priority focus: rainfall"));
        assert!(advisories(&example()).is_empty());
    }

    #[test]
    fn worst_case_is_capped_and_led_by_priority() {
        let poor = SoilClimate::from_vector([5.0, 5.0, 10.0, 10.0, 50.0, 4.5, 100.0]);
        let all = advisories(&poor);
        assert_eq!(all.len(), 6);
        let recs = recommendations(&poor, &importance_topped_by(Feature::Ph));
        assert_eq!(recs.len(), MAX_RECOMMENDATIONS);
        assert!(recs[0].contains("ph has the highest impact"));
        assert!(recs[1].starts_with("Increase nitrogen: 5 ppm"));
        assert!(recs[4].starts_with("Soil too acidic (pH 4.5)"));
    }

    #[test]
    fn thresholds_are_strict_and_ordered() {
        let edge = SoilClimate::from_vector([30.0, 20.0, 100.0, 20.0, 65.0, 6.0, 400.0]);
        assert!(advisories(&edge).is_empty());
        let high = SoilClimate::from_vector([30.0, 20.0, 100.0, 35.5, 65.0, 8.5, 1200.0]);
        assert_eq!(
            advisories(&high),
            vec![
                Advisory::AlkalineSoil(8.5),
                Advisory::HighRainfall(1200.0),
                Advisory::HighTemperature(35.5),
            ]
        );
    }

    #[test]
    fn each_rule_fires_regardless_of_other_inputs() {
        let backgrounds = [
            example(),
            SoilClimate::from_vector([5.0, 5.0, 10.0, 10.0, 50.0, 4.5, 100.0]),
            SoilClimate::from_vector([200.0, 150.0, 300.0, 40.0, 90.0, 9.0, 1500.0]),
        ];
        let cases: [(Feature, f64, fn(f64) -> Advisory); 9] = [
            (Feature::Nitrogen, 29.9, Advisory::LowNitrogen),
            (Feature::Phosphorus, 0.0, Advisory::LowPhosphorus),
            (Feature::Potassium, 99.0, Advisory::LowPotassium),
            (Feature::Ph, 5.9, Advisory::AcidicSoil),
            (Feature::Ph, 8.1, Advisory::AlkalineSoil),
            (Feature::Rainfall, 399.0, Advisory::LowRainfall),
            (Feature::Rainfall, 1000.5, Advisory::HighRainfall),
            (Feature::Temperature, 19.0, Advisory::CoolTemperature),
            (Feature::Temperature, 36.0, Advisory::HighTemperature),
        ];
        for base in backgrounds {
            for (feature, value, expected) in cases {
                let mut vector = base.to_vector();
                vector[feature.index()] = value;
                let found = advisories(&SoilClimate::from_vector(vector));
                assert!(
                    found.contains(&expected(value)),
                    "{feature}={value} on {base:?} gave {found:?}"
                );
                assert_eq!(expected(value).feature(), feature);
            }
        }
    }

    #[test]
    fn advisory_text_includes_reading() {
        assert_eq!(
            Advisory::LowRainfall(250.5).to_string(),
            "Low rainfall (250.5 mm): plan additional irrigation or drip systems."
        );
    }
}
