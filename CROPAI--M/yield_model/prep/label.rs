use std::f64::consts::PI;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{YieldError, YieldResult},
    features::{Feature, SoilClimate},
};

/// Synthetic yield label: weighted sum of the inputs plus Gaussian noise,
/// clamped to a plausible range. There is no agronomic ground truth behind
/// it; the defaults reproduce the reference formula exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelFormula {
    /// Per-feature weights (kg/ha per unit of input).
    pub weights: SoilClimate,
    /// Standard deviation of the additive noise (kg/ha).
    pub noise_std: f64,
    /// Lower clamp bound (kg/ha).
    pub min_yield: f64,
    /// Upper clamp bound (kg/ha).
    pub max_yield: f64,
    /// Noise generator seed.
    pub seed: u64,
}

impl Default for LabelFormula {
    fn default() -> Self {
        Self {
            weights: SoilClimate {
                nitrogen: 0.8,
                phosphorus: 0.6,
                potassium: 0.4,
                temperature: 15.0,
                humidity: 8.0,
                ph: 120.0,
                rainfall: 3.0,
            },
            noise_std: 50.0,
            min_yield: 500.0,
            max_yield: 8000.0,
            seed: 42,
        }
    }
}

impl LabelFormula {
    /// Checks bounds and noise parameters.
    pub fn validate(&self) -> YieldResult<()> {
        if !(self.min_yield.is_finite() && self.max_yield.is_finite())
            || self.min_yield >= self.max_yield
        {
            return Err(YieldError::Config {
                reason: format!(
                    "label clamp bounds must satisfy min < max (got {} .. {})",
                    self.min_yield, self.max_yield
                ),
            });
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(YieldError::Config {
                reason: format!("label noise_std must be >= 0 (got {})", self.noise_std),
            });
        }
        if self.weights.validate().is_err() {
            return Err(YieldError::Config {
                reason: "label weights must be finite".into(),
            });
        }
        Ok(())
    }

    /// Noise-free weighted sum.
    #[must_use]
    pub fn deterministic(&self, inputs: &SoilClimate) -> f64 {
        Feature::ALL
            .iter()
            .map(|&feature| inputs.get(feature) * self.weights.get(feature))
            .sum()
    }

    /// Applies noise and the clamp.
    pub fn label(&self, inputs: &SoilClimate, rng: &mut SmallRng) -> f64 {
        let raw = self.deterministic(inputs) + gaussian(rng, self.noise_std);
        raw.max(self.min_yield).min(self.max_yield)
    }

    /// Seeded noise source for one labelling pass.
    #[must_use]
    pub fn rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.seed)
    }
}

/// Zero-mean normal sample via the Box-Muller transform.
fn gaussian(rng: &mut SmallRng, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
