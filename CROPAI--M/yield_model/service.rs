//! Request/response contract consumed by the web layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{YieldError, YieldResult},
    features::{Feature, SoilClimate},
    inference::{PredictionResult, YieldPredictor},
};

/// Raw readings as posted by a client. Each field may be a number or a
/// numeric string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInputs {
    /// Nitrogen (ppm).
    #[serde(rename = "N", default)]
    pub nitrogen: Value,
    /// Phosphorus (ppm).
    #[serde(rename = "P", default)]
    pub phosphorus: Value,
    /// Potassium (ppm).
    #[serde(rename = "K", default)]
    pub potassium: Value,
    /// Temperature (°C).
    #[serde(default)]
    pub temperature: Value,
    /// Relative humidity (%).
    #[serde(default)]
    pub humidity: Value,
    /// Soil pH.
    #[serde(default)]
    pub ph: Value,
    /// Rainfall (mm).
    #[serde(default)]
    pub rainfall: Value,
}

impl RawInputs {
    const fn field(&self, feature: Feature) -> &Value {
        match feature {
            Feature::Nitrogen => &self.nitrogen,
            Feature::Phosphorus => &self.phosphorus,
            Feature::Potassium => &self.potassium,
            Feature::Temperature => &self.temperature,
            Feature::Humidity => &self.humidity,
            Feature::Ph => &self.ph,
            Feature::Rainfall => &self.rainfall,
        }
    }

    /// Converts every field, failing on the first one that is not a finite number.
    pub fn parse(&self) -> YieldResult<SoilClimate> {
        let mut values = [0.0; 7];
        for feature in Feature::ALL {
            values[feature.index()] = parse_number(feature.column(), self.field(feature))?;
        }
        Ok(SoilClimate::from_vector(values))
    }
}

/// Reads a finite `f64` from a JSON number or a numeric string.
pub fn parse_number(field: &str, value: &Value) -> YieldResult<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null => return Err(YieldError::validation(field, "missing")),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(YieldError::validation(
            field,
            format!("expected a finite number, got {value}"),
        )),
    }
}

/// Prediction request from the web layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Crop name, echoed back.
    #[serde(default)]
    pub crop: Option<String>,
    /// Field area in hectares.
    #[serde(default)]
    pub area_ha: Option<Value>,
    /// Soil type, echoed back.
    #[serde(default)]
    pub soil: Option<String>,
    /// Irrigation method, echoed back.
    #[serde(default)]
    pub irrigation: Option<String>,
    /// Measurements.
    pub inputs: RawInputs,
}

/// Prediction plus echoed metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Model output.
    #[serde(flatten)]
    pub result: PredictionResult,
    /// Echoed crop name.
    pub crop: Option<String>,
    /// Echoed soil type.
    pub soil: Option<String>,
    /// Echoed irrigation method.
    pub irrigation: Option<String>,
    /// Parsed area.
    pub area_ha: Option<f64>,
    /// `predicted_yield * area_ha` when an area was given.
    pub total_yield_kg: Option<f64>,
}

/// Serves prediction requests against a shared predictor.
#[derive(Debug, Clone)]
pub struct YieldService {
    predictor: Arc<YieldPredictor>,
}

impl YieldService {
    /// Wraps a predictor.
    #[must_use]
    pub const fn new(predictor: Arc<YieldPredictor>) -> Self {
        Self { predictor }
    }

    /// Shared predictor.
    #[must_use]
    pub fn predictor(&self) -> &YieldPredictor {
        &self.predictor
    }

    /// Validates, predicts, and scales by area. Errors affect only this request.
    pub fn handle(&self, request: &PredictionRequest) -> YieldResult<PredictionResponse> {
        let inputs = request.inputs.parse()?;
        let area_ha = match request.area_ha.as_ref() {
            None | Some(Value::Null) => None,
            Some(raw) => {
                let area = parse_number("area_ha", raw)?;
                if area < 0.0 {
                    return Err(YieldError::validation("area_ha", "must not be negative"));
                }
                Some(area)
            }
        };
        let result = self.predictor.predict_inputs(&inputs)?;
        let total_yield_kg = area_ha.map(|area| result.predicted_yield * area);
        Ok(PredictionResponse {
            result,
            crop: request.crop.clone(),
            soil: request.soil.clone(),
            irrigation: request.irrigation.clone(),
            area_ha,
            total_yield_kg,
        })
    }

    /// Decodes a JSON body and handles it. Undecodable bodies are rejected as
    /// invalid input on the `body` field.
    pub fn handle_json(&self, body: &str) -> YieldResult<PredictionResponse> {
        let request: PredictionRequest = serde_json::from_str(body)
            .map_err(|err| YieldError::validation("body", err.to_string()))?;
        self.handle(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifact::ArtifactStore,
        classical_ml::{
            booster::{BoosterParams, GradientBoostedRegressor},
            model::{ModelMetrics, TrainedModel},
        },
        inference::YIELD_FLOOR,
    };
    use serde_json::json;
    use tempfile::tempdir;

    fn service() -> YieldService {
        let rows: Vec<[f64; 7]> = (0..40)
            .map(|i| {
                let x = f64::from(i);
                [x * 3.0, x, x * 4.0, 15.0 + x / 2.0, 60.0, 6.5, 200.0 + x * 20.0]
            })
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 1500.0 + 50.0 * r[1]).collect();
        let params = BoosterParams {
            n_estimators: 30,
            max_depth: 3,
            ..BoosterParams::default()
        };
        let model = TrainedModel::new(
            GradientBoostedRegressor::fit(&params, &rows, &targets).unwrap(),
            ModelMetrics {
                r2: 0.9,
                rmse: 50.0,
                cv_r2: 0.9,
            },
        );
        YieldService::new(Arc::new(YieldPredictor::from_model(
            model,
            ArtifactStore::default(),
        )))
    }

    fn body(area: Value) -> Value {
        json!({
            "crop": "maize",
            "area_ha": area,
            "soil": "loam",
            "irrigation": "drip",
            "inputs": {
                "N": 40, "P": "25", "K": 120.0, "temperature": " 26 ",
                "humidity": 65, "ph": "6.8", "rainfall": 580
            }
        })
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let response = service()
            .handle_json(&body(json!("2.5")).to_string())
            .unwrap();
        assert_eq!(response.crop.as_deref(), Some("maize"));
        assert_eq!(response.area_ha, Some(2.5));
        assert!(response.result.predicted_yield >= YIELD_FLOOR);
        assert_eq!(
            response.total_yield_kg,
            Some(response.result.predicted_yield * 2.5)
        );
    }

    #[test]
    fn area_is_optional() {
        let response = service().handle_json(&body(Value::Null).to_string()).unwrap();
        assert_eq!(response.total_yield_kg, None);
    }

    #[test]
    fn bad_fields_are_validation_errors() {
        let svc = service();
        let mut request: PredictionRequest =
            serde_json::from_value(body(json!(1.0))).unwrap();
        request.inputs.ph = json!("acidic");
        match svc.handle(&request) {
            Err(err @ YieldError::Validation { .. }) => {
                assert_eq!(err.status_code(), 400);
                assert!(err.to_string().contains("ph"));
            }
            other => panic!("unexpected {other:?}"),
        }

        request.inputs.ph = json!(6.8);
        request.inputs.rainfall = Value::Null;
        assert!(matches!(
            svc.handle(&request),
            Err(YieldError::Validation { field, .. }) if field == "rainfall"
        ));

        request.inputs.rainfall = json!(580);
        request.area_ha = Some(json!(-3));
        assert!(matches!(
            svc.handle(&request),
            Err(YieldError::Validation { field, .. }) if field == "area_ha"
        ));

        request.area_ha = Some(json!([1]));
        assert!(svc.handle(&request).is_err());
        request.area_ha = None;
        assert!(svc.handle(&request).is_ok());
    }

    #[test]
    fn untrained_model_maps_to_503_and_service_keeps_serving() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("trained_model.json"));
        let svc = YieldService::new(Arc::new(YieldPredictor::with_artifact(store.clone())));
        let request: PredictionRequest = serde_json::from_value(body(json!(1))).unwrap();
        let err = svc.handle(&request).unwrap_err();
        assert_eq!(err.status_code(), 503);

        let trained = service();
        let model = trained.predictor().model().unwrap();
        store.save(&model).unwrap();
        assert!(svc.handle(&request).is_ok());
    }

    #[test]
    fn undecodable_bodies_are_validation_errors() {
        let svc = service();
        let mut wrong_type = body(json!(1));
        wrong_type["crop"] = json!(5);
        for raw in [
            wrong_type.to_string(),
            json!({ "crop": "maize" }).to_string(),
            "not json".to_owned(),
        ] {
            match svc.handle_json(&raw) {
                Err(err @ YieldError::Validation { .. }) => {
                    assert_eq!(err.status_code(), 400);
                    assert_eq!(err.kind(), "validation");
                    assert!(err.to_string().contains("body"), "{err}");
                }
                other => panic!("{raw} gave {other:?}"),
            }
        }
    }
}
