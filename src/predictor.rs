use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ModelError, PredictError};
use crate::features::{derive, parse_form};
use crate::model::ModelStore;
use crate::types::{FeatureRecord, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

// 2^63; every float below it fits in an i64.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Turn the raw model output into the number shown to the user. NaN,
/// infinities and magnitudes past `i64` are errors, never a saturated value.
pub fn postprocess(raw: f64) -> Result<i64, ModelError> {
    let scaled = (raw * 1000.0).abs().round();
    if !raw.is_finite() || !scaled.is_finite() || scaled >= I64_BOUND {
        return Err(ModelError::NonFinite(raw));
    }
    Ok(scaled as i64)
}

/// Feature derivation plus inference against the shared model.
pub struct PredictionService {
    models: Arc<ModelStore>,
    log_features: bool,
}

impl PredictionService {
    pub fn new(models: Arc<ModelStore>) -> Self {
        Self {
            models,
            log_features: false,
        }
    }

    pub fn with_feature_logging(mut self, on: bool) -> Self {
        self.log_features = on;
        self
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    /// Parse, validate and predict from a submitted form.
    pub fn predict_form(&self, form: &HashMap<String, String>) -> Result<i64, PredictError> {
        let candidates = parse_form(form)?;
        let record = FeatureRecord::from_candidates(&candidates)?;
        self.predict(&record)
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<i64, PredictError> {
        let derived = derive(record)?;
        let features = FeatureVector::assemble(record, &derived);

        if self.log_features {
            let sample: Vec<String> = FEATURE_NAMES
                .iter()
                .zip(features.as_slice())
                .map(|(name, v)| format!("{}={:.5}", name, v))
                .collect();
            tracing::info!("final features: [{}]", sample.join(", "));
        }

        let model = self.models.get()?;
        if let Some(expected) = model.input_dim() {
            if expected != FEATURE_COUNT {
                return Err(ModelError::ShapeMismatch {
                    got: FEATURE_COUNT,
                    expected,
                }
                .into());
            }
        }

        let out = model
            .predict(&features.to_batch())
            .map_err(ModelError::Backend)?;
        let raw = *out.first().ok_or(ModelError::EmptyOutput)?;
        tracing::debug!("raw model output {}", raw);

        let result = postprocess(raw)?;
        tracing::info!("ML prediction: {}", result);
        Ok(result)
    }
}
