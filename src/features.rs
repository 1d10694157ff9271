use std::collections::HashMap;

use crate::error::PredictError;
use crate::types::{Candidate, DerivedFeatures, FeatureRecord, FORM_FIELDS, RAW_FIELD_COUNT};

// ---------- Form parsing ----------

/// Pull the six inputs off a submitted form. Every field but `Hour` is a
/// float; `Hour` is an integer. Missing, malformed or non-finite values are
/// input errors.
pub fn parse_form(form: &HashMap<String, String>) -> Result<Vec<Candidate>, PredictError> {
    FORM_FIELDS
        .iter()
        .map(|&field| {
            let raw = form
                .get(field)
                .map(|s| s.trim())
                .ok_or(PredictError::InvalidNumber { field })?;
            if field == "Hour" {
                raw.parse::<i64>()
                    .map(Candidate::Int)
                    .map_err(|_| PredictError::InvalidNumber { field })
            } else {
                match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(Candidate::Float(v)),
                    _ => Err(PredictError::InvalidNumber { field }),
                }
            }
        })
        .collect()
}

// ---------- Validation ----------

/// Arity and type gate. Ranges are not checked: humidity outside 0..=100,
/// hour outside 0..=23 and negative rainfall or wind speed all pass.
pub fn validate(candidates: &[Candidate]) -> bool {
    candidates.len() == RAW_FIELD_COUNT && candidates.iter().all(Candidate::is_numeric)
}

impl FeatureRecord {
    pub fn from_candidates(candidates: &[Candidate]) -> Result<Self, PredictError> {
        if !validate(candidates) {
            return Err(PredictError::Rejected);
        }
        let float = |c: &Candidate| match c {
            Candidate::Float(v) => Ok(*v),
            Candidate::Int(v) => Ok(*v as f64),
            Candidate::Text(_) => Err(PredictError::Rejected),
        };
        let hour = match &candidates[5] {
            Candidate::Int(h) => *h,
            Candidate::Float(h) if h.fract() == 0.0 => *h as i64,
            _ => return Err(PredictError::Rejected),
        };
        Ok(Self {
            temperature: float(&candidates[0])?,
            humidity: float(&candidates[1])?,
            dew_point_temp: float(&candidates[2])?,
            wind_speed: float(&candidates[3])?,
            rainfall: float(&candidates[4])?,
            hour,
        })
    }
}

// ---------- Engineered features ----------

pub fn rush_hour(hour: i64) -> u8 {
    u8::from((7..=9).contains(&hour) || (17..=19).contains(&hour))
}

pub fn comfort_index(temperature: f64, humidity: f64) -> f64 {
    temperature - 0.55 * (1.0 - humidity / 100.0) * (temperature - 14.5)
}

/// Round to two decimals, halves away from zero: 0.125 -> 0.13. Ties are
/// decided on the exact value, so 0.015 (stored just below) gives 0.01.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let mut rounded = scaled.round();
    if (rounded - scaled).abs() == 0.5 {
        // The product itself may have been rounded onto the midpoint.
        let residual = value.mul_add(100.0, -scaled);
        if residual > 0.0 {
            rounded = scaled.ceil();
        } else if residual < 0.0 {
            rounded = scaled.floor();
        }
    }
    rounded / 100.0
}

/// Derive the engineered features. A zero dew-point/hour product (hour 0 or
/// dew point 0) has no ratio and is reported as a domain error.
pub fn derive(record: &FeatureRecord) -> Result<DerivedFeatures, PredictError> {
    let rush_hour = rush_hour(record.hour);
    let comfort_index = comfort_index(record.temperature, record.humidity);
    let comfort_index_scaled = comfort_index * 0.1;
    let hour_dew_product = record.dew_point_temp * record.hour as f64;
    if hour_dew_product == 0.0 {
        return Err(PredictError::DivisionByZero);
    }
    let hour_dew_ratio = round2(record.dew_point_temp / hour_dew_product);
    let hour_dew_ratio_scaled = hour_dew_ratio * 10.0;

    Ok(DerivedFeatures {
        rush_hour,
        comfort_index,
        comfort_index_scaled,
        hour_dew_product,
        hour_dew_ratio,
        hour_dew_ratio_scaled,
    })
}
