use serde::Serialize;

/// Number of raw inputs a prediction request carries.
pub const RAW_FIELD_COUNT: usize = 6;

/// Number of features the model is trained on.
pub const FEATURE_COUNT: usize = 7;

/// Training-time feature order. The model sees columns in exactly this order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ComfortIndex",
    "HourDPT%",
    "Temp",
    "DewPointTemp",
    "WindSpeed",
    "Rainfall",
    "RushHour",
];

// Form field names, in the order the validator sees them.
pub const FORM_FIELDS: [&str; RAW_FIELD_COUNT] = [
    "Temp",
    "Humidity",
    "DewPointTemp",
    "WindSpeed",
    "Rainfall",
    "Hour",
];

/// One value pulled off the form before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Candidate {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Candidate::Int(_) | Candidate::Float(_))
    }
}

/// Raw sensor inputs for a single request. Lives only as long as the request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub temperature: f64,
    pub humidity: f64,
    pub dew_point_temp: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    pub hour: i64,
}

impl FeatureRecord {
    pub fn candidates(&self) -> Vec<Candidate> {
        vec![
            Candidate::Float(self.temperature),
            Candidate::Float(self.humidity),
            Candidate::Float(self.dew_point_temp),
            Candidate::Float(self.wind_speed),
            Candidate::Float(self.rainfall),
            Candidate::Int(self.hour),
        ]
    }
}

/// Everything derived from a [`FeatureRecord`] on the way to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub rush_hour: u8,
    pub comfort_index: f64,
    pub comfort_index_scaled: f64,
    pub hour_dew_product: f64,
    pub hour_dew_ratio: f64,
    pub hour_dew_ratio_scaled: f64,
}

/// Model input row, ordered as [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn assemble(record: &FeatureRecord, derived: &DerivedFeatures) -> Self {
        Self([
            derived.comfort_index_scaled,
            derived.hour_dew_ratio_scaled,
            record.temperature,
            record.dew_point_temp,
            record.wind_speed,
            record.rainfall,
            f64::from(derived.rush_hour),
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Reshape into a single-row batch.
    pub fn to_batch(&self) -> Vec<Vec<f64>> {
        vec![self.0.to_vec()]
    }
}
