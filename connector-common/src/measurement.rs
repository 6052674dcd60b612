use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single measurement handed to the time-series pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Unix epoch milliseconds when the value was sampled.
    pub timestamp: i64,

    /// Connector-level source identifier (e.g. the configured device name).
    pub source: String,

    /// Tag identifying the sampled point within the source (e.g. "1:100").
    pub tag: String,

    /// The sampled value.
    pub value: MeasurementValue,

    /// Additional context labels (e.g. data type, register class).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Measurement {
    /// Create a new measurement stamped with the current time.
    pub fn new(source: impl Into<String>, tag: impl Into<String>, value: MeasurementValue) -> Self {
        Self {
            timestamp: current_timestamp_millis(),
            source: source.into(),
            tag: tag.into(),
            value,
            labels: HashMap::new(),
        }
    }

    /// Add a label to this measurement.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Typed measurement value.
///
/// `Unsupported` marks a point whose source type could not be interpreted.
/// It serializes as `null` so consumers never mistake it for a real zero.
/// JSON has no representation for NaN or infinities either, so a non-finite
/// `Float` is also written as `null`; publishers label such readings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Integer reading.
    Integer(i64),

    /// Floating point reading.
    Float(f64),

    /// Value of a type the connector cannot decode.
    Unsupported,
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
