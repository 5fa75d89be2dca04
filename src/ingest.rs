//! ==============================================================================
//! ingest.rs - validation and normalization of device submissions
//! ==============================================================================
//!
//! purpose:
//!     turns the loosely-typed json a sensor posts into a `Reading`.
//!     devices are cheap firmware: numbers sometimes arrive as strings,
//!     optional fields are sometimes empty strings. we accept those, but a
//!     value that is not a finite number is rejected instead of stored.
//!
//! relationships:
//!     - used by: service.rs (validate outside the lock, stamp inside it)
//!     - produces: domain.rs Reading
//!
//! ==============================================================================

use crate::domain::{Reading, ReadingId, Status};
use crate::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

const MISSING_FIELDS: &str = "Missing required fields: temperature and humidity";

/// raw `POST /api/sensor-data` body, every field as the device sent it
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct SensorSubmission {
    pub temperature: Option<Value>,
    pub humidity: Option<Value>,
    pub status: Option<Value>,
    pub timestamp: Option<Value>,
    pub device_id: Option<Value>,
}

/// defaults applied to fields the device left out
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub abnormal_threshold: f64,
    pub default_device_id: String,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            abnormal_threshold: 30.0,
            default_device_id: "ESP8266_DHT11".to_string(),
        }
    }
}

/// a submission that passed validation but has not been stamped yet
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub temperature: f64,
    pub humidity: i64,
    pub status: Status,
    pub device_id: String,
    pub device_timestamp: Option<u64>,
}

impl ValidSubmission {
    /// attach the server-side identity and ingestion time
    pub fn into_reading(self, id: ReadingId, received_at: DateTime<Utc>) -> Reading {
        Reading {
            id,
            temperature: self.temperature,
            humidity: self.humidity,
            status: self.status,
            device_id: self.device_id,
            timestamp: received_at,
            received_at,
            device_timestamp: self.device_timestamp,
        }
    }
}

pub fn validate(submission: SensorSubmission, policy: &IngestPolicy) -> Result<ValidSubmission> {
    let (temperature, humidity) = match (present(submission.temperature), present(submission.humidity)) {
        (Some(t), Some(h)) => (t, h),
        _ => return Err(RelayError::Validation(MISSING_FIELDS.to_string())),
    };

    let temperature = number("temperature", &temperature)?;
    let humidity = number("humidity", &humidity)?.trunc() as i64;

    let status = match present(submission.status) {
        None => Status::from_temperature(temperature, policy.abnormal_threshold),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Status::from_temperature(temperature, policy.abnormal_threshold)
        }
        Some(Value::String(s)) => s.parse::<Status>().map_err(RelayError::Validation)?,
        Some(other) => {
            return Err(RelayError::Validation(format!(
                "status must be a string, got {}",
                other
            )))
        }
    };

    let device_id = match present(submission.device_id) {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => policy.default_device_id.clone(),
    };

    let device_timestamp = present(submission.timestamp).and_then(|v| device_clock(&v));

    Ok(ValidSubmission {
        temperature,
        humidity,
        status,
        device_id,
        device_timestamp,
    })
}

/// json null counts as absent
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

fn number(field: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(RelayError::Validation(format!(
            "{} must be a finite number, got {}",
            field, value
        ))),
    }
}

fn device_clock(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
