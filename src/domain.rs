//! ==============================================================================
//! domain.rs - reading types shared by the store, the api and the live channel
//! ==============================================================================
//!
//! relationships:
//!     - produced by: ingest.rs (normalizes device submissions into readings)
//!     - stored by: store.rs
//!     - pushed by: broadcast.rs (wrapped in LiveMessage)
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// process-unique, strictly increasing reading id
///
/// derived from the ingestion time in milliseconds. serialized as a decimal
/// string so browsers never lose precision on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadingId(pub u64);

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ReadingId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>()
            .map(ReadingId)
            .map_err(serde::de::Error::custom)
    }
}

/// health classification of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Normal,
    Abnormal,
}

impl Status {
    /// status a device would have reported, given our threshold (strictly above = abnormal)
    pub fn from_temperature(temperature: f64, threshold: f64) -> Self {
        if temperature > threshold {
            Status::Abnormal
        } else {
            Status::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "Normal",
            Status::Abnormal => "Abnormal",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Status::Normal),
            "abnormal" => Ok(Status::Abnormal),
            other => Err(format!("unknown status '{}' (expected Normal or Abnormal)", other)),
        }
    }
}

/// one normalized sensor observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    /// temperature in celsius
    pub temperature: f64,
    /// relative humidity, whole percent
    pub humidity: i64,
    pub status: Status,
    /// free-form source identifier (e.g. "ESP8266_DHT11")
    pub device_id: String,
    /// server ingestion time, kept alongside received_at for dashboards that key on it
    pub timestamp: DateTime<Utc>,
    /// server ingestion time; the only field used for ordering and filtering
    pub received_at: DateTime<Utc>,
    /// whatever clock value the device sent, echoed back untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_timestamp: Option<u64>,
}

/// message pushed over the live channel
///
/// serializes as `{"type": "sensor-data", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum LiveMessage {
    SensorData(Reading),
}

/// history window accepted by `GET /api/sensor-data?timeRange=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    OneHour,
    ThreeHours,
    SixHours,
    #[default]
    All,
}

impl TimeRange {
    /// lookback window, or None for "all"
    pub fn window(&self) -> Option<chrono::Duration> {
        match self {
            TimeRange::OneHour => Some(chrono::Duration::hours(1)),
            TimeRange::ThreeHours => Some(chrono::Duration::hours(3)),
            TimeRange::SixHours => Some(chrono::Duration::hours(6)),
            TimeRange::All => None,
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::OneHour),
            "3h" => Ok(TimeRange::ThreeHours),
            "6h" => Ok(TimeRange::SixHours),
            "all" => Ok(TimeRange::All),
            other => Err(format!("invalid timeRange '{}' (expected 1h, 3h, 6h or all)", other)),
        }
    }
}
