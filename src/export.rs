//! ==============================================================================
//! export.rs - csv / json download of the reading history
//! ==============================================================================
//!
//! purpose:
//!     renders a filtered slice of history as a file the dashboard's export
//!     links download. csv fields are quoted per RFC 4180 when needed.
//!
//! relationships:
//!     - used by: routes.rs (GET /api/sensor-data/export)
//!     - reads: service.rs history snapshots
//!
//! ==============================================================================

use crate::domain::Reading;
use chrono::{DateTime, SecondsFormat, Utc};
use std::str::FromStr;

const CSV_HEADER: &str = "Timestamp,Temperature (°C),Humidity (%),Status,Device ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json; charset=utf-8",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// e.g. `sensor-data-2025-06-01.csv`
    pub fn file_name(&self, on: DateTime<Utc>) -> String {
        format!("sensor-data-{}.{}", on.format("%Y-%m-%d"), self.extension())
    }

    pub fn render(&self, readings: &[Reading]) -> anyhow::Result<String> {
        match self {
            ExportFormat::Csv => Ok(to_csv(readings)),
            ExportFormat::Json => Ok(serde_json::to_string_pretty(readings)?),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("invalid format '{}' (expected csv or json)", other)),
        }
    }
}

pub fn to_csv(readings: &[Reading]) -> String {
    let mut out = String::from(CSV_HEADER);
    for r in readings {
        out.push('\n');
        out.push_str(&format!(
            "{},{},{},{},{}",
            r.received_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            r.temperature,
            r.humidity,
            r.status.as_str(),
            csv_field(&r.device_id)
        ));
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReadingId, Status};
    use chrono::TimeZone;

    fn reading(device_id: &str) -> Reading {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        Reading {
            id: ReadingId(1),
            temperature: 31.5,
            humidity: 44,
            status: Status::Abnormal,
            device_id: device_id.to_string(),
            timestamp: at,
            received_at: at,
            device_timestamp: None,
        }
    }

    #[test]
    fn test_csv_rows() {
        let csv = to_csv(&[reading("ESP8266_DHT11")]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "2025-06-01T08:30:00Z,31.5,44,Abnormal,ESP8266_DHT11");
    }

    #[test]
    fn test_csv_quotes_awkward_device_ids() {
        let csv = to_csv(&[reading("lab, \"north\"")]);
        assert!(csv.ends_with(",\"lab, \"\"north\"\"\""));
    }

    #[test]
    fn test_file_name_and_format_parse() {
        let on = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(ExportFormat::Json.file_name(on), "sensor-data-2025-06-01.json");
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
