//! ==============================================================================
//! sensor_sim.rs - stand-in for the embedded sensor
//! ==============================================================================
//!
//! purpose:
//!     posts a synthetic DHT-style reading to the relay on a fixed interval,
//!     the way a sensor node pushes into the hub. handy for exercising the
//!     dashboard without hardware.
//!
//!     temperature drifts slowly around 27°C and crosses the 30°C abnormal
//!     threshold at the top of each cycle, so both statuses show up.
//!
//! usage:
//!     cargo run --bin sensor-sim            (uses [simulator] from relay.toml)
//!
//! ==============================================================================

use anyhow::Result;
use serde_json::{json, Value};
use std::time::Duration;
use telemetry_relay::{init_tracing, RelayConfig};

/// one reading per step; a full temperature cycle takes 120 steps
fn synth_reading(step: u64, device_id: &str) -> Value {
    let phase = step as f64 * std::f64::consts::TAU / 120.0;
    let temperature = 27.0 + 4.0 * phase.sin();
    let humidity = 55.0 - 12.0 * phase.sin();
    json!({
        "temperature": (temperature * 10.0).round() / 10.0,
        "humidity": humidity.round() as i64,
        "device_id": device_id,
        "timestamp": step * 1000,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::load_or_default();
    init_tracing(&config.logging.level);

    let sim = config.simulator;
    tracing::info!(
        "[SIM] Posting to {} every {}s as '{}'",
        sim.target_url,
        sim.interval_seconds,
        sim.device_id
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mut ticker = tokio::time::interval(Duration::from_secs(sim.interval_seconds.max(1)));
    let mut step: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[SIM] Stopping after {} readings", step);
                return Ok(());
            }
        }

        let body = synth_reading(step, &sim.device_id);
        step += 1;

        match client.post(&sim.target_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(
                    "[SIM] Sent Temp: {}°C | Humidity: {}%",
                    body["temperature"],
                    body["humidity"]
                );
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                tracing::warn!("[SIM] ⚠ Relay rejected reading ({}): {}", status, text);
            }
            Err(e) => {
                tracing::warn!("[SIM] ⚠ Send error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_crosses_threshold() {
        let temps: Vec<f64> = (0..120)
            .map(|s| synth_reading(s, "sim")["temperature"].as_f64().unwrap())
            .collect();
        assert!(temps.iter().any(|t| *t > 30.0));
        assert!(temps.iter().any(|t| *t <= 30.0));
    }

    #[test]
    fn test_payload_shape() {
        let body = synth_reading(3, "sim-1");
        assert_eq!(body["device_id"], "sim-1");
        assert_eq!(body["timestamp"], 3000);
        assert!(body["humidity"].is_i64());
    }
}
