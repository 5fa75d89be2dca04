//! ==============================================================================
//! config.rs - Relay Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `relay.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: Where the http/websocket listener binds.
//!     - StoreConfig: History capacity and the "device connected" window.
//!     - IngestConfig: Abnormal threshold and default device id.
//!     - BroadcastConfig: Per-subscriber channel depth.
//!     - CorsConfig: Origins the dashboard dev server may call from.
//!     - ViewerConfig: Reconnect/poll timings baked into the dashboard page.
//!     - LoggingConfig: Default log level when RUST_LOG is unset.
//!     - SimulatorConfig: Where sensor-sim posts its readings.
//!
//! every section (and every field) has a default, so a partial file works.
//!
//! ==============================================================================

use crate::ingest::IngestPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MAX_CONNECTIVITY_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub broadcast: BroadcastConfig,
    pub cors: CorsConfig,
    pub viewer: ViewerConfig,
    pub logging: LoggingConfig,
    pub simulator: SimulatorConfig,
    /// where the values came from, for the startup summary
    #[serde(skip)]
    pub source: ConfigSource,
    /// problems hit while looking for a config file
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    #[default]
    Defaults,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3001 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub capacity: usize,
    pub connectivity_window_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: 1000, connectivity_window_secs: 60 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub abnormal_threshold: f64,
    pub default_device_id: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let policy = IngestPolicy::default();
        Self {
            abnormal_threshold: policy.abnormal_threshold,
            default_device_id: policy.default_device_id,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BroadcastConfig {
    pub channel_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { channel_depth: 32 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    /// empty = allow any origin
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewerConfig {
    pub reconnect_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub initial_limit: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self { reconnect_delay_secs: 5, poll_interval_secs: 30, initial_limit: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulatorConfig {
    pub target_url: String,
    pub interval_seconds: u64,
    pub device_id: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            target_url: "http://127.0.0.1:3001/api/sensor-data".to_string(),
            interval_seconds: 5,
            device_id: "SIM_DHT11".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: RelayConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.source = ConfigSource::File(path.as_ref().to_path_buf());

        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides
    ///
    /// `RELAY_CONFIG` names an explicit file; otherwise `config/relay.toml`
    /// and `../config/relay.toml` are tried in order.
    pub fn load_or_default() -> Self {
        let paths = match std::env::var("RELAY_CONFIG") {
            Ok(explicit) if !explicit.is_empty() => vec![PathBuf::from(explicit)],
            _ => vec![
                PathBuf::from("config").join("relay.toml"),
                PathBuf::from("..").join("config").join("relay.toml"),
            ],
        };

        let mut warnings = Vec::new();
        let mut loaded = None;
        for path in &paths {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    loaded = Some(config);
                    break;
                }
                Err(e) => warnings.push(format!("Failed to load {}: {}", path.display(), e)),
            }
        }

        let mut config = loaded.unwrap_or_default();
        if config.source == ConfigSource::Defaults {
            warnings.push("No config file found - using defaults".to_string());
        }
        config.load_warnings = warnings;
        config.apply_env_overrides(std::env::var("PORT").ok().as_deref());
        config
    }

    /// `PORT` wins over `server.port` so the relay can run under a process manager
    pub fn apply_env_overrides(&mut self, port: Option<&str>) {
        if let Some(raw) = port {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => self.load_warnings.push(format!("Ignoring invalid PORT '{}'", raw)),
            }
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ingest_policy(&self) -> IngestPolicy {
        IngestPolicy {
            abnormal_threshold: self.ingest.abnormal_threshold,
            default_device_id: self.ingest.default_device_id.clone(),
        }
    }

    /// clamped to a century so an absurd config value can't overflow chrono
    pub fn connectivity_window(&self) -> chrono::Duration {
        let secs = self.store.connectivity_window_secs.min(MAX_CONNECTIVITY_WINDOW_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        match &self.source {
            ConfigSource::File(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
            ConfigSource::Defaults => tracing::info!("[CONFIG] Using built-in defaults"),
        }
        for warning in &self.load_warnings {
            tracing::warn!("[CONFIG] Warning: {}", warning);
        }
        tracing::info!("[CONFIG] Listen: {}", self.server_address());
        tracing::info!(
            "[CONFIG] History: {} readings, connected window {}s",
            self.store.capacity,
            self.store.connectivity_window_secs
        );
        tracing::info!(
            "[CONFIG] Abnormal above {:.1}°C, default device '{}'",
            self.ingest.abnormal_threshold,
            self.ingest.default_device_id
        );
        tracing::info!("[CONFIG] Log Level: {}", self.logging.level);
    }
}
