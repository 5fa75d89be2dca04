//! ==============================================================================
//! telemetry-relay - in-memory sensor relay with live fan-out
//! ==============================================================================
//!
//! a sensor posts temperature/humidity readings over http; the relay keeps
//! the most recent ones in memory, pushes each new reading to every
//! connected dashboard over a websocket, and answers history/status queries.
//!
//! ```text
//!     device ──POST──► ingest ──► store (append) ──► broadcaster ──► viewers
//!                                   ▲
//!     dashboard ──GET (history, latest, status)──┘
//! ```
//!
//! nothing is persisted. restarting the process starts from an empty store.
//!
//! ==============================================================================

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod routes;
pub mod service;
pub mod store;

pub use config::RelayConfig;
pub use domain::{LiveMessage, Reading, ReadingId, Status, TimeRange};
pub use error::{RelayError, Result};
pub use service::{RelayService, SharedRelay};

use tracing_subscriber::EnvFilter;

/// install the fmt subscriber; RUST_LOG wins over the configured level
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // a second init (e.g. from a test harness) is not an error worth failing on
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
