//! ==============================================================================
//! main.rs - telemetry relay entry point
//! ==============================================================================
//!
//! purpose:
//!     runs the relay: a single process that accepts readings from an
//!     embedded temperature/humidity sensor and serves them to dashboards.
//!
//! responsibilities:
//!     - load configuration (config/relay.toml, PORT)
//!     - install logging
//!     - build the one RelayService that owns all mutable state
//!     - serve the api, dashboard and live channel until ctrl-c / SIGTERM
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     relay process (this file)                │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!     │  │ POST ingress │   │ GET queries  │   │ websocket tasks  │  │
//!     │  │ (device)     │   │ (dashboard)  │   │ (one per viewer) │  │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘  │
//!     │         │                  │                    │            │
//!     │         └──────────────────┼────────────────────┘            │
//!     │                            │                                 │
//!     │                    ┌───────┴───────┐                         │
//!     │                    │ RelayService  │ <- service.rs           │
//!     │                    │ store + fanout│                         │
//!     │                    └───────────────┘                         │
//!     │          (Arc handle shared by every handler)                │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry_relay::routes::{self, AppState};
use telemetry_relay::{dashboard, init_tracing, RelayConfig, RelayService};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let config = RelayConfig::load_or_default();

    // step 2: logging (needs the configured level, so comes second)
    init_tracing(&config.logging.level);
    tracing::info!("===========================================================");
    tracing::info!("  Telemetry Relay");
    tracing::info!("  sensor -> memory -> live dashboards");
    tracing::info!("===========================================================");
    config.print_summary();

    // step 3: the single owner of readings and subscribers
    let relay = RelayService::new(&config).shared();
    let state = AppState {
        relay,
        dashboard: Arc::from(dashboard::render(&config)),
    };
    let app = routes::router(state, &config.cors);

    // step 4: bind and serve
    let addr = config.server_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("[STARTUP] ✓ Dashboard live at http://{}", addr);
    tracing::info!("[STARTUP] ✓ Ingress: POST http://{}/api/sensor-data", addr);
    tracing::info!("[STARTUP] ✓ Live channel: ws://{}/ws", addr);
    tracing::info!("[STARTUP] ✓ Health check: http://{}/api/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("[SHUTDOWN] Server closed");
    Ok(())
}

/// resolves on ctrl-c, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[SHUTDOWN] Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("[SHUTDOWN] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("[SHUTDOWN] ctrl-c received, shutting down gracefully"),
        _ = terminate => tracing::info!("[SHUTDOWN] SIGTERM received, shutting down gracefully"),
    }
}
