//! ==============================================================================
//! dashboard.rs - the browser viewer served at `/`
//! ==============================================================================
//!
//! the page is a single static file compiled into the binary. the only
//! server-side work is substituting the viewer timings from config, done
//! once at startup.
//!
//! viewer behaviour (implemented in dashboard.html):
//!     - initial load: GET /api/sensor-data?limit=<initial_limit>
//!     - live: websocket on /ws, reconnect after reconnect_delay_secs
//!     - fallback: every poll_interval_secs, poll /latest while the socket is
//!       not open, and /api/status regardless
//!     - refresh button: /latest and /api/status on demand
//!
//! ==============================================================================

use crate::config::RelayConfig;

const TEMPLATE: &str = include_str!("dashboard.html");

pub fn render(config: &RelayConfig) -> String {
    TEMPLATE
        .replace("__RECONNECT_MS__", &config.viewer.reconnect_delay_secs.saturating_mul(1000).to_string())
        .replace("__POLL_MS__", &config.viewer.poll_interval_secs.saturating_mul(1000).to_string())
        .replace("__INITIAL_LIMIT__", &config.viewer.initial_limit.to_string())
        .replace("__MAX_POINTS__", &config.store.capacity.max(1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_viewer_timings() {
        let html = render(&RelayConfig::default());
        assert!(html.contains("reconnectMs: 5000,"));
        assert!(html.contains("pollMs: 30000,"));
        assert!(html.contains("initialLimit: 100,"));
        assert!(html.contains("maxPoints: 1000,"));
        assert!(!html.contains("__"));
    }

    #[test]
    fn test_refresh_button_polls_latest_and_status() {
        let html = render(&RelayConfig::default());
        assert!(html.contains(r#"<button id="refresh">Refresh</button>"#));
        assert!(html.contains("$('refresh').addEventListener('click', () => { pollLatest(); checkStatus(); });"));
    }

    #[test]
    fn test_render_saturates_huge_timings() {
        let mut config = RelayConfig::default();
        config.viewer.reconnect_delay_secs = u64::MAX;
        let html = render(&config);
        assert!(html.contains(&format!("reconnectMs: {},", u64::MAX)));
    }
}
