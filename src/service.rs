//! ==============================================================================
//! service.rs - the relay: one owner for the store and the subscriber registry
//! ==============================================================================
//!
//! purpose:
//!     `RelayService` is built once at startup and shared with the http layer
//!     as `Arc<RelayService>`. it is the only thing that mutates the reading
//!     store, and the only thing that talks to the broadcaster.
//!
//! locking:
//!
//! ```text
//!     ingest:     store.write ──► append ──► broadcaster.publish ──► release
//!     subscribe:  store.read  ──► latest ──► broadcaster.subscribe ──► release
//!     queries:    store.read  ──► snapshot ──► release
//! ```
//!
//! lock order is always store -> registry. because ingest keeps the store
//! write lock across publish, a viewer that joins concurrently with an
//! ingest gets that reading exactly once: either as its catch-up item or
//! as a regular push, never both and never neither.
//!
//! relationships:
//!     - owns: store.rs (ReadingStore), broadcast.rs (Broadcaster)
//!     - uses: ingest.rs (validation), clock.rs (time)
//!     - used by: routes.rs (every handler), main.rs (construction)
//!
//! ==============================================================================

use crate::broadcast::{Broadcaster, SubscriberId, Subscription};
use crate::clock::{Clock, SystemClock};
use crate::config::RelayConfig;
use crate::domain::{Reading, TimeRange};
use crate::error::{RelayError, Result};
use crate::ingest::{self, IngestPolicy, SensorSubmission};
use crate::store::{Connectivity, ReadingStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedRelay = Arc<RelayService>;

/// latest reading plus when the store last changed
#[derive(Debug, Clone)]
pub struct LatestSnapshot {
    pub reading: Reading,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub readings: Vec<Reading>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub connectivity: Connectivity,
    pub uptime_secs: f64,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: f64,
    pub last_update: Option<DateTime<Utc>>,
}

pub struct RelayService {
    store: RwLock<ReadingStore>,
    broadcaster: Broadcaster,
    policy: IngestPolicy,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    show_sensor_data: bool,
}

impl RelayService {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RelayConfig, clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            store: RwLock::new(ReadingStore::new(config.store.capacity, config.connectivity_window())),
            broadcaster: Broadcaster::new(config.broadcast.channel_depth),
            policy: config.ingest_policy(),
            clock,
            started_at,
            show_sensor_data: config.logging.show_sensor_data,
        }
    }

    pub fn shared(self) -> SharedRelay {
        Arc::new(self)
    }

    // ==========================================================================
    // ingress
    // ==========================================================================

    /// validate, stamp, store and broadcast one submission
    ///
    /// a rejected submission leaves the store untouched and is not broadcast.
    pub async fn ingest(&self, submission: SensorSubmission) -> Result<Reading> {
        let valid = ingest::validate(submission, &self.policy)?;

        let mut store = self.store.write().await;
        let received_at = store.admission_time(self.clock.now());
        let id = store.next_id(received_at);
        let reading = valid.into_reading(id, received_at);

        store.append(reading.clone(), received_at);
        let delivered = self.broadcaster.publish(&reading).await;
        drop(store);

        if self.show_sensor_data {
            tracing::info!(
                "[INGEST] {} | Temp: {:.1}°C | Humidity: {}% | {} | pushed to {} viewer(s)",
                reading.device_id,
                reading.temperature,
                reading.humidity,
                reading.status.as_str(),
                delivered
            );
        } else {
            tracing::debug!("[INGEST] Reading {} stored, pushed to {} viewer(s)", reading.id, delivered);
        }

        Ok(reading)
    }

    // ==========================================================================
    // queries (read-only)
    // ==========================================================================

    pub async fn latest(&self) -> Result<LatestSnapshot> {
        let store = self.store.read().await;
        let reading = store
            .latest()
            .cloned()
            .ok_or_else(|| RelayError::NotFound("No sensor data available".to_string()))?;
        Ok(LatestSnapshot { reading, last_update: store.last_update() })
    }

    pub async fn history(&self, range: TimeRange, limit: Option<usize>) -> HistorySnapshot {
        let store = self.store.read().await;
        HistorySnapshot {
            readings: store.query(range, limit, self.clock.now()),
            last_update: store.last_update(),
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        let now = self.clock.now();
        let connectivity = self.store.read().await.connectivity(now);
        StatusSnapshot { connectivity, uptime_secs: self.uptime_at(now) }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let now = self.clock.now();
        let last_update = self.store.read().await.last_update();
        HealthSnapshot { timestamp: now, uptime_secs: self.uptime_at(now), last_update }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn uptime_at(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    // ==========================================================================
    // live subscribers
    // ==========================================================================

    /// register a viewer; its inbox already holds the latest reading, if any
    pub async fn subscribe(&self) -> Subscription {
        let store = self.store.read().await;
        self.broadcaster.subscribe(store.latest()).await
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id).await
    }

    pub async fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count().await
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{LiveMessage, Status};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn relay() -> (RelayService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
        let service = RelayService::with_clock(&RelayConfig::default(), clock.clone());
        (service, clock)
    }

    fn submission(body: serde_json::Value) -> SensorSubmission {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_latest_equals_ingested_reading() {
        let (relay, _) = relay();
        let stored = relay.ingest(submission(json!({"temperature": 31, "humidity": 40}))).await.unwrap();
        assert_eq!(stored.status, Status::Abnormal);

        let latest = relay.latest().await.unwrap();
        assert_eq!(latest.reading, stored);
        assert_eq!(latest.last_update, Some(stored.received_at));
    }

    #[tokio::test]
    async fn test_latest_not_found_when_empty() {
        let (relay, _) = relay();
        assert!(matches!(relay.latest().await, Err(RelayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejected_submission_leaves_store_alone() {
        let (relay, _) = relay();
        relay.ingest(submission(json!({"temperature": 20, "humidity": 40}))).await.unwrap();
        let mut viewer = relay.subscribe().await;
        viewer.inbox.try_recv().unwrap();

        let err = relay.ingest(submission(json!({"humidity": 40}))).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert_eq!(relay.status().await.connectivity.total_readings, 1);
        assert!(viewer.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_time_catch_up() {
        let (relay, _) = relay();

        let mut early = relay.subscribe().await;
        assert!(early.inbox.try_recv().is_err());

        let first = relay.ingest(submission(json!({"temperature": 22, "humidity": 50}))).await.unwrap();
        assert_eq!(early.inbox.try_recv().unwrap(), LiveMessage::SensorData(first.clone()));

        let mut late = relay.subscribe().await;
        assert_eq!(late.inbox.try_recv().unwrap(), LiveMessage::SensorData(first));
        assert!(late.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_viewer_gets_nothing() {
        let (relay, _) = relay();
        let mut viewer = relay.subscribe().await;
        assert!(relay.unsubscribe(viewer.id).await);
        assert!(!relay.unsubscribe(viewer.id).await);

        relay.ingest(submission(json!({"temperature": 22, "humidity": 50}))).await.unwrap();
        assert!(viewer.inbox.try_recv().is_err());
        assert_eq!(relay.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_connectivity_expires_after_sixty_seconds() {
        let (relay, clock) = relay();
        assert!(!relay.status().await.connectivity.connected);

        relay.ingest(submission(json!({"temperature": 22, "humidity": 50}))).await.unwrap();
        assert!(relay.status().await.connectivity.connected);

        clock.advance(Duration::seconds(60));
        let status = relay.status().await;
        assert!(!status.connectivity.connected);
        assert_eq!(status.uptime_secs, 60.0);
    }

    #[tokio::test]
    async fn test_history_window_uses_server_time() {
        let (relay, clock) = relay();
        // device clock claims the distant past; ordering ignores it
        relay
            .ingest(submission(json!({"temperature": 18, "humidity": 30, "timestamp": 5})))
            .await
            .unwrap();
        clock.advance(Duration::minutes(90));
        relay.ingest(submission(json!({"temperature": 19, "humidity": 31}))).await.unwrap();
        clock.advance(Duration::minutes(10));

        let hour = relay.history(TimeRange::OneHour, None).await;
        assert_eq!(hour.readings.len(), 1);
        assert_eq!(hour.readings[0].temperature, 19.0);
        assert_eq!(relay.history(TimeRange::ThreeHours, None).await.readings.len(), 2);
    }

    #[tokio::test]
    async fn test_clock_step_back_keeps_order() {
        let (relay, clock) = relay();
        let first = relay.ingest(submission(json!({"temperature": 20, "humidity": 40}))).await.unwrap();
        clock.advance(Duration::seconds(-30));
        let second = relay.ingest(submission(json!({"temperature": 21, "humidity": 40}))).await.unwrap();

        assert_eq!(second.received_at, first.received_at);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_health_reports_last_update() {
        let (relay, clock) = relay();
        assert_eq!(relay.health().await.last_update, None);
        let r = relay.ingest(submission(json!({"temperature": 20, "humidity": 40}))).await.unwrap();
        clock.advance(Duration::seconds(2));
        let health = relay.health().await;
        assert_eq!(health.last_update, Some(r.received_at));
        assert_eq!(health.uptime_secs, 2.0);
    }
}
