//! ==============================================================================
//! broadcast.rs - fan-out of new readings to live subscribers
//! ==============================================================================
//!
//! purpose:
//!     keeps a registry of connected viewers (subscriber id -> bounded
//!     channel) and offers every new reading to each of them.
//!
//! semantics:
//!     - best effort: a subscriber whose channel is full is "not ready" and
//!       simply misses that reading. nothing is queued for later.
//!     - publish iterates over a snapshot of the registry, so joins and
//!       leaves during a publish never alias the iteration.
//!     - delivery order across subscribers is whatever the map yields.
//!     - a closed channel (viewer task gone) is pruned on the next publish,
//!       on top of the explicit unsubscribe the websocket task performs.
//!
//! relationships:
//!     - used by: service.rs (publish on ingest, subscribe with catch-up)
//!     - consumed by: routes.rs (websocket task drains Subscription::inbox)
//!
//! ==============================================================================

use crate::domain::{LiveMessage, Reading};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

pub type SubscriberId = u64;

/// a registered viewer's end of the fan-out
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub inbox: mpsc::Receiver<LiveMessage>,
}

#[derive(Debug)]
pub struct Broadcaster {
    depth: usize,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<LiveMessage>>>,
}

impl Broadcaster {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// register a subscriber, pre-loading its inbox with `catch_up` if given
    pub async fn subscribe(&self, catch_up: Option<&Reading>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.depth);

        if let Some(reading) = catch_up {
            // fresh channel with depth >= 1, cannot be full
            let _ = tx.try_send(LiveMessage::SensorData(reading.clone()));
        }

        self.subscribers.write().await.insert(id, tx);
        tracing::debug!("[WS] Subscriber {} registered", id);

        Subscription { id, inbox: rx }
    }

    /// returns whether the subscriber was still registered
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!("[WS] Subscriber {} removed", id);
        }
        removed
    }

    /// offer `reading` to every ready subscriber; returns how many took it
    pub async fn publish(&self, reading: &Reading) -> usize {
        let targets: Vec<(SubscriberId, mpsc::Sender<LiveMessage>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let message = LiveMessage::SensorData(reading.clone());
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("[WS] Subscriber {} not ready, skipping reading {}", id, reading.id);
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in closed {
                subs.remove(&id);
            }
        }

        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReadingId, Status};
    use chrono::Utc;

    fn reading(id: u64) -> Reading {
        let now = Utc::now();
        Reading {
            id: ReadingId(id),
            temperature: 21.0,
            humidity: 45,
            status: Status::Normal,
            device_id: "test".to_string(),
            timestamp: now,
            received_at: now,
            device_timestamp: None,
        }
    }

    fn id_of(message: LiveMessage) -> u64 {
        match message {
            LiveMessage::SensorData(r) => r.id.0,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let hub = Broadcaster::new(8);
        let mut a = hub.subscribe(None).await;
        let mut b = hub.subscribe(None).await;

        assert_eq!(hub.publish(&reading(7)).await, 2);
        assert_eq!(id_of(a.inbox.recv().await.unwrap()), 7);
        assert_eq!(id_of(b.inbox.recv().await.unwrap()), 7);
    }

    #[tokio::test]
    async fn test_catch_up_is_exactly_one_item() {
        let hub = Broadcaster::new(8);

        let mut empty = hub.subscribe(None).await;
        assert!(empty.inbox.try_recv().is_err());

        let mut late = hub.subscribe(Some(&reading(3))).await;
        assert_eq!(id_of(late.inbox.try_recv().unwrap()), 3);
        assert!(late.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = Broadcaster::new(8);
        let sub = hub.subscribe(None).await;

        assert!(hub.unsubscribe(sub.id).await);
        assert!(!hub.unsubscribe(sub.id).await);
        assert_eq!(hub.subscriber_count().await, 0);
        assert_eq!(hub.publish(&reading(1)).await, 0);
    }

    #[tokio::test]
    async fn test_full_subscriber_is_skipped_not_queued() {
        let hub = Broadcaster::new(1);
        let mut slow = hub.subscribe(None).await;
        let mut fast = hub.subscribe(None).await;

        assert_eq!(hub.publish(&reading(1)).await, 2);
        assert_eq!(id_of(fast.inbox.recv().await.unwrap()), 1);

        // slow has not drained reading 1, so it misses reading 2
        assert_eq!(hub.publish(&reading(2)).await, 1);
        assert_eq!(id_of(fast.inbox.recv().await.unwrap()), 2);

        assert_eq!(id_of(slow.inbox.recv().await.unwrap()), 1);
        assert!(slow.inbox.try_recv().is_err());
        assert_eq!(hub.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_closed_subscriber_pruned_on_publish() {
        let hub = Broadcaster::new(4);
        let gone = hub.subscribe(None).await;
        let _kept = hub.subscribe(None).await;
        drop(gone.inbox);

        assert_eq!(hub.publish(&reading(1)).await, 1);
        assert_eq!(hub.subscriber_count().await, 1);
    }
}
