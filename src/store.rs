//! ==============================================================================
//! store.rs - bounded in-memory history of readings
//! ==============================================================================
//!
//! purpose:
//!     holds the latest reading and the most recent `capacity` readings in
//!     arrival order. pure data structure: no locking, no i/o, and every
//!     time-dependent call takes `now` from the caller.
//!
//! invariants:
//!     - history.len() <= capacity (oldest entries dropped silently)
//!     - received_at is non-decreasing from front to back
//!     - latest() is always the back of history
//!
//! relationships:
//!     - owned by: service.rs (behind a tokio RwLock)
//!
//! ==============================================================================

use crate::domain::{Reading, ReadingId, TimeRange};
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// snapshot answer for `GET /api/status`
#[derive(Debug, Clone, PartialEq)]
pub struct Connectivity {
    pub connected: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub total_readings: usize,
}

#[derive(Debug)]
pub struct ReadingStore {
    capacity: usize,
    connectivity_window: Duration,
    history: VecDeque<Reading>,
    last_update: Option<DateTime<Utc>>,
}

impl ReadingStore {
    pub fn new(capacity: usize, connectivity_window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            connectivity_window,
            history: VecDeque::with_capacity(capacity),
            last_update: None,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// add a reading at the tail, trimming the head back down to capacity
    pub fn append(&mut self, reading: Reading, now: DateTime<Utc>) {
        self.history.push_back(reading);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.last_update = Some(now);
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.history.back()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// readings received within `range` of `now`, keeping only the newest `limit`
    pub fn query(&self, range: TimeRange, limit: Option<usize>, now: DateTime<Utc>) -> Vec<Reading> {
        let mut selected: Vec<Reading> = match range.window() {
            Some(window) => {
                let cutoff = now - window;
                self.history
                    .iter()
                    .filter(|r| r.received_at >= cutoff)
                    .cloned()
                    .collect()
            }
            None => self.history.iter().cloned().collect(),
        };

        if let Some(limit) = limit {
            let skip = selected.len().saturating_sub(limit);
            selected.drain(..skip);
        }

        selected
    }

    pub fn connectivity(&self, now: DateTime<Utc>) -> Connectivity {
        let connected = self
            .last_update
            .map(|at| now - at < self.connectivity_window)
            .unwrap_or(false);

        Connectivity {
            connected,
            last_update: self.last_update,
            total_readings: self.history.len(),
        }
    }

    /// ingestion time for the next reading, never earlier than the last one stored
    pub fn admission_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.latest() {
            Some(last) if last.received_at > now => last.received_at,
            _ => now,
        }
    }

    /// next id: the ingestion millisecond, bumped past the previous id on collisions
    pub fn next_id(&self, at: DateTime<Utc>) -> ReadingId {
        let millis = at.timestamp_millis().max(0) as u64;
        match self.latest() {
            Some(last) if last.id.0 >= millis => ReadingId(last.id.0 + 1),
            _ => ReadingId(millis),
        }
    }
}
