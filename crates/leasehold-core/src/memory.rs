//! In-memory recorder with the same semantics as the `PostgreSQL` one.
//!
//! All state sits behind a single mutex, so every insert is atomic and
//! notification ids are assigned in commit order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;
use crate::recorder::{
    EventSelection, Notification, Recorder, StoredEvent, TrackingRecorder, validate_batch,
};
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
struct State {
    streams: HashMap<Uuid, Vec<StoredEvent>>,
    notifications: Vec<Notification>,
    snapshots: HashMap<Uuid, BTreeMap<i64, Snapshot>>,
    tracking: HashMap<String, i64>,
}

/// Recorder that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    state: Mutex<State>,
}

impl InMemoryRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Infrastructure("in-memory recorder lock poisoned".into()))
    }
}

#[async_trait]
impl Recorder for InMemoryRecorder {
    async fn insert_events(
        &self,
        originator_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<Vec<i64>, DomainError> {
        validate_batch(originator_id, expected_version, events)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.lock()?;
        let actual = state
            .streams
            .get(&originator_id)
            .and_then(|stream| stream.last())
            .map_or(0, |event| event.originator_version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: originator_id,
                expected: expected_version,
                actual,
            });
        }

        let mut next_id = state.notifications.last().map_or(0, |n| n.id);
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            next_id += 1;
            ids.push(next_id);
            state.notifications.push(Notification {
                id: next_id,
                originator_id: event.originator_id,
                originator_version: event.originator_version,
                topic: event.topic.clone(),
                state: event.state.clone(),
                timestamp: event.timestamp,
            });
        }
        state
            .streams
            .entry(originator_id)
            .or_default()
            .extend_from_slice(events);
        Ok(ids)
    }

    async fn select_events(
        &self,
        originator_id: Uuid,
        selection: EventSelection,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let state = self.lock()?;
        let Some(stream) = state.streams.get(&originator_id) else {
            return Ok(Vec::new());
        };
        let limit = selection
            .limit
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(0));
        Ok(stream
            .iter()
            .filter(|e| e.originator_version >= selection.from_version)
            .filter(|e| selection.to_version.is_none_or(|to| e.originator_version <= to))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        state
            .snapshots
            .entry(snapshot.originator_id)
            .or_default()
            .insert(snapshot.originator_version, snapshot.clone());
        Ok(())
    }

    async fn select_snapshot(
        &self,
        originator_id: Uuid,
        max_version: Option<i64>,
    ) -> Result<Option<Snapshot>, DomainError> {
        let state = self.lock()?;
        Ok(state.snapshots.get(&originator_id).and_then(|versions| {
            versions
                .range(..=max_version.unwrap_or(i64::MAX))
                .next_back()
                .map(|(_, snapshot)| snapshot.clone())
        }))
    }

    async fn select_notifications(
        &self,
        start: i64,
        limit: i64,
        stop: Option<i64>,
        topics: &[String],
    ) -> Result<Vec<Notification>, DomainError> {
        let state = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.id >= start)
            .take_while(|n| stop.is_none_or(|stop| n.id <= stop))
            .filter(|n| topics.is_empty() || topics.iter().any(|t| *t == n.topic))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn max_notification_id(&self) -> Result<i64, DomainError> {
        let state = self.lock()?;
        Ok(state.notifications.last().map_or(0, |n| n.id))
    }
}

#[async_trait]
impl TrackingRecorder for InMemoryRecorder {
    async fn max_tracking_id(&self, projection: &str) -> Result<i64, DomainError> {
        let state = self.lock()?;
        Ok(state.tracking.get(projection).copied().unwrap_or(0))
    }

    async fn insert_tracking(
        &self,
        projection: &str,
        notification_id: i64,
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        let position = state.tracking.entry(projection.to_owned()).or_insert(0);
        *position = (*position).max(notification_id);
        Ok(())
    }
}
