//! Recorder abstraction: the storage-facing side of the event store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;
use crate::snapshot::Snapshot;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Aggregate this event belongs to.
    pub originator_id: Uuid,
    /// Version within the aggregate stream.
    pub originator_version: i64,
    /// Event topic for decoder lookup.
    pub topic: String,
    /// Encoded event payload.
    pub state: serde_json::Value,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
}

/// A stored event as seen through the globally ordered notification log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Gap-free, globally increasing sequence number assigned at commit.
    pub id: i64,
    /// Aggregate the event belongs to.
    pub originator_id: Uuid,
    /// Version within the aggregate stream.
    pub originator_version: i64,
    /// Event topic.
    pub topic: String,
    /// Encoded event payload.
    pub state: serde_json::Value,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Returns the event part of this notification.
    #[must_use]
    pub fn to_stored_event(&self) -> StoredEvent {
        StoredEvent {
            originator_id: self.originator_id,
            originator_version: self.originator_version,
            topic: self.topic.clone(),
            state: self.state.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Version window for reading an aggregate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSelection {
    /// First version to return (inclusive).
    pub from_version: i64,
    /// Last version to return (inclusive), unbounded when `None`.
    pub to_version: Option<i64>,
    /// Maximum number of events to return, unbounded when `None`.
    pub limit: Option<i64>,
}

impl Default for EventSelection {
    fn default() -> Self {
        Self {
            from_version: 1,
            to_version: None,
            limit: None,
        }
    }
}

impl EventSelection {
    /// Selects every event from `version` onwards.
    #[must_use]
    pub fn from_version(version: i64) -> Self {
        Self {
            from_version: version,
            ..Self::default()
        }
    }

    /// Bounds the selection to versions up to and including `version`.
    #[must_use]
    pub fn up_to(mut self, version: Option<i64>) -> Self {
        self.to_version = version;
        self
    }

    /// Limits the number of returned events.
    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Storage contract for events, snapshots and notifications.
///
/// Implementations own durable storage and are the only place where
/// transaction boundaries and connection handling live.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Atomically appends `events` for one aggregate, returning the
    /// notification ids assigned to them in order.
    ///
    /// Fails with `ConcurrencyConflict` unless the aggregate's current version
    /// equals `expected_version` at commit.
    async fn insert_events(
        &self,
        originator_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<Vec<i64>, DomainError>;

    /// Loads events for an aggregate in ascending version order.
    async fn select_events(
        &self,
        originator_id: Uuid,
        selection: EventSelection,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Stores a snapshot. Independent of any event commit.
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError>;

    /// Loads the newest snapshot, optionally at or below `max_version`.
    async fn select_snapshot(
        &self,
        originator_id: Uuid,
        max_version: Option<i64>,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Loads up to `limit` notifications with `id >= start` (and
    /// `id <= stop` when given), ascending. An empty `topics` slice means
    /// every topic.
    async fn select_notifications(
        &self,
        start: i64,
        limit: i64,
        stop: Option<i64>,
        topics: &[String],
    ) -> Result<Vec<Notification>, DomainError>;

    /// Returns the highest committed notification id, or 0 when empty.
    async fn max_notification_id(&self) -> Result<i64, DomainError>;
}

/// Storage contract for projection read positions.
#[async_trait]
pub trait TrackingRecorder: Send + Sync {
    /// Returns the last notification id processed by `projection`, or 0.
    async fn max_tracking_id(&self, projection: &str) -> Result<i64, DomainError>;

    /// Records that `projection` has processed up to `notification_id`.
    /// Positions never move backwards.
    async fn insert_tracking(&self, projection: &str, notification_id: i64)
    -> Result<(), DomainError>;
}

/// Checks that a batch belongs to `originator_id` and continues its stream
/// contiguously from `expected_version`.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a malformed batch.
pub fn validate_batch(
    originator_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    if expected_version < 0 {
        return Err(DomainError::Validation(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    for (offset, event) in (1_i64..).zip(events) {
        if event.originator_id != originator_id {
            return Err(DomainError::Validation(format!(
                "event for {} in batch for aggregate {originator_id}",
                event.originator_id
            )));
        }
        if event.originator_version != expected_version + offset {
            return Err(DomainError::Validation(format!(
                "event version {} does not follow {} in aggregate {originator_id}",
                event.originator_version,
                expected_version + offset - 1
            )));
        }
    }
    Ok(())
}
