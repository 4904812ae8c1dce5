//! Snapshots and the policy that decides when to take them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Aggregate state immediately after the event at `originator_version` was
/// applied. Snapshots only shorten replay; events remain the source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Aggregate the snapshot belongs to.
    pub originator_id: Uuid,
    /// Version of the last event folded into `state`.
    pub originator_version: i64,
    /// Aggregate type name.
    pub topic: String,
    /// Encoded aggregate state.
    pub state: serde_json::Value,
    /// Timestamp of the event at `originator_version`.
    pub timestamp: DateTime<Utc>,
}

/// Snapshot cadence, decided by the application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotPolicy {
    interval: Option<i64>,
}

impl SnapshotPolicy {
    /// Never take snapshots.
    #[must_use]
    pub fn disabled() -> Self {
        Self { interval: None }
    }

    /// Take a snapshot whenever a save crosses a multiple of `interval`.
    /// An interval below 1 disables snapshots.
    #[must_use]
    pub fn every(interval: i64) -> Self {
        Self {
            interval: (interval > 0).then_some(interval),
        }
    }

    /// Returns the configured interval.
    #[must_use]
    pub fn interval(&self) -> Option<i64> {
        self.interval
    }

    /// Returns `true` if moving from version `before` to `after` crossed a
    /// snapshot boundary.
    #[must_use]
    pub fn is_due(&self, before: i64, after: i64) -> bool {
        match self.interval {
            Some(n) => after > before && before / n != after / n,
            None => false,
        }
    }
}
