//! Test recorders — `Recorder` implementations that fail on demand.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use leasehold_core::error::DomainError;
use leasehold_core::memory::InMemoryRecorder;
use leasehold_core::recorder::{
    EventSelection, Notification, Recorder, StoredEvent, TrackingRecorder,
};
use leasehold_core::snapshot::Snapshot;
use uuid::Uuid;

/// A recorder whose every call fails with the configured error.
#[derive(Debug)]
pub struct FailingRecorder {
    error: DomainError,
}

impl FailingRecorder {
    /// Fails every call with `error`.
    #[must_use]
    pub fn new(error: DomainError) -> Self {
        Self { error }
    }

    /// Fails every call with `DomainError::Infrastructure`.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(DomainError::Infrastructure("database unavailable".into()))
    }
}

#[async_trait]
impl Recorder for FailingRecorder {
    async fn insert_events(
        &self,
        _originator_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<Vec<i64>, DomainError> {
        Err(self.error.clone())
    }

    async fn select_events(
        &self,
        _originator_id: Uuid,
        _selection: EventSelection,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(self.error.clone())
    }

    async fn insert_snapshot(&self, _snapshot: &Snapshot) -> Result<(), DomainError> {
        Err(self.error.clone())
    }

    async fn select_snapshot(
        &self,
        _originator_id: Uuid,
        _max_version: Option<i64>,
    ) -> Result<Option<Snapshot>, DomainError> {
        Err(self.error.clone())
    }

    async fn select_notifications(
        &self,
        _start: i64,
        _limit: i64,
        _stop: Option<i64>,
        _topics: &[String],
    ) -> Result<Vec<Notification>, DomainError> {
        Err(self.error.clone())
    }

    async fn max_notification_id(&self) -> Result<i64, DomainError> {
        Err(self.error.clone())
    }
}

#[async_trait]
impl TrackingRecorder for FailingRecorder {
    async fn max_tracking_id(&self, _projection: &str) -> Result<i64, DomainError> {
        Err(self.error.clone())
    }

    async fn insert_tracking(
        &self,
        _projection: &str,
        _notification_id: i64,
    ) -> Result<(), DomainError> {
        Err(self.error.clone())
    }
}

#[derive(Debug)]
struct Fault {
    error: Option<DomainError>,
    commit: bool,
}

/// An in-memory recorder with injectable write faults.
///
/// Queued faults are consumed one per `insert_events` call. A fault queued
/// with [`FlakyRecorder::lose_next_ack`] commits the batch before failing,
/// which is what a dropped connection during commit looks like to a caller.
#[derive(Debug, Default)]
pub struct FlakyRecorder {
    inner: InMemoryRecorder,
    faults: Mutex<VecDeque<Fault>>,
    fail_snapshots: AtomicBool,
}

impl FlakyRecorder {
    /// Creates a recorder with no faults queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next insert fails with `error` and writes nothing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_insert(&self, error: DomainError) {
        self.faults.lock().unwrap().push_back(Fault {
            error: Some(error),
            commit: false,
        });
    }

    /// The next insert goes through untouched, so a fault queued after it
    /// hits the insert after that.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pass_next_insert(&self) {
        self.faults.lock().unwrap().push_back(Fault {
            error: None,
            commit: true,
        });
    }

    /// The next insert commits, then reports `error`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn lose_next_ack(&self, error: DomainError) {
        self.faults.lock().unwrap().push_back(Fault {
            error: Some(error),
            commit: true,
        });
    }

    /// Makes every snapshot write fail.
    pub fn fail_snapshots(&self) {
        self.fail_snapshots.store(true, Ordering::SeqCst);
    }

    /// The wrapped recorder.
    #[must_use]
    pub fn inner(&self) -> &InMemoryRecorder {
        &self.inner
    }

    fn next_fault(&self) -> Option<Fault> {
        self.faults.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Recorder for FlakyRecorder {
    async fn insert_events(
        &self,
        originator_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<Vec<i64>, DomainError> {
        match self.next_fault() {
            Some(Fault {
                error: Some(error),
                commit: true,
            }) => {
                self.inner
                    .insert_events(originator_id, expected_version, events)
                    .await?;
                Err(error)
            }
            Some(Fault {
                error: Some(error), ..
            }) => Err(error),
            _ => {
                self.inner
                    .insert_events(originator_id, expected_version, events)
                    .await
            }
        }
    }

    async fn select_events(
        &self,
        originator_id: Uuid,
        selection: EventSelection,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.select_events(originator_id, selection).await
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("snapshot write failed".into()));
        }
        self.inner.insert_snapshot(snapshot).await
    }

    async fn select_snapshot(
        &self,
        originator_id: Uuid,
        max_version: Option<i64>,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.inner.select_snapshot(originator_id, max_version).await
    }

    async fn select_notifications(
        &self,
        start: i64,
        limit: i64,
        stop: Option<i64>,
        topics: &[String],
    ) -> Result<Vec<Notification>, DomainError> {
        self.inner
            .select_notifications(start, limit, stop, topics)
            .await
    }

    async fn max_notification_id(&self) -> Result<i64, DomainError> {
        self.inner.max_notification_id().await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn event(originator_id: Uuid, version: i64) -> StoredEvent {
        StoredEvent {
            originator_id,
            originator_version: version,
            topic: "test.happened".to_owned(),
            state: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fail_next_insert_writes_nothing() {
        let recorder = FlakyRecorder::new();
        let id = Uuid::new_v4();
        recorder.fail_next_insert(DomainError::Ambiguous("timeout".into()));

        let first = recorder.insert_events(id, 0, &[event(id, 1)]).await;
        let second = recorder.insert_events(id, 0, &[event(id, 1)]).await;

        assert!(matches!(first, Err(DomainError::Ambiguous(_))));
        assert_eq!(second.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_pass_next_insert_delays_fault() {
        let recorder = FlakyRecorder::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        recorder.pass_next_insert();
        recorder.fail_next_insert(DomainError::Infrastructure("down".into()));

        let first = recorder.insert_events(a, 0, &[event(a, 1)]).await;
        let second = recorder.insert_events(b, 0, &[event(b, 1)]).await;

        assert_eq!(first.unwrap(), vec![1]);
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_lose_next_ack_commits_then_fails() {
        let recorder = FlakyRecorder::new();
        let id = Uuid::new_v4();
        recorder.lose_next_ack(DomainError::Ambiguous("connection reset".into()));

        let result = recorder.insert_events(id, 0, &[event(id, 1)]).await;

        assert!(matches!(result, Err(DomainError::Ambiguous(_))));
        assert_eq!(recorder.max_notification_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failing_recorder_fails_everything() {
        let recorder = FailingRecorder::unavailable();

        assert!(recorder.max_notification_id().await.is_err());
        assert!(recorder.max_tracking_id("p").await.is_err());
    }
}
