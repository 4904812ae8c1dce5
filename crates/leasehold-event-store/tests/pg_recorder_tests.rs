//! Integration tests for `PgRecorder`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use leasehold_core::error::DomainError;
use leasehold_core::notification::NotificationLog;
use leasehold_core::recorder::{EventSelection, Recorder, StoredEvent, TrackingRecorder};
use leasehold_core::snapshot::Snapshot;
use leasehold_event_store::pg_recorder::PgRecorder;
use sqlx::PgPool;
use uuid::Uuid;

/// Builds a provisioned recorder over the per-test database.
async fn recorder(pool: PgPool) -> PgRecorder {
    let recorder = PgRecorder::new(pool)
        .with_operation_timeout(Duration::from_secs(10))
        .with_lock_timeout(Duration::from_secs(5));
    recorder.provision().await.unwrap();
    recorder
}

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_stored_event(originator_id: Uuid, version: i64) -> StoredEvent {
    StoredEvent {
        originator_id,
        originator_version: version,
        topic: "test.happened".to_string(),
        state: serde_json::json!({"key": "value"}),
        timestamp: Utc::now(),
    }
}

fn batch(originator_id: Uuid, versions: std::ops::RangeInclusive<i64>) -> Vec<StoredEvent> {
    versions
        .map(|v| make_stored_event(originator_id, v))
        .collect()
}

// --- select_events ---

#[sqlx::test]
async fn test_select_events_returns_empty_vec_for_nonexistent_aggregate(pool: PgPool) {
    let recorder = recorder(pool).await;

    let events = recorder
        .select_events(Uuid::new_v4(), EventSelection::default())
        .await
        .unwrap();

    assert!(events.is_empty());
}

#[sqlx::test]
async fn test_insert_and_select_single_event(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    let event = make_stored_event(originator_id, 1);
    let expected = event.clone();

    let ids = recorder
        .insert_events(originator_id, 0, &[event])
        .await
        .unwrap();

    let loaded = recorder
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    assert_eq!(ids, vec![1]);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].originator_id, expected.originator_id);
    assert_eq!(loaded[0].originator_version, 1);
    assert_eq!(loaded[0].topic, expected.topic);
    assert_eq!(loaded[0].state, expected.state);
    // PostgreSQL TIMESTAMPTZ has microsecond precision.
    assert_eq!(
        loaded[0].timestamp.timestamp_micros(),
        expected.timestamp.timestamp_micros()
    );
}

#[sqlx::test]
async fn test_select_events_preserves_version_order(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();

    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=3))
        .await
        .unwrap();

    let loaded = recorder
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    let versions: Vec<_> = loaded.iter().map(|e| e.originator_version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[sqlx::test]
async fn test_select_events_honours_selection_window(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=6))
        .await
        .unwrap();

    let window = recorder
        .select_events(
            originator_id,
            EventSelection::from_version(2).up_to(Some(5)).limit(3),
        )
        .await
        .unwrap();

    let versions: Vec<_> = window.iter().map(|e| e.originator_version).collect();
    assert_eq!(versions, vec![2, 3, 4]);
}

#[sqlx::test]
async fn test_aggregate_isolation(pool: PgPool) {
    let recorder = recorder(pool).await;
    let agg_a = Uuid::new_v4();
    let agg_b = Uuid::new_v4();

    recorder
        .insert_events(agg_a, 0, &[make_stored_event(agg_a, 1)])
        .await
        .unwrap();
    recorder
        .insert_events(agg_b, 0, &[make_stored_event(agg_b, 1)])
        .await
        .unwrap();

    let loaded_a = recorder
        .select_events(agg_a, EventSelection::default())
        .await
        .unwrap();
    let loaded_b = recorder
        .select_events(agg_b, EventSelection::default())
        .await
        .unwrap();
    assert_eq!(loaded_a.len(), 1);
    assert_eq!(loaded_b.len(), 1);
    assert_eq!(loaded_a[0].originator_id, agg_a);
    assert_eq!(loaded_b[0].originator_id, agg_b);
}

// --- concurrency ---

#[sqlx::test]
async fn test_concurrency_conflict_on_duplicate_version(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();

    recorder
        .insert_events(originator_id, 0, &[make_stored_event(originator_id, 1)])
        .await
        .unwrap();
    let result = recorder
        .insert_events(originator_id, 0, &[make_stored_event(originator_id, 1)])
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, originator_id);
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[sqlx::test]
async fn test_stale_expected_version_with_non_overlapping_versions(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=2))
        .await
        .unwrap();

    // Versions 1..=2 claim to follow 0, but the stream is already at 2.
    let result = recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=2))
        .await;

    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 0,
            actual: 2,
            ..
        })
    ));
    let loaded = recorder
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    assert_eq!(loaded.len(), 2);
}

#[sqlx::test]
async fn test_failed_batch_writes_nothing(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=1))
        .await
        .unwrap();

    let result = recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=3))
        .await;

    assert!(result.is_err());
    assert_eq!(recorder.max_notification_id().await.unwrap(), 1);
}

#[sqlx::test]
async fn test_sequential_inserts_with_correct_expected_version(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();

    let first = recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=2))
        .await
        .unwrap();
    let second = recorder
        .insert_events(originator_id, 2, &batch(originator_id, 3..=4))
        .await
        .unwrap();

    assert_eq!(first, vec![1, 2]);
    assert_eq!(second, vec![3, 4]);
    let loaded = recorder
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    for (i, event) in loaded.iter().enumerate() {
        assert_eq!(event.originator_version, i64::try_from(i + 1).unwrap());
    }
}

#[sqlx::test]
async fn test_concurrent_inserts_exactly_one_wins(pool: PgPool) {
    let recorder = Arc::new(recorder(pool).await);
    let originator_id = Uuid::new_v4();
    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=3))
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                recorder
                    .insert_events(originator_id, 3, &[make_stored_event(originator_id, 4)])
                    .await
            })
        })
        .collect();
    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(err) if err.is_conflict() => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(recorder.max_notification_id().await.unwrap(), 4);
}

// --- edge cases ---

#[sqlx::test]
async fn test_insert_empty_events_is_noop(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();

    let ids = recorder.insert_events(originator_id, 0, &[]).await.unwrap();

    assert!(ids.is_empty());
    assert_eq!(recorder.max_notification_id().await.unwrap(), 0);
}

#[sqlx::test]
async fn test_malformed_batch_is_rejected(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();

    let result = recorder
        .insert_events(
            originator_id,
            0,
            &[
                make_stored_event(originator_id, 1),
                make_stored_event(originator_id, 3),
            ],
        )
        .await;

    assert!(matches!(result, Err(DomainError::Validation(_))));
}

#[sqlx::test]
async fn test_complex_json_payload_round_trip(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    let complex_state = serde_json::json!({
        "nested": {"key": "value", "number": 42},
        "array": [1, "two", null, true, false],
        "null_field": null,
        "empty_object": {},
        "empty_array": []
    });
    let mut event = make_stored_event(originator_id, 1);
    event.state = complex_state.clone();

    recorder
        .insert_events(originator_id, 0, &[event])
        .await
        .unwrap();

    let loaded = recorder
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    assert_eq!(loaded[0].state, complex_state);
}

// --- notifications ---

#[sqlx::test]
async fn test_notifications_are_gap_free_across_aggregates(pool: PgPool) {
    let recorder = recorder(pool).await;
    let agg_a = Uuid::new_v4();
    let agg_b = Uuid::new_v4();

    recorder
        .insert_events(agg_a, 0, &batch(agg_a, 1..=2))
        .await
        .unwrap();
    recorder
        .insert_events(agg_b, 0, &batch(agg_b, 1..=1))
        .await
        .unwrap();
    recorder
        .insert_events(agg_a, 2, &batch(agg_a, 3..=3))
        .await
        .unwrap();

    let notifications = recorder
        .select_notifications(1, 10, None, &[])
        .await
        .unwrap();
    let ids: Vec<_> = notifications.iter().map(|n| n.id).collect();
    let origin: Vec<_> = notifications
        .iter()
        .map(|n| (n.originator_id, n.originator_version))
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(origin, vec![(agg_a, 1), (agg_a, 2), (agg_b, 1), (agg_a, 3)]);
    assert_eq!(recorder.max_notification_id().await.unwrap(), 4);
}

#[sqlx::test]
async fn test_concurrent_writers_get_contiguous_ids_in_commit_order(pool: PgPool) {
    // Arrange
    let recorder = Arc::new(recorder(pool).await);
    let aggregates: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

    // Act
    let handles: Vec<_> = aggregates
        .iter()
        .map(|&originator_id| {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                let ids = recorder
                    .insert_events(originator_id, 0, &batch(originator_id, 1..=3))
                    .await
                    .unwrap();
                (originator_id, ids)
            })
        })
        .collect();
    let mut committed = Vec::new();
    for handle in handles {
        committed.push(handle.await.unwrap());
    }

    // Assert
    for (_, ids) in &committed {
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }
    let notifications = recorder
        .select_notifications(1, 100, None, &[])
        .await
        .unwrap();
    let ids: Vec<i64> = notifications.iter().map(|n| n.id).collect();
    assert_eq!(ids, (1..=24).collect::<Vec<_>>());
    for (originator_id, batch_ids) in &committed {
        for (version, id) in (1_i64..).zip(batch_ids) {
            let notification = &notifications[usize::try_from(id - 1).unwrap()];
            assert_eq!(notification.originator_id, *originator_id);
            assert_eq!(notification.originator_version, version);
        }
    }
    assert_eq!(recorder.max_notification_id().await.unwrap(), 24);
}

#[sqlx::test]
async fn test_write_past_deadline_is_ambiguous(pool: PgPool) {
    // Arrange
    let patient = recorder(pool.clone()).await;
    let hasty = PgRecorder::new(pool.clone())
        .with_operation_timeout(Duration::from_millis(50))
        .with_lock_timeout(Duration::from_secs(5));
    let originator_id = Uuid::new_v4();
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query("LOCK TABLE stored_events IN EXCLUSIVE MODE")
        .execute(&mut *blocker)
        .await
        .unwrap();

    // Act
    let result = hasty
        .insert_events(originator_id, 0, &batch(originator_id, 1..=1))
        .await;
    blocker.rollback().await.unwrap();

    // Assert: only a fresh read settles what happened.
    assert!(matches!(result, Err(DomainError::Ambiguous(_))));
    let stored = patient
        .select_events(originator_id, EventSelection::default())
        .await
        .unwrap();
    assert!(stored.is_empty());
    let ids = patient
        .insert_events(originator_id, 0, &batch(originator_id, 1..=1))
        .await
        .unwrap();
    assert_eq!(ids, vec![1]);
}

#[sqlx::test]
async fn test_select_notifications_filters_by_topic_and_stop(pool: PgPool) {
    let recorder = recorder(pool).await;
    for topic in ["units.created", "tenants.created", "units.created"] {
        let id = Uuid::new_v4();
        let mut event = make_stored_event(id, 1);
        event.topic = topic.to_owned();
        recorder.insert_events(id, 0, &[event]).await.unwrap();
    }

    let units = recorder
        .select_notifications(1, 10, None, &["units.created".to_owned()])
        .await
        .unwrap();
    let bounded = recorder
        .select_notifications(1, 10, Some(2), &[])
        .await
        .unwrap();

    assert_eq!(units.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(bounded.len(), 2);
}

#[sqlx::test]
async fn test_notification_log_sections_over_postgres(pool: PgPool) {
    let recorder = Arc::new(recorder(pool).await);
    let originator_id = Uuid::new_v4();
    recorder
        .insert_events(originator_id, 0, &batch(originator_id, 1..=3))
        .await
        .unwrap();
    let log = NotificationLog::new(recorder);

    let section = log.select(1, 10, &[]).await.unwrap();

    assert_eq!(section.id.as_deref(), Some("1,3"));
    assert_eq!(section.items.len(), 3);
    assert!(section.items.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(section.next_id, None);
}

// --- snapshots ---

#[sqlx::test]
async fn test_snapshot_round_trip_picks_latest_at_or_below(pool: PgPool) {
    let recorder = recorder(pool).await;
    let originator_id = Uuid::new_v4();
    for version in [2, 5] {
        recorder
            .insert_snapshot(&Snapshot {
                originator_id,
                originator_version: version,
                topic: "Counter".to_owned(),
                state: serde_json::json!({"version": version}),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }

    let latest = recorder.select_snapshot(originator_id, None).await.unwrap();
    let bounded = recorder
        .select_snapshot(originator_id, Some(4))
        .await
        .unwrap();
    let none = recorder
        .select_snapshot(originator_id, Some(1))
        .await
        .unwrap();

    assert_eq!(latest.map(|s| s.originator_version), Some(5));
    assert_eq!(bounded.map(|s| s.originator_version), Some(2));
    assert!(none.is_none());
}

#[sqlx::test]
async fn test_snapshot_write_is_idempotent(pool: PgPool) {
    let recorder = recorder(pool).await;
    let snapshot = Snapshot {
        originator_id: Uuid::new_v4(),
        originator_version: 1,
        topic: "Counter".to_owned(),
        state: serde_json::json!({"n": 1}),
        timestamp: Utc::now(),
    };

    recorder.insert_snapshot(&snapshot).await.unwrap();
    recorder.insert_snapshot(&snapshot).await.unwrap();

    let loaded = recorder
        .select_snapshot(snapshot.originator_id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.state, snapshot.state);
}

// --- tracking ---

#[sqlx::test]
async fn test_tracking_position_never_moves_backwards(pool: PgPool) {
    let recorder = recorder(pool).await;

    let initial = recorder.max_tracking_id("directory").await.unwrap();
    recorder.insert_tracking("directory", 7).await.unwrap();
    recorder.insert_tracking("directory", 3).await.unwrap();
    recorder.insert_tracking("other", 1).await.unwrap();

    assert_eq!(initial, 0);
    assert_eq!(recorder.max_tracking_id("directory").await.unwrap(), 7);
    assert_eq!(recorder.max_tracking_id("other").await.unwrap(), 1);
}

#[sqlx::test]
async fn test_provision_is_repeatable(pool: PgPool) {
    let recorder = recorder(pool).await;

    recorder.provision().await.unwrap();

    assert_eq!(recorder.max_notification_id().await.unwrap(), 0);
}
