//! `PostgreSQL` implementation of the `Recorder` and `TrackingRecorder`
//! traits.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use leasehold_core::error::DomainError;
use leasehold_core::recorder::{
    EventSelection, Notification, Recorder, StoredEvent, TrackingRecorder, validate_batch,
};
use leasehold_core::snapshot::Snapshot;

use crate::config::PostgresSettings;
use crate::schema;

const READ_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, FromRow)]
struct EventRow {
    originator_id: Uuid,
    originator_version: i64,
    topic: String,
    state: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            originator_id: row.originator_id,
            originator_version: row.originator_version,
            topic: row.topic,
            state: row.state,
            timestamp: row.created_at,
        }
    }
}

impl From<EventRow> for Snapshot {
    fn from(row: EventRow) -> Self {
        Self {
            originator_id: row.originator_id,
            originator_version: row.originator_version,
            topic: row.topic,
            state: row.state,
            timestamp: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    notification_id: i64,
    originator_id: Uuid,
    originator_version: i64,
    topic: String,
    state: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.notification_id,
            originator_id: row.originator_id,
            originator_version: row.originator_version,
            topic: row.topic,
            state: row.state,
            timestamp: row.created_at,
        }
    }
}

/// PostgreSQL-backed recorder.
///
/// Writers take an `EXCLUSIVE` lock on `stored_events` for the length of
/// their transaction. Readers are not blocked, writers to the table are, so
/// notification ids are assigned one transaction at a time, in commit order,
/// without gaps.
#[derive(Debug, Clone)]
pub struct PgRecorder {
    pool: PgPool,
    operation_timeout: Duration,
    lock_timeout: Duration,
    read_retries: u32,
}

impl PgRecorder {
    /// Creates a new `PgRecorder` over an existing pool with default
    /// timeouts.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            operation_timeout: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(2),
            read_retries: 2,
        }
    }

    /// Sets the deadline applied to every recorder call.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets how long a writer waits for the table lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets how many times a transiently failing read is retried.
    #[must_use]
    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// Opens a pool from `settings` and, when `create_table` is set,
    /// provisions the tables.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error if the pool cannot connect or the DDL fails.
    pub async fn connect(settings: &PostgresSettings) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.pool_size)
            .acquire_timeout(settings.connect_timeout)
            .connect_with(settings.connect_options())
            .await?;
        info!(
            host = %settings.host(),
            port = settings.port(),
            dbname = %settings.dbname(),
            pool_size = settings.pool_size,
            "connected to PostgreSQL"
        );
        let recorder = Self::new(pool)
            .with_operation_timeout(settings.operation_timeout)
            .with_lock_timeout(settings.lock_timeout)
            .with_read_retries(settings.read_retries);
        if settings.create_table {
            recorder.provision().await?;
        }
        Ok(recorder)
    }

    /// Creates the tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns the sqlx error if the DDL fails.
    pub async fn provision(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(schema::CREATE_TABLES)
            .execute(&self.pool)
            .await?;
        info!("event store tables provisioned");
        Ok(())
    }

    /// The connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }

    /// Runs an idempotent read under the deadline, retrying transient
    /// failures.
    async fn read<T, F, Fut>(&self, operation: &'static str, mut run: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.operation_timeout, run()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if is_transient(&err) => err.to_string(),
                Ok(Err(err)) => return Err(infrastructure(operation, &err)),
                Err(_) => format!("timed out after {:?}", self.operation_timeout),
            };
            if attempt >= self.read_retries {
                return Err(DomainError::Infrastructure(format!("{operation}: {error}")));
            }
            attempt += 1;
            warn!(operation, attempt, %error, "retrying read");
            tokio::time::sleep(READ_BACKOFF * attempt).await;
        }
    }

    async fn insert_events_tx(
        &self,
        originator_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<Vec<i64>, DomainError> {
        // Dropping `tx` on any early return rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| infrastructure("begin", &e))?;

        let lock_timeout = format!("{}ms", self.lock_timeout.as_millis());
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(lock_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure("set lock_timeout", &e))?;
        sqlx::query("LOCK TABLE stored_events IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure("lock stored_events", &e))?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(originator_version), 0) FROM stored_events WHERE originator_id = $1",
        )
        .bind(originator_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| infrastructure("read current version", &e))?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: originator_id,
                expected: expected_version,
                actual,
            });
        }

        let last_id: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(notification_id), 0) FROM stored_events")
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| infrastructure("read notification horizon", &e))?;

        let mut ids = Vec::with_capacity(events.len());
        for (offset, event) in (1_i64..).zip(events) {
            let notification_id = last_id + offset;
            sqlx::query(
                "INSERT INTO stored_events \
                 (originator_id, originator_version, topic, state, created_at, notification_id) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(event.originator_id)
            .bind(event.originator_version)
            .bind(&event.topic)
            .bind(&event.state)
            .bind(event.timestamp)
            .bind(notification_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_insert(originator_id, expected_version, &e))?;
            ids.push(notification_id);
        }

        tx.commit().await.map_err(|e| classify_commit(&e))?;
        Ok(ids)
    }
}

#[async_trait]
impl Recorder for PgRecorder {
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

        let ids = tokio::time::timeout(
            self.operation_timeout,
            self.insert_events_tx(originator_id, expected_version, events),
        )
        .await
        .map_err(|_| {
            DomainError::Ambiguous(format!(
                "insert for aggregate {originator_id} did not finish within {:?}",
                self.operation_timeout
            ))
        })??;

        debug!(
            %originator_id,
            expected_version,
            first_notification_id = ids.first(),
            count = ids.len(),
            "committed events"
        );
        Ok(ids)
    }

    async fn select_events(
        &self,
        originator_id: Uuid,
        selection: EventSelection,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = self
            .read("select events", || {
                sqlx::query_as(
                    "SELECT originator_id, originator_version, topic, state, created_at \
                     FROM stored_events \
                     WHERE originator_id = $1 \
                       AND originator_version >= $2 \
                       AND ($3::BIGINT IS NULL OR originator_version <= $3) \
                     ORDER BY originator_version ASC \
                     LIMIT $4",
                )
                .bind(originator_id)
                .bind(selection.from_version)
                .bind(selection.to_version)
                .bind(selection.limit)
                .fetch_all(&self.pool)
            })
            .await?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), DomainError> {
        let write = sqlx::query(
            "INSERT INTO snapshots (originator_id, originator_version, topic, state, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (originator_id, originator_version) \
             DO UPDATE SET topic = EXCLUDED.topic, state = EXCLUDED.state, created_at = EXCLUDED.created_at",
        )
        .bind(snapshot.originator_id)
        .bind(snapshot.originator_version)
        .bind(&snapshot.topic)
        .bind(&snapshot.state)
        .bind(snapshot.timestamp)
        .execute(&self.pool);

        match tokio::time::timeout(self.operation_timeout, write).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(infrastructure("insert snapshot", &err)),
            Err(_) => Err(DomainError::Ambiguous(format!(
                "snapshot for {} did not finish within {:?}",
                snapshot.originator_id, self.operation_timeout
            ))),
        }
    }

    async fn select_snapshot(
        &self,
        originator_id: Uuid,
        max_version: Option<i64>,
    ) -> Result<Option<Snapshot>, DomainError> {
        let row: Option<EventRow> = self
            .read("select snapshot", || {
                sqlx::query_as(
                    "SELECT originator_id, originator_version, topic, state, created_at \
                     FROM snapshots \
                     WHERE originator_id = $1 \
                       AND ($2::BIGINT IS NULL OR originator_version <= $2) \
                     ORDER BY originator_version DESC \
                     LIMIT 1",
                )
                .bind(originator_id)
                .bind(max_version)
                .fetch_optional(&self.pool)
            })
            .await?;
        Ok(row.map(Snapshot::from))
    }

    async fn select_notifications(
        &self,
        start: i64,
        limit: i64,
        stop: Option<i64>,
        topics: &[String],
    ) -> Result<Vec<Notification>, DomainError> {
        let topics = topics.to_vec();
        let rows: Vec<NotificationRow> = self
            .read("select notifications", || {
                sqlx::query_as(
                    "SELECT notification_id, originator_id, originator_version, topic, state, created_at \
                     FROM stored_events \
                     WHERE notification_id >= $1 \
                       AND ($2::BIGINT IS NULL OR notification_id <= $2) \
                       AND (cardinality($3::TEXT[]) = 0 OR topic = ANY($3)) \
                     ORDER BY notification_id ASC \
                     LIMIT $4",
                )
                .bind(start)
                .bind(stop)
                .bind(topics.clone())
                .bind(limit)
                .fetch_all(&self.pool)
            })
            .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn max_notification_id(&self) -> Result<i64, DomainError> {
        self.read("max notification id", || {
            sqlx::query_scalar("SELECT COALESCE(MAX(notification_id), 0) FROM stored_events")
                .fetch_one(&self.pool)
        })
        .await
    }
}

#[async_trait]
impl TrackingRecorder for PgRecorder {
    async fn max_tracking_id(&self, projection: &str) -> Result<i64, DomainError> {
        self.read("max tracking id", || {
            sqlx::query_scalar(
                "SELECT COALESCE(MAX(notification_id), 0) FROM projection_tracking \
                 WHERE projection_name = $1",
            )
            .bind(projection)
            .fetch_one(&self.pool)
        })
        .await
    }

    async fn insert_tracking(
        &self,
        projection: &str,
        notification_id: i64,
    ) -> Result<(), DomainError> {
        let write = sqlx::query(
            "INSERT INTO projection_tracking (projection_name, notification_id) VALUES ($1, $2) \
             ON CONFLICT (projection_name) DO UPDATE \
             SET notification_id = GREATEST(projection_tracking.notification_id, EXCLUDED.notification_id)",
        )
        .bind(projection)
        .bind(notification_id)
        .execute(&self.pool);

        match tokio::time::timeout(self.operation_timeout, write).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(infrastructure("insert tracking", &err)),
            Err(_) => Err(DomainError::Ambiguous(format!(
                "tracking {projection} at {notification_id} did not finish within {:?}",
                self.operation_timeout
            ))),
        }
    }
}

fn infrastructure(operation: &str, error: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("{operation}: {error}"))
}

/// Errors worth retrying for an idempotent read.
fn is_transient(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Protocol(_)
    )
}

/// A unique violation on insert means another writer took the version.
fn classify_insert(originator_id: Uuid, expected_version: i64, error: &sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_error) = error {
        if db_error.is_unique_violation() {
            return DomainError::ConcurrencyConflict {
                aggregate_id: originator_id,
                expected: expected_version,
                actual: expected_version + 1,
            };
        }
    }
    infrastructure("insert events", error)
}

/// Losing the connection while committing leaves the outcome unknown.
fn classify_commit(error: &sqlx::Error) -> DomainError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::PoolClosed => DomainError::Ambiguous(format!("commit: {error}")),
        other => infrastructure("commit", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_io_error_is_ambiguous() {
        let error = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));

        assert!(matches!(classify_commit(&error), DomainError::Ambiguous(_)));
    }

    #[test]
    fn test_commit_other_error_is_infrastructure() {
        let error = sqlx::Error::RowNotFound;

        assert!(matches!(
            classify_commit(&error),
            DomainError::Infrastructure(_)
        ));
    }

    #[test]
    fn test_non_unique_insert_error_is_infrastructure() {
        let error = sqlx::Error::PoolTimedOut;

        assert!(matches!(
            classify_insert(Uuid::new_v4(), 0, &error),
            DomainError::Infrastructure(_)
        ));
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }
}
