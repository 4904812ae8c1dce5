//! Aggregate repository: rebuilds aggregates from history and saves their
//! pending events under optimistic concurrency.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::recorder::EventSelection;
use crate::snapshot::{Snapshot, SnapshotPolicy};
use crate::store::EventStore;

/// Repository for one aggregate type.
pub struct Repository<A: AggregateRoot> {
    store: EventStore<A::Event>,
    use_snapshots: bool,
}

impl<A: AggregateRoot> Clone for Repository<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            use_snapshots: self.use_snapshots,
        }
    }
}

impl<A: AggregateRoot> std::fmt::Debug for Repository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("aggregate", &A::TYPE_NAME)
            .field("use_snapshots", &self.use_snapshots)
            .finish_non_exhaustive()
    }
}

impl<A> Repository<A>
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    /// Creates a repository that always replays from version 1.
    #[must_use]
    pub fn new(store: EventStore<A::Event>) -> Self {
        Self {
            store,
            use_snapshots: false,
        }
    }

    /// Starts replay from the newest snapshot when one exists.
    #[must_use]
    pub fn with_snapshots(mut self) -> Self {
        self.use_snapshots = true;
        self
    }

    /// The underlying event store.
    #[must_use]
    pub fn event_store(&self) -> &EventStore<A::Event> {
        &self.store
    }

    /// Loads the current state of an aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no events exist for `id`.
    pub async fn get(&self, id: Uuid) -> Result<A, DomainError> {
        self.get_at(id, None).await
    }

    /// Loads an aggregate as it was at `version`, or its current state when
    /// `version` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if no events of this
    /// aggregate type exist for `id`, `DomainError::UnknownEventType` for an
    /// unregistered topic later in the stream, and
    /// `DomainError::Infrastructure` if the stored history has a gap.
    pub async fn get_at(&self, id: Uuid, version: Option<i64>) -> Result<A, DomainError> {
        let mut aggregate = match self.load_snapshot(id, version).await? {
            Some(aggregate) => aggregate,
            None => A::blank(id),
        };

        let selection = EventSelection::from_version(aggregate.version() + 1).up_to(version);
        let stored = self.store.recorder().select_events(id, selection).await?;
        // A stream that opens with a foreign topic is another aggregate type.
        let foreign = stored.first().is_some_and(|first| {
            first.originator_version == 1 && !self.store.registry().contains(&first.topic)
        });
        if foreign {
            debug!(aggregate = A::TYPE_NAME, %id, "id belongs to another aggregate type");
            return Err(DomainError::AggregateNotFound(id));
        }
        let events = self.store.decode_all(stored)?;
        replay(&mut aggregate, &events)?;

        if aggregate.version() == 0 {
            return Err(DomainError::AggregateNotFound(id));
        }
        debug!(
            aggregate = A::TYPE_NAME,
            %id,
            version = aggregate.version(),
            replayed = events.len(),
            "reconstituted aggregate"
        );
        Ok(aggregate)
    }

    /// Returns `true` if an aggregate of this type exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns any recorder error.
    pub async fn contains(&self, id: Uuid) -> Result<bool, DomainError> {
        let first = self
            .store
            .recorder()
            .select_events(id, EventSelection::default().limit(1))
            .await?;
        Ok(first
            .first()
            .is_some_and(|event| self.store.registry().contains(&event.topic)))
    }

    /// Persists the aggregate's pending events, returning their notification
    /// ids.
    ///
    /// On success the pending list is cleared. On any error, including
    /// `ConcurrencyConflict`, the pending events stay on the aggregate; the
    /// caller decides whether to reload and retry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another writer committed
    /// first, or `DomainError::Ambiguous` if the outcome is unknown.
    pub async fn save(&self, aggregate: &mut A) -> Result<Vec<i64>, DomainError> {
        let pending = aggregate.uncommitted_events();
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let pending_len = i64::try_from(pending.len())
            .map_err(|_| DomainError::Validation("too many pending events".into()))?;
        let expected_version = aggregate.version() - pending_len;

        let result = self
            .store
            .put(aggregate.aggregate_id(), expected_version, pending)
            .await;
        match result {
            Ok(notification_ids) => {
                aggregate.clear_uncommitted_events();
                debug!(
                    aggregate = A::TYPE_NAME,
                    id = %aggregate.aggregate_id(),
                    version = aggregate.version(),
                    "saved aggregate"
                );
                Ok(notification_ids)
            }
            Err(err) => {
                if err.is_conflict() {
                    warn!(
                        aggregate = A::TYPE_NAME,
                        id = %aggregate.aggregate_id(),
                        expected_version,
                        "save rejected by concurrency check"
                    );
                }
                Err(err)
            }
        }
    }

    /// Reconstitutes the aggregate (at `version`, or current) and stores a
    /// snapshot of it.
    ///
    /// # Errors
    ///
    /// Returns any load or recorder error. Callers treat snapshot failures
    /// as non-fatal.
    pub async fn take_snapshot(
        &self,
        id: Uuid,
        version: Option<i64>,
    ) -> Result<Snapshot, DomainError> {
        let aggregate = self.get_at(id, version).await?;
        let state = serde_json::to_value(&aggregate).map_err(|e| {
            DomainError::Infrastructure(format!("failed to encode {} snapshot: {e}", A::TYPE_NAME))
        })?;
        let last = self
            .store
            .recorder()
            .select_events(
                id,
                EventSelection::from_version(aggregate.version()).up_to(Some(aggregate.version())),
            )
            .await?;
        let snapshot = Snapshot {
            originator_id: id,
            originator_version: aggregate.version(),
            topic: A::TYPE_NAME.to_owned(),
            state,
            timestamp: last.first().map_or_else(Utc::now, |e| e.timestamp),
        };
        self.store.recorder().insert_snapshot(&snapshot).await?;
        debug!(
            aggregate = A::TYPE_NAME,
            %id,
            version = snapshot.originator_version,
            "took snapshot"
        );
        Ok(snapshot)
    }

    /// Takes a snapshot if a save moved the aggregate from `before` across
    /// one of the policy's boundaries. Failures are logged and swallowed.
    pub async fn snapshot_if_due(&self, policy: SnapshotPolicy, aggregate: &A, before: i64) {
        if !policy.is_due(before, aggregate.version()) {
            return;
        }
        let id = aggregate.aggregate_id();
        if let Err(err) = self.take_snapshot(id, Some(aggregate.version())).await {
            warn!(
                aggregate = A::TYPE_NAME,
                %id,
                error = %err,
                "snapshot failed; continuing without it"
            );
        }
    }

    async fn load_snapshot(
        &self,
        id: Uuid,
        version: Option<i64>,
    ) -> Result<Option<A>, DomainError> {
        if !self.use_snapshots {
            return Ok(None);
        }
        let Some(snapshot) = self.store.recorder().select_snapshot(id, version).await? else {
            return Ok(None);
        };
        if snapshot.topic != A::TYPE_NAME {
            warn!(%id, topic = %snapshot.topic, "ignoring snapshot of another aggregate type");
            return Ok(None);
        }
        match serde_json::from_value::<A>(snapshot.state) {
            Ok(aggregate) if aggregate.version() == snapshot.originator_version => {
                Ok(Some(aggregate))
            }
            Ok(_) => {
                warn!(%id, "ignoring snapshot whose state disagrees with its version");
                Ok(None)
            }
            Err(err) => {
                warn!(%id, error = %err, "ignoring undecodable snapshot");
                Ok(None)
            }
        }
    }
}

/// Applies `events` in order, requiring each to follow the current version.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` on a version gap or duplicate.
pub fn replay<A: AggregateRoot>(aggregate: &mut A, events: &[A::Event]) -> Result<(), DomainError> {
    for event in events {
        let metadata = event.metadata();
        if metadata.originator_version != aggregate.version() + 1 {
            return Err(DomainError::Infrastructure(format!(
                "aggregate {} history out of sequence: version {} after {}",
                aggregate.aggregate_id(),
                metadata.originator_version,
                aggregate.version()
            )));
        }
        aggregate.apply(event);
    }
    Ok(())
}
