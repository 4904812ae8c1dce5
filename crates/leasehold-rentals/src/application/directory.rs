//! Rental directory: an in-memory read model of every unit, tenant and
//! lease, folded from the notification log.
//!
//! The directory keeps its own read position next to its state, so a fresh
//! process rebuilds it from notification 1. Re-delivered or out-of-order
//! events are skipped: an event is applied only when its version is exactly
//! one past the copy already held for that aggregate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use leasehold_core::aggregate::AggregateRoot;
use leasehold_core::error::DomainError;
use leasehold_core::event::DomainEvent;
use leasehold_core::notification::NotificationLog;
use leasehold_core::projection::{Projection, ProjectionRunner};
use leasehold_core::recorder::{Notification, TrackingRecorder};
use leasehold_core::store::TopicRegistry;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::{Lease, Tenant, Unit};
use crate::domain::events::{
    LeaseEvent, TenantEvent, UnitEvent, lease_topics, tenant_topics, unit_topics,
};

/// Name under which the directory's position is tracked.
pub const DIRECTORY_NAME: &str = "rental_directory";

#[derive(Debug, Default)]
struct DirectoryState {
    units: HashMap<Uuid, Unit>,
    tenants: HashMap<Uuid, Tenant>,
    leases: HashMap<Uuid, Lease>,
    position: i64,
}

/// Read model answering the rental list queries.
#[derive(Debug)]
pub struct RentalDirectory {
    state: RwLock<DirectoryState>,
    units: TopicRegistry<UnitEvent>,
    tenants: TopicRegistry<TenantEvent>,
    leases: TopicRegistry<LeaseEvent>,
}

impl Default for RentalDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RentalDirectory {
    /// Creates an empty directory at position 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            units: unit_topics(),
            tenants: tenant_topics(),
            leases: lease_topics(),
        }
    }

    /// Builds a runner that feeds a new directory from `log`.
    #[must_use]
    pub fn runner(log: NotificationLog) -> ProjectionRunner<Self> {
        let directory = Arc::new(Self::new());
        let tracking: Arc<dyn TrackingRecorder> = directory.clone();
        ProjectionRunner::new(log, tracking, directory)
    }

    /// Last notification id folded into the directory.
    pub async fn position(&self) -> i64 {
        self.state.read().await.position
    }

    /// Every unit, oldest first.
    pub async fn units(&self) -> Vec<Unit> {
        let state = self.state.read().await;
        let mut units: Vec<Unit> = state.units.values().cloned().collect();
        units.sort_by_key(|u| (u.created_at, u.id));
        units
    }

    /// Units that are leasable and not currently leased.
    pub async fn available_units(&self) -> Vec<Unit> {
        let mut units = self.units().await;
        units.retain(Unit::is_available);
        units
    }

    /// Every tenant, oldest first.
    pub async fn tenants(&self) -> Vec<Tenant> {
        let state = self.state.read().await;
        let mut tenants: Vec<Tenant> = state.tenants.values().cloned().collect();
        tenants.sort_by_key(|t| (t.created_at, t.id));
        tenants
    }

    /// The tenant registered under `identification_number`, if any.
    pub async fn tenant_by_identification_number(
        &self,
        identification_number: &str,
    ) -> Option<Tenant> {
        let wanted = identification_number.trim();
        self.state
            .read()
            .await
            .tenants
            .values()
            .find(|t| t.identification_number == wanted)
            .cloned()
    }

    /// Tenants who passed screening.
    pub async fn approved_tenants(&self) -> Vec<Tenant> {
        let mut tenants = self.tenants().await;
        tenants.retain(|t| t.is_approved);
        tenants
    }

    /// Every lease, oldest first.
    pub async fn leases(&self) -> Vec<Lease> {
        let state = self.state.read().await;
        let mut leases: Vec<Lease> = state.leases.values().cloned().collect();
        leases.sort_by_key(|l| (l.generated_at, l.id));
        leases
    }

    /// Leases for one unit.
    pub async fn leases_by_unit(&self, unit_id: Uuid) -> Vec<Lease> {
        let mut leases = self.leases().await;
        leases.retain(|l| l.unit_id == unit_id);
        leases
    }

    /// Leases naming one tenant.
    pub async fn leases_by_tenant(&self, tenant_id: Uuid) -> Vec<Lease> {
        let mut leases = self.leases().await;
        leases.retain(|l| l.tenant_ids.contains(&tenant_id));
        leases
    }

    /// Leases that are signed and cover `today`.
    pub async fn active_leases(&self, today: NaiveDate) -> Vec<Lease> {
        let mut leases = self.leases().await;
        leases.retain(|l| l.is_active(today));
        leases
    }
}

/// Applies `event` if it directly follows the held copy of its aggregate.
fn fold<A: AggregateRoot>(aggregates: &mut HashMap<Uuid, A>, event: &A::Event) -> bool {
    let metadata = event.metadata();
    let id = metadata.originator_id;
    let current = aggregates.get(&id).map_or(0, |a| a.version());
    if metadata.originator_version != current + 1 {
        return false;
    }
    aggregates.entry(id).or_insert_with(|| A::blank(id)).apply(event);
    true
}

#[async_trait]
impl Projection for RentalDirectory {
    fn name(&self) -> &str {
        DIRECTORY_NAME
    }

    fn topics(&self) -> Vec<String> {
        self.units
            .topics()
            .into_iter()
            .chain(self.tenants.topics())
            .chain(self.leases.topics())
            .map(str::to_owned)
            .collect()
    }

    async fn process(&self, notification: &Notification) -> Result<(), DomainError> {
        let stored = notification.to_stored_event();
        let mut state = self.state.write().await;
        let applied = if self.units.contains(&stored.topic) {
            let event = self.units.decode(stored)?;
            fold(&mut state.units, &event)
        } else if self.tenants.contains(&stored.topic) {
            let event = self.tenants.decode(stored)?;
            fold(&mut state.tenants, &event)
        } else if self.leases.contains(&stored.topic) {
            let event = self.leases.decode(stored)?;
            fold(&mut state.leases, &event)
        } else {
            return Err(DomainError::UnknownEventType(stored.topic));
        };
        if !applied {
            debug!(
                notification_id = notification.id,
                originator_id = %notification.originator_id,
                version = notification.originator_version,
                "skipped event already held or out of sequence"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl TrackingRecorder for RentalDirectory {
    async fn max_tracking_id(&self, projection: &str) -> Result<i64, DomainError> {
        if projection != DIRECTORY_NAME {
            return Ok(0);
        }
        Ok(self.position().await)
    }

    async fn insert_tracking(
        &self,
        projection: &str,
        notification_id: i64,
    ) -> Result<(), DomainError> {
        if projection == DIRECTORY_NAME {
            let mut state = self.state.write().await;
            state.position = state.position.max(notification_id);
        }
        Ok(())
    }
}
