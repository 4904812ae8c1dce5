//! Command handlers for the rental management context.
//!
//! Each handler loads the aggregates it needs, runs the domain method, and
//! saves the pending events. Concurrency conflicts are returned to the
//! caller, except where a handler updates a second aggregate on the first
//! one's behalf; that follow-up write reloads and retries.

use std::sync::Arc;

use leasehold_core::aggregate::AggregateRoot;
use leasehold_core::clock::Clock;
use leasehold_core::command::Command;
use leasehold_core::error::DomainError;
use leasehold_core::projection::ProjectionRunner;
use leasehold_core::recorder::Recorder;
use leasehold_core::repository::Repository;
use leasehold_core::snapshot::SnapshotPolicy;
use leasehold_core::store::EventStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::directory::RentalDirectory;
use crate::domain::aggregates::{Lease, Tenant, Unit};
use crate::domain::commands::{
    AddLeaseTenant, ChangeTenantApproval, ChangeUnitStatus, DraftLease, RegisterTenant,
    RegisterUnit, RemoveLeaseTenant, SignLease, UnitStatusChange, UpdateLeaseDates,
    UpdateTenantContactInfo, UpdateUnitAddress, UpdateUnitAmenities, UpdateUnitBuiltInYear,
};
use crate::domain::events::{lease_topics, tenant_topics, unit_topics};

/// How often a follow-up write on a second aggregate is retried after a
/// concurrency conflict.
const FOLLOW_UP_ATTEMPTS: usize = 3;

/// Result of a successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// The aggregate the command changed.
    pub id: Uuid,
    /// Its version after the command.
    pub version: i64,
    /// Notification ids assigned to the new events.
    pub notification_ids: Vec<i64>,
}

/// Repositories for the three rental aggregates, sharing one recorder.
#[derive(Debug, Clone)]
pub struct RentalRepositories {
    /// Unit repository.
    pub units: Repository<Unit>,
    /// Tenant repository.
    pub tenants: Repository<Tenant>,
    /// Lease repository.
    pub leases: Repository<Lease>,
    snapshot_policy: SnapshotPolicy,
}

impl RentalRepositories {
    /// Creates repositories over `recorder`. Loads start from snapshots
    /// whenever `snapshot_policy` takes them.
    #[must_use]
    pub fn new(recorder: Arc<dyn Recorder>, snapshot_policy: SnapshotPolicy) -> Self {
        let mut units = Repository::new(EventStore::new(Arc::clone(&recorder), unit_topics()));
        let mut tenants = Repository::new(EventStore::new(Arc::clone(&recorder), tenant_topics()));
        let mut leases = Repository::new(EventStore::new(recorder, lease_topics()));
        if snapshot_policy.interval().is_some() {
            units = units.with_snapshots();
            tenants = tenants.with_snapshots();
            leases = leases.with_snapshots();
        }
        Self {
            units,
            tenants,
            leases,
            snapshot_policy,
        }
    }

    /// The snapshot cadence applied after each save.
    #[must_use]
    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        self.snapshot_policy
    }

    async fn commit<A>(
        &self,
        repo: &Repository<A>,
        aggregate: &mut A,
    ) -> Result<CommandOutcome, DomainError>
    where
        A: AggregateRoot + Serialize + DeserializeOwned,
    {
        let pending = i64::try_from(aggregate.uncommitted_events().len())
            .map_err(|_| DomainError::Validation("too many pending events".into()))?;
        let before = aggregate.version() - pending;
        let notification_ids = repo.save(aggregate).await?;
        repo.snapshot_if_due(self.snapshot_policy, aggregate, before)
            .await;
        Ok(CommandOutcome {
            id: aggregate.aggregate_id(),
            version: aggregate.version(),
            notification_ids,
        })
    }
}

/// Loads an aggregate that a command refers to but does not target. A
/// missing reference is the caller's mistake, not a missing resource.
async fn referenced<A>(repo: &Repository<A>, id: Uuid, what: &str) -> Result<A, DomainError>
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    match repo.get(id).await {
        Err(DomainError::AggregateNotFound(_)) => Err(DomainError::Validation(format!(
            "{what} {id} does not exist"
        ))),
        other => other,
    }
}

fn require_approved(tenant: &Tenant) -> Result<(), DomainError> {
    if !tenant.is_approved {
        return Err(DomainError::Validation(format!(
            "tenant {} is not approved",
            tenant.id
        )));
    }
    Ok(())
}

fn log_command(command: &dyn Command) {
    info!(
        command = command.command_type(),
        aggregate_id = %command.aggregate_id(),
        correlation_id = %command.correlation_id(),
        "handling command"
    );
}

// --- units ---

/// Handles the `RegisterUnit` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for invalid unit details and
/// `DomainError::ConcurrencyConflict` if the id is already taken.
pub async fn handle_register_unit(
    command: &RegisterUnit,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut unit = Unit::register(
        command.unit_id,
        command.address.clone(),
        command.amenities.clone(),
        command.built_in,
        clock,
    )?;
    repos.commit(&repos.units, &mut unit).await
}

/// Handles the `UpdateUnitAmenities` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the unit does not exist.
pub async fn handle_update_unit_amenities(
    command: &UpdateUnitAmenities,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut unit = repos.units.get(command.unit_id).await?;
    unit.update_amenities(command.amenities.clone(), clock);
    repos.commit(&repos.units, &mut unit).await
}

/// Handles the `UpdateUnitAddress` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the unit does not exist, or
/// `DomainError::Validation` for a blank address.
pub async fn handle_update_unit_address(
    command: &UpdateUnitAddress,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut unit = repos.units.get(command.unit_id).await?;
    unit.update_address(command.address.clone(), clock)?;
    repos.commit(&repos.units, &mut unit).await
}

/// Handles the `UpdateUnitBuiltInYear` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the unit does not exist, or
/// `DomainError::Validation` for a year out of range.
pub async fn handle_update_unit_built_in_year(
    command: &UpdateUnitBuiltInYear,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut unit = repos.units.get(command.unit_id).await?;
    unit.update_built_in_year(command.year, clock)?;
    repos.commit(&repos.units, &mut unit).await
}

/// Handles the `ChangeUnitStatus` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the unit does not exist, or
/// `DomainError::Validation` when leasing an unleasable unit.
pub async fn handle_change_unit_status(
    command: &ChangeUnitStatus,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut unit = repos.units.get(command.unit_id).await?;
    match command.status {
        UnitStatusChange::Leased => unit.mark_as_leased(clock)?,
        UnitStatusChange::Available => unit.mark_as_available(clock),
        UnitStatusChange::Leasable => unit.mark_as_leasable(clock),
        UnitStatusChange::Unleasable => unit.mark_as_unleasable(clock),
    }
    repos.commit(&repos.units, &mut unit).await
}

// --- tenants ---

/// Handles the `RegisterTenant` command. The identification number must not
/// belong to a tenant the directory already knows.
///
/// # Errors
///
/// Returns `DomainError::Validation` for invalid details or a duplicate
/// identification number.
pub async fn handle_register_tenant(
    command: &RegisterTenant,
    clock: &dyn Clock,
    repos: &RentalRepositories,
    directory: &ProjectionRunner<RentalDirectory>,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    directory.run_once().await?;
    let identification_number = &command.profile.identification_number;
    if let Some(existing) = directory
        .projection()
        .tenant_by_identification_number(identification_number)
        .await
    {
        return Err(DomainError::Validation(format!(
            "identification number {} is already registered to tenant {}",
            identification_number.trim(),
            existing.id
        )));
    }
    let mut tenant = Tenant::register(command.tenant_id, command.profile.clone(), clock)?;
    repos.commit(&repos.tenants, &mut tenant).await
}

/// Handles the `ChangeTenantApproval` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the tenant does not exist.
pub async fn handle_change_tenant_approval(
    command: &ChangeTenantApproval,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut tenant = repos.tenants.get(command.tenant_id).await?;
    if command.approved {
        tenant.approve(clock);
    } else {
        tenant.disapprove(clock);
    }
    repos.commit(&repos.tenants, &mut tenant).await
}

/// Handles the `UpdateTenantContactInfo` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the tenant does not exist, or
/// `DomainError::Validation` if there is nothing to update.
pub async fn handle_update_tenant_contact_info(
    command: &UpdateTenantContactInfo,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut tenant = repos.tenants.get(command.tenant_id).await?;
    tenant.update_contact_info(command.email.clone(), command.phone_number.clone(), clock)?;
    repos.commit(&repos.tenants, &mut tenant).await
}

// --- leases ---

/// Handles the `DraftLease` command. The unit must exist and be leasable;
/// every tenant must exist and be approved.
///
/// # Errors
///
/// Returns `DomainError::Validation` if a referenced aggregate is missing
/// or ineligible, or the dates are invalid.
pub async fn handle_draft_lease(
    command: &DraftLease,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let unit = referenced(&repos.units, command.unit_id, "unit").await?;
    if !unit.is_leasable {
        return Err(DomainError::Validation(format!(
            "unit {} is not leasable",
            unit.id
        )));
    }
    for tenant_id in &command.tenant_ids {
        let tenant = referenced(&repos.tenants, *tenant_id, "tenant").await?;
        require_approved(&tenant)?;
    }
    let mut lease = Lease::draft(
        command.lease_id,
        command.unit_id,
        &command.tenant_ids,
        command.start_date,
        command.end_date,
        clock,
    )?;
    repos.commit(&repos.leases, &mut lease).await
}

/// Handles the `SignLease` command, then marks the lease's unit as leased.
///
/// Both aggregates are checked before anything is written. The unit update
/// is a separate write; on conflict it reloads the unit and tries again.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the lease does not exist,
/// `DomainError::Validation` if it is already signed or its unit cannot be
/// leased, or the error of the unit update if it still fails after retries.
pub async fn handle_sign_lease(
    command: &SignLease,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut lease = repos.leases.get(command.lease_id).await?;
    lease.sign(clock)?;
    let mut unit = referenced(&repos.units, lease.unit_id, "unit").await?;
    unit.mark_as_leased(clock)?;

    let outcome = repos.commit(&repos.leases, &mut lease).await?;

    let mut attempt = 1;
    loop {
        match repos.commit(&repos.units, &mut unit).await {
            Ok(_) => break,
            Err(err) if err.is_conflict() && attempt < FOLLOW_UP_ATTEMPTS => {
                attempt += 1;
                unit = repos.units.get(lease.unit_id).await?;
                unit.mark_as_leased(clock)?;
            }
            Err(err) => {
                warn!(
                    lease_id = %lease.id,
                    unit_id = %lease.unit_id,
                    error = %err,
                    "lease signed but unit not marked as leased"
                );
                return Err(err);
            }
        }
    }
    Ok(outcome)
}

/// Handles the `AddLeaseTenant` command. The tenant must exist and be
/// approved.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the lease does not exist, or
/// `DomainError::Validation` if the tenant is missing, unapproved, or
/// already on the lease.
pub async fn handle_add_lease_tenant(
    command: &AddLeaseTenant,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut lease = repos.leases.get(command.lease_id).await?;
    let tenant = referenced(&repos.tenants, command.tenant_id, "tenant").await?;
    require_approved(&tenant)?;
    lease.add_tenant(command.tenant_id, clock)?;
    repos.commit(&repos.leases, &mut lease).await
}

/// Handles the `RemoveLeaseTenant` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the lease does not exist, or
/// `DomainError::Validation` if the tenant is not on it.
pub async fn handle_remove_lease_tenant(
    command: &RemoveLeaseTenant,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut lease = repos.leases.get(command.lease_id).await?;
    lease.remove_tenant(command.tenant_id, clock)?;
    repos.commit(&repos.leases, &mut lease).await
}

/// Handles the `UpdateLeaseDates` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the lease does not exist, or
/// `DomainError::Validation` if the resulting period is invalid.
pub async fn handle_update_lease_dates(
    command: &UpdateLeaseDates,
    clock: &dyn Clock,
    repos: &RentalRepositories,
) -> Result<CommandOutcome, DomainError> {
    log_command(command);
    let mut lease = repos.leases.get(command.lease_id).await?;
    lease.update_dates(command.start_date, command.end_date, clock)?;
    repos.commit(&repos.leases, &mut lease).await
}
