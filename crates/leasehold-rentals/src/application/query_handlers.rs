//! Query handlers for the rental management context.
//!
//! Single-aggregate lookups read the event store directly and are always
//! current. List queries answer from the rental directory after pulling it
//! up to the current commit horizon.

use chrono::{DateTime, NaiveDate, Utc};
use leasehold_core::error::DomainError;
use leasehold_core::projection::ProjectionRunner;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::RentalRepositories;
use crate::application::directory::RentalDirectory;
use crate::domain::aggregates::{Lease, Tenant, Unit};

/// Read-only view of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitView {
    /// The unit's identifier.
    pub id: Uuid,
    /// Current version.
    pub version: i64,
    /// Street address.
    pub address: String,
    /// Amenities.
    pub amenities: Vec<String>,
    /// Year of construction.
    pub built_in: Option<i32>,
    /// Whether the unit may be leased.
    pub is_leasable: bool,
    /// Whether the unit is under a signed lease.
    pub is_leased: bool,
    /// Whether the unit can be leased right now.
    pub is_available: bool,
    /// When the unit was registered.
    pub created_at: Option<DateTime<Utc>>,
    /// When the unit last changed.
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            version: unit.version,
            address: unit.address.clone(),
            amenities: unit.amenities.clone(),
            built_in: unit.built_in,
            is_leasable: unit.is_leasable,
            is_leased: unit.is_leased,
            is_available: unit.is_available(),
            created_at: unit.created_at,
            modified_at: unit.modified_at,
        }
    }
}

/// Read-only view of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantView {
    /// The tenant's identifier.
    pub id: Uuid,
    /// Current version.
    pub version: i64,
    /// Government or internal identification number.
    pub identification_number: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// First and last name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Whether the tenant passed screening.
    pub is_approved: bool,
    /// When the tenant was registered.
    pub created_at: Option<DateTime<Utc>>,
    /// When the tenant last changed.
    pub modified_at: Option<DateTime<Utc>>,
}

impl From<&Tenant> for TenantView {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            version: tenant.version,
            identification_number: tenant.identification_number.clone(),
            first_name: tenant.first_name.clone(),
            last_name: tenant.last_name.clone(),
            full_name: format!("{} {}", tenant.first_name, tenant.last_name),
            email: tenant.email.clone(),
            phone_number: tenant.phone_number.clone(),
            date_of_birth: tenant.date_of_birth,
            is_approved: tenant.is_approved,
            created_at: tenant.created_at,
            modified_at: tenant.modified_at,
        }
    }
}

/// Read-only view of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseView {
    /// The lease's identifier.
    pub id: Uuid,
    /// Current version.
    pub version: i64,
    /// The leased unit.
    pub unit_id: Uuid,
    /// Tenants on the lease.
    pub tenant_ids: Vec<Uuid>,
    /// First day of the lease.
    pub start_date: Option<NaiveDate>,
    /// Last day of the lease.
    pub end_date: Option<NaiveDate>,
    /// Whether the tenants have signed.
    pub signed_by_tenant: bool,
    /// When the tenants signed.
    pub signed_at: Option<DateTime<Utc>>,
    /// Whether the lease is in force on the day the view was built.
    pub is_active: bool,
    /// When the lease was drafted.
    pub generated_at: Option<DateTime<Utc>>,
    /// When the lease last changed.
    pub modified_at: Option<DateTime<Utc>>,
}

impl LeaseView {
    /// Builds the view as of `today`.
    #[must_use]
    pub fn new(lease: &Lease, today: NaiveDate) -> Self {
        Self {
            id: lease.id,
            version: lease.version,
            unit_id: lease.unit_id,
            tenant_ids: lease.tenant_ids.clone(),
            start_date: lease.start_date,
            end_date: lease.end_date,
            signed_by_tenant: lease.signed_by_tenant,
            signed_at: lease.signed_at,
            is_active: lease.is_active(today),
            generated_at: lease.generated_at,
            modified_at: lease.modified_at,
        }
    }
}

/// Filters for listing leases. Both filters must match when both are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseFilter {
    /// Only leases on this unit.
    pub unit_id: Option<Uuid>,
    /// Only leases naming this tenant.
    pub tenant_id: Option<Uuid>,
    /// Only leases in force today.
    pub active_only: bool,
}

/// Retrieves a unit by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the unit does not exist.
pub async fn get_unit_by_id(
    unit_id: Uuid,
    repos: &RentalRepositories,
) -> Result<UnitView, DomainError> {
    let unit = repos.units.get(unit_id).await?;
    Ok(UnitView::from(&unit))
}

/// Retrieves a tenant by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the tenant does not exist.
pub async fn get_tenant_by_id(
    tenant_id: Uuid,
    repos: &RentalRepositories,
) -> Result<TenantView, DomainError> {
    let tenant = repos.tenants.get(tenant_id).await?;
    Ok(TenantView::from(&tenant))
}

/// Retrieves a lease by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the lease does not exist.
pub async fn get_lease_by_id(
    lease_id: Uuid,
    today: NaiveDate,
    repos: &RentalRepositories,
) -> Result<LeaseView, DomainError> {
    let lease = repos.leases.get(lease_id).await?;
    Ok(LeaseView::new(&lease, today))
}

/// Lists units, optionally only those available to lease.
///
/// # Errors
///
/// Returns an error if the directory cannot catch up with the log.
pub async fn list_units(
    available_only: bool,
    directory: &ProjectionRunner<RentalDirectory>,
) -> Result<Vec<UnitView>, DomainError> {
    directory.run_once().await?;
    let projection = directory.projection();
    let units = if available_only {
        projection.available_units().await
    } else {
        projection.units().await
    };
    Ok(units.iter().map(UnitView::from).collect())
}

/// Lists tenants, optionally only approved ones.
///
/// # Errors
///
/// Returns an error if the directory cannot catch up with the log.
pub async fn list_tenants(
    approved_only: bool,
    directory: &ProjectionRunner<RentalDirectory>,
) -> Result<Vec<TenantView>, DomainError> {
    directory.run_once().await?;
    let projection = directory.projection();
    let tenants = if approved_only {
        projection.approved_tenants().await
    } else {
        projection.tenants().await
    };
    Ok(tenants.iter().map(TenantView::from).collect())
}

/// Finds the tenant registered under `identification_number`.
///
/// # Errors
///
/// Returns an error if the directory cannot catch up with the log.
pub async fn find_tenant_by_identification_number(
    identification_number: &str,
    directory: &ProjectionRunner<RentalDirectory>,
) -> Result<Option<TenantView>, DomainError> {
    directory.run_once().await?;
    Ok(directory
        .projection()
        .tenant_by_identification_number(identification_number)
        .await
        .as_ref()
        .map(TenantView::from))
}

/// Lists leases matching `filter`.
///
/// # Errors
///
/// Returns an error if the directory cannot catch up with the log.
pub async fn list_leases(
    filter: LeaseFilter,
    today: NaiveDate,
    directory: &ProjectionRunner<RentalDirectory>,
) -> Result<Vec<LeaseView>, DomainError> {
    directory.run_once().await?;
    let projection = directory.projection();
    let mut leases = match (filter.unit_id, filter.tenant_id) {
        (Some(unit_id), _) => projection.leases_by_unit(unit_id).await,
        (None, Some(tenant_id)) => projection.leases_by_tenant(tenant_id).await,
        (None, None) if filter.active_only => projection.active_leases(today).await,
        (None, None) => projection.leases().await,
    };
    leases.retain(|lease| {
        filter
            .tenant_id
            .is_none_or(|tenant_id| lease.tenant_ids.contains(&tenant_id))
            && (!filter.active_only || lease.is_active(today))
    });
    Ok(leases.iter().map(|lease| LeaseView::new(lease, today)).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leasehold_core::clock::Clock;
    use leasehold_core::memory::InMemoryRecorder;
    use leasehold_core::notification::NotificationLog;
    use leasehold_core::recorder::Recorder;
    use leasehold_core::snapshot::SnapshotPolicy;
    use leasehold_test_support::FixedClock;

    use super::*;
    use crate::application::command_handlers::{
        handle_change_tenant_approval, handle_change_unit_status, handle_draft_lease,
        handle_register_tenant, handle_register_unit, handle_sign_lease,
    };
    use crate::domain::aggregates::TenantProfile;
    use crate::domain::commands::{
        ChangeTenantApproval, ChangeUnitStatus, DraftLease, RegisterTenant, RegisterUnit,
        SignLease, UnitStatusChange,
    };

    struct Fixture {
        repos: RentalRepositories,
        directory: ProjectionRunner<RentalDirectory>,
        clock: FixedClock,
    }

    fn fixture() -> Fixture {
        let recorder = Arc::new(InMemoryRecorder::new()) as Arc<dyn Recorder>;
        Fixture {
            repos: RentalRepositories::new(Arc::clone(&recorder), SnapshotPolicy::disabled()),
            directory: RentalDirectory::runner(NotificationLog::new(recorder)),
            clock: FixedClock::on(2026, 3, 1),
        }
    }

    impl Fixture {
        async fn unit(&self, address: &str) -> Uuid {
            let command = RegisterUnit {
                correlation_id: Uuid::new_v4(),
                unit_id: Uuid::new_v4(),
                address: address.to_owned(),
                amenities: Vec::new(),
                built_in: None,
            };
            handle_register_unit(&command, &self.clock, &self.repos)
                .await
                .unwrap()
                .id
        }

        async fn tenant(&self, identification_number: &str, approved: bool) -> Uuid {
            let command = RegisterTenant {
                correlation_id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                profile: TenantProfile {
                    identification_number: identification_number.to_owned(),
                    first_name: "Grace".to_owned(),
                    last_name: "Hopper".to_owned(),
                    email: "grace@example.com".to_owned(),
                    phone_number: "555-0199".to_owned(),
                    date_of_birth: NaiveDate::from_ymd_opt(1985, 12, 9).unwrap(),
                },
            };
            let id = handle_register_tenant(&command, &self.clock, &self.repos, &self.directory)
                .await
                .unwrap()
                .id;
            if approved {
                let approve = ChangeTenantApproval {
                    correlation_id: Uuid::new_v4(),
                    tenant_id: id,
                    approved: true,
                };
                handle_change_tenant_approval(&approve, &self.clock, &self.repos)
                    .await
                    .unwrap();
            }
            id
        }

        async fn lease(&self, unit_id: Uuid, tenant_ids: Vec<Uuid>, signed: bool) -> Uuid {
            let command = DraftLease {
                correlation_id: Uuid::new_v4(),
                lease_id: Uuid::new_v4(),
                unit_id,
                tenant_ids,
                start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            };
            let id = handle_draft_lease(&command, &self.clock, &self.repos)
                .await
                .unwrap()
                .id;
            if signed {
                let sign = SignLease {
                    correlation_id: Uuid::new_v4(),
                    lease_id: id,
                };
                handle_sign_lease(&sign, &self.clock, &self.repos)
                    .await
                    .unwrap();
            }
            id
        }
    }

    #[tokio::test]
    async fn test_get_unit_by_id_returns_view() {
        // Arrange
        let f = fixture();
        let unit_id = f.unit("1 Main St").await;

        // Act
        let view = get_unit_by_id(unit_id, &f.repos).await.unwrap();

        // Assert
        assert_eq!(view.id, unit_id);
        assert_eq!(view.version, 1);
        assert_eq!(view.address, "1 Main St");
        assert!(view.is_available);
        assert_eq!(view.created_at, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_get_missing_aggregates_return_not_found() {
        let f = fixture();
        let id = Uuid::new_v4();

        assert!(matches!(
            get_unit_by_id(id, &f.repos).await,
            Err(DomainError::AggregateNotFound(_))
        ));
        assert!(matches!(
            get_tenant_by_id(id, &f.repos).await,
            Err(DomainError::AggregateNotFound(_))
        ));
        assert!(matches!(
            get_lease_by_id(id, f.clock.today(), &f.repos).await,
            Err(DomainError::AggregateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_id_of_another_kind_is_not_found() {
        // Arrange
        let f = fixture();
        let unit_id = f.unit("1 Main St").await;

        // Act
        let as_tenant = get_tenant_by_id(unit_id, &f.repos).await;
        let as_lease = get_lease_by_id(unit_id, f.clock.today(), &f.repos).await;

        // Assert
        assert!(matches!(as_tenant, Err(DomainError::AggregateNotFound(id)) if id == unit_id));
        assert!(matches!(as_lease, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_tenant_view_has_full_name() {
        let f = fixture();
        let tenant_id = f.tenant("T-1", false).await;

        let view = get_tenant_by_id(tenant_id, &f.repos).await.unwrap();

        assert_eq!(view.full_name, "Grace Hopper");
        assert!(!view.is_approved);
    }

    #[tokio::test]
    async fn test_list_units_sees_writes_immediately() {
        // Arrange
        let f = fixture();
        let first = f.unit("1 Main St").await;
        let second = f.unit("2 Main St").await;
        handle_change_unit_status(
            &ChangeUnitStatus {
                correlation_id: Uuid::new_v4(),
                unit_id: second,
                status: UnitStatusChange::Unleasable,
            },
            &f.clock,
            &f.repos,
        )
        .await
        .unwrap();

        // Act
        let all = list_units(false, &f.directory).await.unwrap();
        let available = list_units(true, &f.directory).await.unwrap();

        // Assert
        assert_eq!(all.len(), 2);
        let available_ids: Vec<_> = available.iter().map(|u| u.id).collect();
        assert_eq!(available_ids, vec![first]);
    }

    #[tokio::test]
    async fn test_list_tenants_filters_approved() {
        let f = fixture();
        let approved = f.tenant("T-1", true).await;
        f.tenant("T-2", false).await;

        let all = list_tenants(false, &f.directory).await.unwrap();
        let only_approved = list_tenants(true, &f.directory).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(only_approved.len(), 1);
        assert_eq!(only_approved[0].id, approved);
    }

    #[tokio::test]
    async fn test_find_tenant_by_identification_number() {
        let f = fixture();
        let tenant_id = f.tenant("T-77", false).await;

        let found = find_tenant_by_identification_number(" T-77 ", &f.directory)
            .await
            .unwrap();
        let missing = find_tenant_by_identification_number("T-78", &f.directory)
            .await
            .unwrap();

        assert_eq!(found.map(|t| t.id), Some(tenant_id));
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_leases_by_unit_tenant_and_activity() {
        // Arrange
        let f = fixture();
        let unit_a = f.unit("1 Main St").await;
        let unit_b = f.unit("2 Main St").await;
        let alice = f.tenant("T-1", true).await;
        let bob = f.tenant("T-2", true).await;
        let signed = f.lease(unit_a, vec![alice], true).await;
        let drafted = f.lease(unit_b, vec![alice, bob], false).await;
        let today = f.clock.today();

        // Act
        let by_unit = list_leases(
            LeaseFilter {
                unit_id: Some(unit_b),
                ..LeaseFilter::default()
            },
            today,
            &f.directory,
        )
        .await
        .unwrap();
        let by_tenant = list_leases(
            LeaseFilter {
                tenant_id: Some(alice),
                ..LeaseFilter::default()
            },
            today,
            &f.directory,
        )
        .await
        .unwrap();
        let active = list_leases(
            LeaseFilter {
                active_only: true,
                ..LeaseFilter::default()
            },
            today,
            &f.directory,
        )
        .await
        .unwrap();
        let bob_on_a = list_leases(
            LeaseFilter {
                unit_id: Some(unit_a),
                tenant_id: Some(bob),
                active_only: false,
            },
            today,
            &f.directory,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(by_unit.iter().map(|l| l.id).collect::<Vec<_>>(), vec![drafted]);
        assert_eq!(by_tenant.len(), 2);
        assert_eq!(active.iter().map(|l| l.id).collect::<Vec<_>>(), vec![signed]);
        assert!(active[0].is_active);
        assert!(bob_on_a.is_empty());
    }
}
