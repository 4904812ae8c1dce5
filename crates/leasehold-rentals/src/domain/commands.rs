//! Commands for the rental management context.

use chrono::NaiveDate;
use leasehold_core::command::Command;
use uuid::Uuid;

use super::aggregates::TenantProfile;

/// Command to register a new unit.
#[derive(Debug, Clone)]
pub struct RegisterUnit {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new unit.
    pub unit_id: Uuid,
    /// Street address.
    pub address: String,
    /// Amenities offered with the unit.
    pub amenities: Vec<String>,
    /// Year of construction, if known.
    pub built_in: Option<i32>,
}

impl Command for RegisterUnit {
    fn command_type(&self) -> &'static str {
        "rentals.register_unit"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.unit_id
    }
}

/// Command to replace a unit's amenities.
#[derive(Debug, Clone)]
pub struct UpdateUnitAmenities {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The new amenity list.
    pub amenities: Vec<String>,
}

impl Command for UpdateUnitAmenities {
    fn command_type(&self) -> &'static str {
        "rentals.update_unit_amenities"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.unit_id
    }
}

/// Command to change a unit's address.
#[derive(Debug, Clone)]
pub struct UpdateUnitAddress {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The new address.
    pub address: String,
}

impl Command for UpdateUnitAddress {
    fn command_type(&self) -> &'static str {
        "rentals.update_unit_address"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.unit_id
    }
}

/// Command to correct a unit's construction year.
#[derive(Debug, Clone)]
pub struct UpdateUnitBuiltInYear {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The construction year.
    pub year: i32,
}

impl Command for UpdateUnitBuiltInYear {
    fn command_type(&self) -> &'static str {
        "rentals.update_unit_built_in_year"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.unit_id
    }
}

/// Leasing status a unit can be moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatusChange {
    /// Occupied under a lease.
    Leased,
    /// No longer occupied.
    Available,
    /// Open for leasing.
    Leasable,
    /// Withdrawn from leasing.
    Unleasable,
}

/// Command to change a unit's leasing status.
#[derive(Debug, Clone)]
pub struct ChangeUnitStatus {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The target status.
    pub status: UnitStatusChange,
}

impl Command for ChangeUnitStatus {
    fn command_type(&self) -> &'static str {
        "rentals.change_unit_status"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.unit_id
    }
}

/// Command to register a new tenant.
#[derive(Debug, Clone)]
pub struct RegisterTenant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new tenant.
    pub tenant_id: Uuid,
    /// Personal details.
    pub profile: TenantProfile,
}

impl Command for RegisterTenant {
    fn command_type(&self) -> &'static str {
        "rentals.register_tenant"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.tenant_id
    }
}

/// Command to approve or disapprove a tenant.
#[derive(Debug, Clone)]
pub struct ChangeTenantApproval {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The tenant identifier.
    pub tenant_id: Uuid,
    /// `true` to approve, `false` to withdraw approval.
    pub approved: bool,
}

impl Command for ChangeTenantApproval {
    fn command_type(&self) -> &'static str {
        if self.approved {
            "rentals.approve_tenant"
        } else {
            "rentals.disapprove_tenant"
        }
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.tenant_id
    }
}

/// Command to update a tenant's contact details.
#[derive(Debug, Clone)]
pub struct UpdateTenantContactInfo {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The tenant identifier.
    pub tenant_id: Uuid,
    /// New email, if changing.
    pub email: Option<String>,
    /// New phone number, if changing.
    pub phone_number: Option<String>,
}

impl Command for UpdateTenantContactInfo {
    fn command_type(&self) -> &'static str {
        "rentals.update_tenant_contact_info"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.tenant_id
    }
}

/// Command to draft a lease for a unit.
#[derive(Debug, Clone)]
pub struct DraftLease {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new lease.
    pub lease_id: Uuid,
    /// The unit to lease.
    pub unit_id: Uuid,
    /// Tenants party to the lease.
    pub tenant_ids: Vec<Uuid>,
    /// First day of the lease.
    pub start_date: NaiveDate,
    /// Last day of the lease.
    pub end_date: NaiveDate,
}

impl Command for DraftLease {
    fn command_type(&self) -> &'static str {
        "rentals.draft_lease"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.lease_id
    }
}

/// Command to record the tenants' signature on a lease.
#[derive(Debug, Clone)]
pub struct SignLease {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The lease identifier.
    pub lease_id: Uuid,
}

impl Command for SignLease {
    fn command_type(&self) -> &'static str {
        "rentals.sign_lease"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.lease_id
    }
}

/// Command to add a tenant to a lease.
#[derive(Debug, Clone)]
pub struct AddLeaseTenant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The lease identifier.
    pub lease_id: Uuid,
    /// The tenant to add.
    pub tenant_id: Uuid,
}

impl Command for AddLeaseTenant {
    fn command_type(&self) -> &'static str {
        "rentals.add_lease_tenant"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.lease_id
    }
}

/// Command to remove a tenant from a lease.
#[derive(Debug, Clone)]
pub struct RemoveLeaseTenant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The lease identifier.
    pub lease_id: Uuid,
    /// The tenant to remove.
    pub tenant_id: Uuid,
}

impl Command for RemoveLeaseTenant {
    fn command_type(&self) -> &'static str {
        "rentals.remove_lease_tenant"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.lease_id
    }
}

/// Command to move a lease's start and/or end date.
#[derive(Debug, Clone)]
pub struct UpdateLeaseDates {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The lease identifier.
    pub lease_id: Uuid,
    /// New first day, if changing.
    pub start_date: Option<NaiveDate>,
    /// New last day, if changing.
    pub end_date: Option<NaiveDate>,
}

impl Command for UpdateLeaseDates {
    fn command_type(&self) -> &'static str {
        "rentals.update_lease_dates"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.lease_id
    }
}
