//! Domain events for the rental management context.
//!
//! Every event is stored under its own topic with the variant's payload
//! struct as state. The topic registries below map each topic back to a
//! typed constructor.

use chrono::NaiveDate;
use leasehold_core::event::{DomainEvent, EventMetadata};
use leasehold_core::store::TopicRegistry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic prefix shared by every event in this context.
pub const TOPIC_PREFIX: &str = "rentals.";

pub const UNIT_CREATED: &str = "rentals.unit.created";
pub const UNIT_MARKED_AS_LEASED: &str = "rentals.unit.marked_as_leased";
pub const UNIT_MARKED_AS_AVAILABLE: &str = "rentals.unit.marked_as_available";
pub const UNIT_MARKED_AS_UNLEASABLE: &str = "rentals.unit.marked_as_unleasable";
pub const UNIT_MARKED_AS_LEASABLE: &str = "rentals.unit.marked_as_leasable";
pub const UNIT_AMENITIES_UPDATED: &str = "rentals.unit.amenities_updated";
pub const UNIT_ADDRESS_UPDATED: &str = "rentals.unit.address_updated";
pub const UNIT_BUILT_IN_YEAR_UPDATED: &str = "rentals.unit.built_in_year_updated";

pub const TENANT_CREATED: &str = "rentals.tenant.created";
pub const TENANT_APPROVED: &str = "rentals.tenant.approved";
pub const TENANT_DISAPPROVED: &str = "rentals.tenant.disapproved";
pub const TENANT_CONTACT_INFO_UPDATED: &str = "rentals.tenant.contact_info_updated";

pub const LEASE_CREATED: &str = "rentals.lease.created";
pub const LEASE_SIGNED_BY_TENANT: &str = "rentals.lease.signed_by_tenant";
pub const LEASE_TENANT_ADDED: &str = "rentals.lease.tenant_added";
pub const LEASE_TENANT_REMOVED: &str = "rentals.lease.tenant_removed";
pub const LEASE_DATES_UPDATED: &str = "rentals.lease.dates_updated";

fn decode_payload<P, K, E>(
    metadata: EventMetadata,
    state: serde_json::Value,
    wrap: fn(P) -> K,
    envelope: fn(EventMetadata, K) -> E,
) -> Result<E, serde_json::Error>
where
    P: DeserializeOwned,
{
    let payload: P = serde_json::from_value(state)?;
    Ok(envelope(metadata, wrap(payload)))
}

// --- unit ---

/// Emitted when a unit is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCreated {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// Street address.
    pub address: String,
    /// Amenities offered with the unit.
    pub amenities: Vec<String>,
    /// Year of construction, if known.
    pub built_in: Option<i32>,
}

/// Emitted when a unit's leasing status changes. Carries only the unit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatusChanged {
    /// The unit identifier.
    pub unit_id: Uuid,
}

/// Emitted when a unit's amenities are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmenitiesUpdated {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The new amenity list.
    pub amenities: Vec<String>,
}

/// Emitted when a unit's address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressUpdated {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The new address.
    pub address: String,
}

/// Emitted when a unit's construction year is corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltInYearUpdated {
    /// The unit identifier.
    pub unit_id: Uuid,
    /// The construction year.
    pub year: i32,
}

/// Event payload variants for units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEventKind {
    /// The unit was registered.
    Created(UnitCreated),
    /// The unit is now leased.
    MarkedAsLeased(UnitStatusChanged),
    /// The unit is no longer leased.
    MarkedAsAvailable(UnitStatusChanged),
    /// The unit was withdrawn from leasing.
    MarkedAsUnleasable(UnitStatusChanged),
    /// The unit may be leased again.
    MarkedAsLeasable(UnitStatusChanged),
    /// The amenity list was replaced.
    AmenitiesUpdated(AmenitiesUpdated),
    /// The address changed.
    AddressUpdated(AddressUpdated),
    /// The construction year changed.
    BuiltInYearUpdated(BuiltInYearUpdated),
}

/// Domain event envelope for units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: UnitEventKind,
}

impl UnitEvent {
    fn envelope(metadata: EventMetadata, kind: UnitEventKind) -> Self {
        Self { metadata, kind }
    }
}

impl DomainEvent for UnitEvent {
    fn topic(&self) -> &'static str {
        match &self.kind {
            UnitEventKind::Created(_) => UNIT_CREATED,
            UnitEventKind::MarkedAsLeased(_) => UNIT_MARKED_AS_LEASED,
            UnitEventKind::MarkedAsAvailable(_) => UNIT_MARKED_AS_AVAILABLE,
            UnitEventKind::MarkedAsUnleasable(_) => UNIT_MARKED_AS_UNLEASABLE,
            UnitEventKind::MarkedAsLeasable(_) => UNIT_MARKED_AS_LEASABLE,
            UnitEventKind::AmenitiesUpdated(_) => UNIT_AMENITIES_UPDATED,
            UnitEventKind::AddressUpdated(_) => UNIT_ADDRESS_UPDATED,
            UnitEventKind::BuiltInYearUpdated(_) => UNIT_BUILT_IN_YEAR_UPDATED,
        }
    }

    fn to_state(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.kind {
            UnitEventKind::Created(payload) => serde_json::to_value(payload),
            UnitEventKind::MarkedAsLeased(payload)
            | UnitEventKind::MarkedAsAvailable(payload)
            | UnitEventKind::MarkedAsUnleasable(payload)
            | UnitEventKind::MarkedAsLeasable(payload) => serde_json::to_value(payload),
            UnitEventKind::AmenitiesUpdated(payload) => serde_json::to_value(payload),
            UnitEventKind::AddressUpdated(payload) => serde_json::to_value(payload),
            UnitEventKind::BuiltInYearUpdated(payload) => serde_json::to_value(payload),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Decoders for every unit topic.
#[must_use]
pub fn unit_topics() -> TopicRegistry<UnitEvent> {
    TopicRegistry::new()
        .with(UNIT_CREATED, |m, s| {
            decode_payload(m, s, UnitEventKind::Created, UnitEvent::envelope)
        })
        .with(UNIT_MARKED_AS_LEASED, |m, s| {
            decode_payload(m, s, UnitEventKind::MarkedAsLeased, UnitEvent::envelope)
        })
        .with(UNIT_MARKED_AS_AVAILABLE, |m, s| {
            decode_payload(m, s, UnitEventKind::MarkedAsAvailable, UnitEvent::envelope)
        })
        .with(UNIT_MARKED_AS_UNLEASABLE, |m, s| {
            decode_payload(m, s, UnitEventKind::MarkedAsUnleasable, UnitEvent::envelope)
        })
        .with(UNIT_MARKED_AS_LEASABLE, |m, s| {
            decode_payload(m, s, UnitEventKind::MarkedAsLeasable, UnitEvent::envelope)
        })
        .with(UNIT_AMENITIES_UPDATED, |m, s| {
            decode_payload(m, s, UnitEventKind::AmenitiesUpdated, UnitEvent::envelope)
        })
        .with(UNIT_ADDRESS_UPDATED, |m, s| {
            decode_payload(m, s, UnitEventKind::AddressUpdated, UnitEvent::envelope)
        })
        .with(UNIT_BUILT_IN_YEAR_UPDATED, |m, s| {
            decode_payload(m, s, UnitEventKind::BuiltInYearUpdated, UnitEvent::envelope)
        })
}

// --- tenant ---

/// Emitted when a tenant is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCreated {
    /// The tenant identifier.
    pub tenant_id: Uuid,
    /// Government-issued identification number, unique across tenants.
    pub identification_number: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
}

/// Emitted when a tenant's approval status changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantApprovalChanged {
    /// The tenant identifier.
    pub tenant_id: Uuid,
}

/// Emitted when a tenant's contact details change. Absent fields keep
/// their previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfoUpdated {
    /// The tenant identifier.
    pub tenant_id: Uuid,
    /// New email, if changed.
    pub email: Option<String>,
    /// New phone number, if changed.
    pub phone_number: Option<String>,
}

/// Event payload variants for tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantEventKind {
    /// The tenant was registered.
    Created(TenantCreated),
    /// The tenant passed screening.
    Approved(TenantApprovalChanged),
    /// The tenant's approval was withdrawn.
    Disapproved(TenantApprovalChanged),
    /// Contact details changed.
    ContactInfoUpdated(ContactInfoUpdated),
}

/// Domain event envelope for tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TenantEventKind,
}

impl TenantEvent {
    fn envelope(metadata: EventMetadata, kind: TenantEventKind) -> Self {
        Self { metadata, kind }
    }
}

impl DomainEvent for TenantEvent {
    fn topic(&self) -> &'static str {
        match &self.kind {
            TenantEventKind::Created(_) => TENANT_CREATED,
            TenantEventKind::Approved(_) => TENANT_APPROVED,
            TenantEventKind::Disapproved(_) => TENANT_DISAPPROVED,
            TenantEventKind::ContactInfoUpdated(_) => TENANT_CONTACT_INFO_UPDATED,
        }
    }

    fn to_state(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.kind {
            TenantEventKind::Created(payload) => serde_json::to_value(payload),
            TenantEventKind::Approved(payload) | TenantEventKind::Disapproved(payload) => {
                serde_json::to_value(payload)
            }
            TenantEventKind::ContactInfoUpdated(payload) => serde_json::to_value(payload),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Decoders for every tenant topic.
#[must_use]
pub fn tenant_topics() -> TopicRegistry<TenantEvent> {
    TopicRegistry::new()
        .with(TENANT_CREATED, |m, s| {
            decode_payload(m, s, TenantEventKind::Created, TenantEvent::envelope)
        })
        .with(TENANT_APPROVED, |m, s| {
            decode_payload(m, s, TenantEventKind::Approved, TenantEvent::envelope)
        })
        .with(TENANT_DISAPPROVED, |m, s| {
            decode_payload(m, s, TenantEventKind::Disapproved, TenantEvent::envelope)
        })
        .with(TENANT_CONTACT_INFO_UPDATED, |m, s| {
            decode_payload(m, s, TenantEventKind::ContactInfoUpdated, TenantEvent::envelope)
        })
}

// --- lease ---

/// Emitted when a lease is drafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseCreated {
    /// The lease identifier.
    pub lease_id: Uuid,
    /// The leased unit.
    pub unit_id: Uuid,
    /// Tenants party to the lease.
    pub tenant_ids: Vec<Uuid>,
    /// First day of the lease.
    pub start_date: NaiveDate,
    /// Last day of the lease.
    pub end_date: NaiveDate,
}

/// Emitted when the tenants sign the lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSignedByTenant {
    /// The lease identifier.
    pub lease_id: Uuid,
}

/// Emitted when a tenant joins or leaves a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTenantChanged {
    /// The lease identifier.
    pub lease_id: Uuid,
    /// The tenant added or removed.
    pub tenant_id: Uuid,
}

/// Emitted when the lease period changes. Absent dates are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseDatesUpdated {
    /// The lease identifier.
    pub lease_id: Uuid,
    /// New first day, if changed.
    pub start_date: Option<NaiveDate>,
    /// New last day, if changed.
    pub end_date: Option<NaiveDate>,
}

/// Event payload variants for leases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseEventKind {
    /// The lease was drafted.
    Created(LeaseCreated),
    /// The tenants signed.
    SignedByTenant(LeaseSignedByTenant),
    /// A tenant joined the lease.
    TenantAdded(LeaseTenantChanged),
    /// A tenant left the lease.
    TenantRemoved(LeaseTenantChanged),
    /// The lease period changed.
    DatesUpdated(LeaseDatesUpdated),
}

/// Domain event envelope for leases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: LeaseEventKind,
}

impl LeaseEvent {
    fn envelope(metadata: EventMetadata, kind: LeaseEventKind) -> Self {
        Self { metadata, kind }
    }
}

impl DomainEvent for LeaseEvent {
    fn topic(&self) -> &'static str {
        match &self.kind {
            LeaseEventKind::Created(_) => LEASE_CREATED,
            LeaseEventKind::SignedByTenant(_) => LEASE_SIGNED_BY_TENANT,
            LeaseEventKind::TenantAdded(_) => LEASE_TENANT_ADDED,
            LeaseEventKind::TenantRemoved(_) => LEASE_TENANT_REMOVED,
            LeaseEventKind::DatesUpdated(_) => LEASE_DATES_UPDATED,
        }
    }

    fn to_state(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.kind {
            LeaseEventKind::Created(payload) => serde_json::to_value(payload),
            LeaseEventKind::SignedByTenant(payload) => serde_json::to_value(payload),
            LeaseEventKind::TenantAdded(payload) | LeaseEventKind::TenantRemoved(payload) => {
                serde_json::to_value(payload)
            }
            LeaseEventKind::DatesUpdated(payload) => serde_json::to_value(payload),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Decoders for every lease topic.
#[must_use]
pub fn lease_topics() -> TopicRegistry<LeaseEvent> {
    TopicRegistry::new()
        .with(LEASE_CREATED, |m, s| {
            decode_payload(m, s, LeaseEventKind::Created, LeaseEvent::envelope)
        })
        .with(LEASE_SIGNED_BY_TENANT, |m, s| {
            decode_payload(m, s, LeaseEventKind::SignedByTenant, LeaseEvent::envelope)
        })
        .with(LEASE_TENANT_ADDED, |m, s| {
            decode_payload(m, s, LeaseEventKind::TenantAdded, LeaseEvent::envelope)
        })
        .with(LEASE_TENANT_REMOVED, |m, s| {
            decode_payload(m, s, LeaseEventKind::TenantRemoved, LeaseEvent::envelope)
        })
        .with(LEASE_DATES_UPDATED, |m, s| {
            decode_payload(m, s, LeaseEventKind::DatesUpdated, LeaseEvent::envelope)
        })
}
