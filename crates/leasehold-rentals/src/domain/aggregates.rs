//! Aggregate roots for the rental management context.
//!
//! Each command method validates against current state, then records an
//! event and applies it immediately, so the aggregate's version already
//! counts its pending events.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use leasehold_core::aggregate::AggregateRoot;
use leasehold_core::clock::Clock;
use leasehold_core::error::DomainError;
use leasehold_core::event::EventMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    AddressUpdated, AmenitiesUpdated, BuiltInYearUpdated, ContactInfoUpdated, LeaseCreated,
    LeaseDatesUpdated, LeaseEvent, LeaseEventKind, LeaseSignedByTenant, LeaseTenantChanged,
    TenantApprovalChanged, TenantCreated, TenantEvent, TenantEventKind, UnitCreated, UnitEvent,
    UnitEventKind, UnitStatusChanged,
};

/// Earliest construction year a unit may carry.
pub const EARLIEST_BUILT_IN_YEAR: i32 = 1800;

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_built_in_year(year: i32, clock: &dyn Clock) -> Result<(), DomainError> {
    let current = clock.today().year();
    if !(EARLIEST_BUILT_IN_YEAR..=current).contains(&year) {
        return Err(DomainError::Validation(format!(
            "built-in year must be between {EARLIEST_BUILT_IN_YEAR} and {current}, got {year}"
        )));
    }
    Ok(())
}

fn require_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), DomainError> {
    if start >= end {
        return Err(DomainError::Validation(format!(
            "end date {end} must be after start date {start}"
        )));
    }
    Ok(())
}

// --- unit ---

/// A rental property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last applied event.
    pub(crate) version: i64,
    /// Street address.
    pub address: String,
    /// Amenities offered with the unit.
    pub amenities: Vec<String>,
    /// Year of construction, if known.
    pub built_in: Option<i32>,
    /// Whether the unit may be leased at all.
    pub is_leasable: bool,
    /// Whether the unit is currently leased.
    pub is_leased: bool,
    /// When the unit was registered.
    pub created_at: Option<DateTime<Utc>>,
    /// When the unit last changed.
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    uncommitted_events: Vec<UnitEvent>,
}

impl Unit {
    /// Registers a new unit, producing a `Created` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the address is blank or the
    /// construction year is out of range.
    pub fn register(
        id: Uuid,
        address: String,
        amenities: Vec<String>,
        built_in: Option<i32>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        require_text("address", &address)?;
        if let Some(year) = built_in {
            require_built_in_year(year, clock)?;
        }
        let mut unit = Self::blank(id);
        unit.record(
            UnitEventKind::Created(UnitCreated {
                unit_id: id,
                address,
                amenities,
                built_in,
            }),
            clock,
        );
        Ok(unit)
    }

    /// Returns `true` if the unit can take a new lease.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_leasable && !self.is_leased
    }

    /// Marks the unit as leased.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the unit is not leasable.
    pub fn mark_as_leased(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.is_leasable {
            return Err(DomainError::Validation(format!(
                "unit {} is not leasable",
                self.id
            )));
        }
        self.record(UnitEventKind::MarkedAsLeased(self.status_payload()), clock);
        Ok(())
    }

    /// Marks the unit as no longer leased.
    pub fn mark_as_available(&mut self, clock: &dyn Clock) {
        self.record(UnitEventKind::MarkedAsAvailable(self.status_payload()), clock);
    }

    /// Withdraws the unit from leasing.
    pub fn mark_as_unleasable(&mut self, clock: &dyn Clock) {
        self.record(UnitEventKind::MarkedAsUnleasable(self.status_payload()), clock);
    }

    /// Allows the unit to be leased.
    pub fn mark_as_leasable(&mut self, clock: &dyn Clock) {
        self.record(UnitEventKind::MarkedAsLeasable(self.status_payload()), clock);
    }

    /// Replaces the amenity list.
    pub fn update_amenities(&mut self, amenities: Vec<String>, clock: &dyn Clock) {
        self.record(
            UnitEventKind::AmenitiesUpdated(AmenitiesUpdated {
                unit_id: self.id,
                amenities,
            }),
            clock,
        );
    }

    /// Changes the address.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the address is blank.
    pub fn update_address(
        &mut self,
        address: String,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        require_text("address", &address)?;
        self.record(
            UnitEventKind::AddressUpdated(AddressUpdated {
                unit_id: self.id,
                address,
            }),
            clock,
        );
        Ok(())
    }

    /// Corrects the construction year.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless `year` lies between 1800 and
    /// the current year.
    pub fn update_built_in_year(
        &mut self,
        year: i32,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        require_built_in_year(year, clock)?;
        self.record(
            UnitEventKind::BuiltInYearUpdated(BuiltInYearUpdated {
                unit_id: self.id,
                year,
            }),
            clock,
        );
        Ok(())
    }

    fn status_payload(&self) -> UnitStatusChanged {
        UnitStatusChanged { unit_id: self.id }
    }

    fn record(&mut self, kind: UnitEventKind, clock: &dyn Clock) {
        let event = UnitEvent {
            metadata: EventMetadata::next(self.id, self.version, self.modified_at, clock),
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for Unit {
    type Event = UnitEvent;

    const TYPE_NAME: &'static str = "rentals.Unit";

    fn blank(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            address: String::new(),
            amenities: Vec::new(),
            built_in: None,
            is_leasable: true,
            is_leased: false,
            created_at: None,
            modified_at: None,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            UnitEventKind::Created(created) => {
                self.address.clone_from(&created.address);
                self.amenities.clone_from(&created.amenities);
                self.built_in = created.built_in;
                self.is_leasable = true;
                self.is_leased = false;
                self.created_at = Some(event.metadata.timestamp);
            }
            UnitEventKind::MarkedAsLeased(_) => self.is_leased = true,
            UnitEventKind::MarkedAsAvailable(_) => self.is_leased = false,
            UnitEventKind::MarkedAsUnleasable(_) => self.is_leasable = false,
            UnitEventKind::MarkedAsLeasable(_) => self.is_leasable = true,
            UnitEventKind::AmenitiesUpdated(updated) => {
                self.amenities.clone_from(&updated.amenities);
            }
            UnitEventKind::AddressUpdated(updated) => self.address.clone_from(&updated.address),
            UnitEventKind::BuiltInYearUpdated(updated) => self.built_in = Some(updated.year),
        }
        self.version = event.metadata.originator_version;
        self.modified_at = Some(event.metadata.timestamp);
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

// --- tenant ---

/// A prospective or current renter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last applied event.
    pub(crate) version: i64,
    /// Government-issued identification number.
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
    pub date_of_birth: Option<NaiveDate>,
    /// Whether the tenant passed screening.
    pub is_approved: bool,
    /// When the tenant was registered.
    pub created_at: Option<DateTime<Utc>>,
    /// When the tenant last changed.
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    uncommitted_events: Vec<TenantEvent>,
}

/// Personal details captured at tenant registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantProfile {
    /// Government-issued identification number.
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

impl Tenant {
    /// Registers a new tenant, producing a `Created` event. Tenants start
    /// unapproved.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the identification number or a
    /// name is blank, or the date of birth lies in the future.
    pub fn register(
        id: Uuid,
        profile: TenantProfile,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        require_text("identification number", &profile.identification_number)?;
        require_text("first name", &profile.first_name)?;
        require_text("last name", &profile.last_name)?;
        if profile.date_of_birth > clock.today() {
            return Err(DomainError::Validation(format!(
                "date of birth {} lies in the future",
                profile.date_of_birth
            )));
        }
        let mut tenant = Self::blank(id);
        tenant.record(
            TenantEventKind::Created(TenantCreated {
                tenant_id: id,
                identification_number: profile.identification_number.trim().to_owned(),
                first_name: profile.first_name,
                last_name: profile.last_name,
                email: profile.email,
                phone_number: profile.phone_number,
                date_of_birth: profile.date_of_birth,
            }),
            clock,
        );
        Ok(tenant)
    }

    /// Approves the tenant.
    pub fn approve(&mut self, clock: &dyn Clock) {
        self.record(
            TenantEventKind::Approved(TenantApprovalChanged { tenant_id: self.id }),
            clock,
        );
    }

    /// Withdraws the tenant's approval.
    pub fn disapprove(&mut self, clock: &dyn Clock) {
        self.record(
            TenantEventKind::Disapproved(TenantApprovalChanged { tenant_id: self.id }),
            clock,
        );
    }

    /// Updates contact details. Blank or absent values keep the current one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if neither value is given.
    pub fn update_contact_info(
        &mut self,
        email: Option<String>,
        phone_number: Option<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let email = email.filter(|e| !e.trim().is_empty());
        let phone_number = phone_number.filter(|p| !p.trim().is_empty());
        if email.is_none() && phone_number.is_none() {
            return Err(DomainError::Validation(
                "contact update needs an email or a phone number".into(),
            ));
        }
        self.record(
            TenantEventKind::ContactInfoUpdated(ContactInfoUpdated {
                tenant_id: self.id,
                email,
                phone_number,
            }),
            clock,
        );
        Ok(())
    }

    fn record(&mut self, kind: TenantEventKind, clock: &dyn Clock) {
        let event = TenantEvent {
            metadata: EventMetadata::next(self.id, self.version, self.modified_at, clock),
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for Tenant {
    type Event = TenantEvent;

    const TYPE_NAME: &'static str = "rentals.Tenant";

    fn blank(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            identification_number: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone_number: String::new(),
            date_of_birth: None,
            is_approved: false,
            created_at: None,
            modified_at: None,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            TenantEventKind::Created(created) => {
                self.identification_number
                    .clone_from(&created.identification_number);
                self.first_name.clone_from(&created.first_name);
                self.last_name.clone_from(&created.last_name);
                self.email.clone_from(&created.email);
                self.phone_number.clone_from(&created.phone_number);
                self.date_of_birth = Some(created.date_of_birth);
                self.is_approved = false;
                self.created_at = Some(event.metadata.timestamp);
            }
            TenantEventKind::Approved(_) => self.is_approved = true,
            TenantEventKind::Disapproved(_) => self.is_approved = false,
            TenantEventKind::ContactInfoUpdated(updated) => {
                if let Some(email) = &updated.email {
                    self.email.clone_from(email);
                }
                if let Some(phone_number) = &updated.phone_number {
                    self.phone_number.clone_from(phone_number);
                }
            }
        }
        self.version = event.metadata.originator_version;
        self.modified_at = Some(event.metadata.timestamp);
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

// --- lease ---

/// A contract between tenants and the owner of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last applied event.
    pub(crate) version: i64,
    /// The leased unit.
    pub unit_id: Uuid,
    /// Tenants party to the lease, in the order they joined.
    pub tenant_ids: Vec<Uuid>,
    /// First day of the lease.
    pub start_date: Option<NaiveDate>,
    /// Last day of the lease.
    pub end_date: Option<NaiveDate>,
    /// When the lease was drafted.
    pub generated_at: Option<DateTime<Utc>>,
    /// When the tenants signed.
    pub signed_at: Option<DateTime<Utc>>,
    /// Whether the tenants have signed.
    pub signed_by_tenant: bool,
    /// When the lease last changed.
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    uncommitted_events: Vec<LeaseEvent>,
}

impl Lease {
    /// Drafts a lease, producing a `Created` event. Duplicate tenant ids are
    /// dropped.
    ///
    /// Whether the unit and tenants are eligible is checked by the caller,
    /// which can see those aggregates.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless `end_date` is after
    /// `start_date`.
    pub fn draft(
        id: Uuid,
        unit_id: Uuid,
        tenant_ids: &[Uuid],
        start_date: NaiveDate,
        end_date: NaiveDate,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        require_date_range(start_date, end_date)?;
        let mut unique = Vec::with_capacity(tenant_ids.len());
        for tenant_id in tenant_ids {
            if !unique.contains(tenant_id) {
                unique.push(*tenant_id);
            }
        }
        let mut lease = Self::blank(id);
        lease.record(
            LeaseEventKind::Created(LeaseCreated {
                lease_id: id,
                unit_id,
                tenant_ids: unique,
                start_date,
                end_date,
            }),
            clock,
        );
        Ok(lease)
    }

    /// Returns `true` if the lease is signed and `today` lies within its
    /// period (both ends inclusive).
    #[must_use]
    pub fn is_active(&self, today: NaiveDate) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => self.signed_by_tenant && start <= today && today <= end,
            _ => false,
        }
    }

    /// Records the tenants' signature.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the lease is already signed.
    pub fn sign(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.signed_by_tenant {
            return Err(DomainError::Validation(format!(
                "lease {} is already signed",
                self.id
            )));
        }
        self.record(
            LeaseEventKind::SignedByTenant(LeaseSignedByTenant { lease_id: self.id }),
            clock,
        );
        Ok(())
    }

    /// Adds a tenant to the lease.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the tenant is already on it.
    pub fn add_tenant(&mut self, tenant_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.tenant_ids.contains(&tenant_id) {
            return Err(DomainError::Validation(format!(
                "tenant {tenant_id} is already on lease {}",
                self.id
            )));
        }
        self.record(
            LeaseEventKind::TenantAdded(LeaseTenantChanged {
                lease_id: self.id,
                tenant_id,
            }),
            clock,
        );
        Ok(())
    }

    /// Removes a tenant from the lease.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the tenant is not on it.
    pub fn remove_tenant(
        &mut self,
        tenant_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.tenant_ids.contains(&tenant_id) {
            return Err(DomainError::Validation(format!(
                "tenant {tenant_id} is not on lease {}",
                self.id
            )));
        }
        self.record(
            LeaseEventKind::TenantRemoved(LeaseTenantChanged {
                lease_id: self.id,
                tenant_id,
            }),
            clock,
        );
        Ok(())
    }

    /// Moves the start and/or end of the lease.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if neither date is given or the
    /// resulting end date is not after the start date.
    pub fn update_dates(
        &mut self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if start_date.is_none() && end_date.is_none() {
            return Err(DomainError::Validation(
                "date update needs a start or an end date".into(),
            ));
        }
        let start = start_date.or(self.start_date);
        let end = end_date.or(self.end_date);
        if let (Some(start), Some(end)) = (start, end) {
            require_date_range(start, end)?;
        }
        self.record(
            LeaseEventKind::DatesUpdated(LeaseDatesUpdated {
                lease_id: self.id,
                start_date,
                end_date,
            }),
            clock,
        );
        Ok(())
    }

    fn record(&mut self, kind: LeaseEventKind, clock: &dyn Clock) {
        let event = LeaseEvent {
            metadata: EventMetadata::next(self.id, self.version, self.modified_at, clock),
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for Lease {
    type Event = LeaseEvent;

    const TYPE_NAME: &'static str = "rentals.Lease";

    fn blank(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            unit_id: Uuid::nil(),
            tenant_ids: Vec::new(),
            start_date: None,
            end_date: None,
            generated_at: None,
            signed_at: None,
            signed_by_tenant: false,
            modified_at: None,
            uncommitted_events: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            LeaseEventKind::Created(created) => {
                self.unit_id = created.unit_id;
                self.tenant_ids.clone_from(&created.tenant_ids);
                self.start_date = Some(created.start_date);
                self.end_date = Some(created.end_date);
                self.generated_at = Some(event.metadata.timestamp);
            }
            LeaseEventKind::SignedByTenant(_) => {
                self.signed_by_tenant = true;
                self.signed_at = Some(event.metadata.timestamp);
            }
            LeaseEventKind::TenantAdded(change) => {
                if !self.tenant_ids.contains(&change.tenant_id) {
                    self.tenant_ids.push(change.tenant_id);
                }
            }
            LeaseEventKind::TenantRemoved(change) => {
                self.tenant_ids.retain(|id| *id != change.tenant_id);
            }
            LeaseEventKind::DatesUpdated(updated) => {
                if let Some(start) = updated.start_date {
                    self.start_date = Some(start);
                }
                if let Some(end) = updated.end_date {
                    self.end_date = Some(end);
                }
            }
        }
        self.version = event.metadata.originator_version;
        self.modified_at = Some(event.metadata.timestamp);
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
