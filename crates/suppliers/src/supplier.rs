use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Email, optional_non_blank, require_non_blank,
};
use stockroom_events::Event;

/// Supplier identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SupplierId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SupplierStatus {
    #[default]
    Active,
    Inactive,
}

impl SupplierStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SupplierStatus::Active => "active",
            SupplierStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown supplier status '{0}' (expected 'active' or 'inactive')")]
pub struct UnknownSupplierStatus(pub String);

impl FromStr for SupplierStatus {
    type Err = UnknownSupplierStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SupplierStatus::Active),
            "inactive" => Ok(SupplierStatus::Inactive),
            _ => Err(UnknownSupplierStatus(s.to_string())),
        }
    }
}

/// Contact and address details. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SupplierDetails {
    pub name: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
}

impl SupplierDetails {
    /// Trim every field, normalize the email, and reject blanks.
    pub fn validated(&self) -> Result<Self, DomainError> {
        Ok(Self {
            name: require_non_blank("name", &self.name)?,
            contact: require_non_blank("contact", &self.contact)?,
            email: Email::parse(&self.email)?.into_inner(),
            phone: validate_phone(&self.phone)?,
            address: require_non_blank("address", &self.address)?,
            city: require_non_blank("city", &self.city)?,
            country: require_non_blank("country", &self.country)?,
        })
    }
}

/// Partial update. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SupplierPatch {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub status: Option<SupplierStatus>,
}

impl SupplierPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_phone(raw: &str) -> Result<String, DomainError> {
    let phone = require_non_blank("phone", raw)?;
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
    if !allowed || digits < 5 {
        return Err(DomainError::validation(format!("'{phone}' is not a valid phone number")));
    }
    Ok(phone)
}

/// Aggregate root: Supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    id: SupplierId,
    details: SupplierDetails,
    status: SupplierStatus,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Supplier {
    /// Empty, not-yet-registered instance for rehydration.
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            details: SupplierDetails::default(),
            status: SupplierStatus::Active,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn details(&self) -> &SupplierDetails {
        &self.details
    }

    pub fn status(&self) -> SupplierStatus {
        self.status
    }

    /// Registered and not deleted.
    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    pub supplier_id: SupplierId,
    pub details: SupplierDetails,
    pub status: Option<SupplierStatus>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSupplier {
    pub supplier_id: SupplierId,
    pub patch: SupplierPatch,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSupplier {
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierCommand {
    Register(RegisterSupplier),
    Update(UpdateSupplier),
    Delete(DeleteSupplier),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRegistered {
    pub supplier_id: SupplierId,
    pub details: SupplierDetails,
    pub status: SupplierStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the complete post-update state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierUpdated {
    pub supplier_id: SupplierId,
    pub details: SupplierDetails,
    pub status: SupplierStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDeleted {
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierEvent {
    Registered(SupplierRegistered),
    Updated(SupplierUpdated),
    Deleted(SupplierDeleted),
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::Registered(_) => "suppliers.supplier.registered",
            SupplierEvent::Updated(_) => "suppliers.supplier.updated",
            SupplierEvent::Deleted(_) => "suppliers.supplier.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::Registered(e) => e.occurred_at,
            SupplierEvent::Updated(e) => e.occurred_at,
            SupplierEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::Registered(e) => {
                self.id = e.supplier_id;
                self.details = e.details.clone();
                self.status = e.status;
                self.created = true;
            }
            SupplierEvent::Updated(e) => {
                self.details = e.details.clone();
                self.status = e.status;
            }
            SupplierEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::Register(cmd) => self.handle_register(cmd),
            SupplierCommand::Update(cmd) => self.handle_update(cmd),
            SupplierCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Supplier {
    fn ensure_live(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found());
        }
        if self.id != supplier_id {
            return Err(DomainError::invariant("supplier_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("supplier already exists"));
        }

        Ok(vec![SupplierEvent::Registered(SupplierRegistered {
            supplier_id: cmd.supplier_id,
            details: cmd.details.validated()?,
            status: cmd.status.unwrap_or_default(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_live(cmd.supplier_id)?;

        let patch = &cmd.patch;
        if patch.is_empty() {
            return Err(DomainError::validation("nothing to update"));
        }

        let current = &self.details;
        let next = SupplierDetails {
            name: optional_non_blank("name", patch.name.as_ref())?.unwrap_or_else(|| current.name.clone()),
            contact: optional_non_blank("contact", patch.contact.as_ref())?
                .unwrap_or_else(|| current.contact.clone()),
            email: match &patch.email {
                Some(raw) => Email::parse(raw)?.into_inner(),
                None => current.email.clone(),
            },
            phone: match &patch.phone {
                Some(raw) => validate_phone(raw)?,
                None => current.phone.clone(),
            },
            address: optional_non_blank("address", patch.address.as_ref())?
                .unwrap_or_else(|| current.address.clone()),
            city: optional_non_blank("city", patch.city.as_ref())?.unwrap_or_else(|| current.city.clone()),
            country: optional_non_blank("country", patch.country.as_ref())?
                .unwrap_or_else(|| current.country.clone()),
        };
        let status = patch.status.unwrap_or(self.status);

        if next == self.details && status == self.status {
            return Ok(vec![]);
        }

        Ok(vec![SupplierEvent::Updated(SupplierUpdated {
            supplier_id: cmd.supplier_id,
            details: next,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        self.ensure_live(cmd.supplier_id)?;

        Ok(vec![SupplierEvent::Deleted(SupplierDeleted {
            supplier_id: cmd.supplier_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
