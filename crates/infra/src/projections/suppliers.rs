use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::AggregateId;
use stockroom_events::EventEnvelope;
use stockroom_suppliers::{SupplierEvent, SupplierId, SupplierStatus};

use super::{Projection, ProjectionError, StreamCursors, decode_payload};
use crate::aggregate_types;
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierReadModel {
    pub id: SupplierId,
    pub name: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub status: SupplierStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supplier directory: live suppliers only.
#[derive(Debug)]
pub struct SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, supplier_id: &SupplierId) -> Option<SupplierReadModel> {
        self.store.get(supplier_id)
    }

    /// Live suppliers, alphabetical by name.
    pub fn list(&self) -> Vec<SupplierReadModel> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }

    pub fn active_count(&self) -> usize {
        self.store
            .list()
            .iter()
            .filter(|s| s.status == SupplierStatus::Active)
            .count()
    }

    fn apply_event(&self, event: SupplierEvent) -> Result<(), ProjectionError> {
        match event {
            SupplierEvent::Registered(e) => {
                let d = e.details;
                self.store.upsert(
                    e.supplier_id,
                    SupplierReadModel {
                        id: e.supplier_id,
                        name: d.name,
                        contact: d.contact,
                        email: d.email,
                        phone: d.phone,
                        address: d.address,
                        city: d.city,
                        country: d.country,
                        status: e.status,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            SupplierEvent::Updated(e) => {
                let mut row = self.store.get(&e.supplier_id).ok_or_else(|| {
                    ProjectionError::StreamMismatch(format!("supplier {} has no directory row", e.supplier_id))
                })?;
                let d = e.details;
                row.name = d.name;
                row.contact = d.contact;
                row.email = d.email;
                row.phone = d.phone;
                row.address = d.address;
                row.city = d.city;
                row.country = d.country;
                row.status = e.status;
                row.updated_at = e.occurred_at;
                self.store.upsert(e.supplier_id, row);
            }
            SupplierEvent::Deleted(e) => {
                self.store.remove(&e.supplier_id);
            }
        }
        Ok(())
    }
}

fn supplier_of(event: &SupplierEvent) -> AggregateId {
    match event {
        SupplierEvent::Registered(e) => e.supplier_id.0,
        SupplierEvent::Updated(e) => e.supplier_id.0,
        SupplierEvent::Deleted(e) => e.supplier_id.0,
    }
}

impl<S> Projection for SupplierDirectoryProjection<S>
where
    S: ReadStore<SupplierId, SupplierReadModel>,
{
    fn name(&self) -> &'static str {
        "supplier_directory"
    }

    fn aggregate_type(&self) -> &'static str {
        aggregate_types::SUPPLIER
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type() {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                self.apply_event(decode_payload(envelope, supplier_of)?)
            })
            .map(|_| ())
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.cursors.position(aggregate_id)
    }

    fn reset(&self) {
        self.cursors.reset(|| self.store.clear());
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
