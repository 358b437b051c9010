use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_core::{AggregateId, UserId};
use stockroom_events::EventEnvelope;
use stockroom_inventory::{MovementType, ProductEvent, ProductId};

use super::products::product_of;
use super::{Projection, ProjectionError, StreamCursors, decode_payload};
use crate::aggregate_types;
use crate::read_model::ReadStore;

/// One stock movement, as shown in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReadModel {
    /// Id of the `StockMoved` event.
    pub id: Uuid,
    pub product_id: ProductId,
    /// Product name and SKU at the time of the movement.
    pub product_name: String,
    pub sku: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub sequence_number: u64,
}

/// Append-only movement log. Entries survive product deletion.
#[derive(Debug)]
pub struct MovementLogProjection<S>
where
    S: ReadStore<Uuid, MovementReadModel>,
{
    store: S,
    cursors: StreamCursors,
    labels: RwLock<HashMap<ProductId, (String, String)>>,
}

impl<S> MovementLogProjection<S>
where
    S: ReadStore<Uuid, MovementReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
            labels: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, movement_id: &Uuid) -> Option<MovementReadModel> {
        self.store.get(movement_id)
    }

    /// All movements, newest first.
    pub fn list(&self) -> Vec<MovementReadModel> {
        newest_first(self.store.list())
    }

    /// Movements of one product, newest first.
    pub fn for_product(&self, product_id: ProductId) -> Vec<MovementReadModel> {
        newest_first(
            self.store
                .list()
                .into_iter()
                .filter(|m| m.product_id == product_id)
                .collect(),
        )
    }

    fn set_label(&self, product_id: ProductId, name: String, sku: String) -> Result<(), ProjectionError> {
        self.labels
            .write()
            .map_err(|_| ProjectionError::Unavailable("label lock poisoned".to_string()))?
            .insert(product_id, (name, sku));
        Ok(())
    }

    fn label(&self, product_id: ProductId) -> (String, String) {
        self.labels
            .read()
            .ok()
            .and_then(|l| l.get(&product_id).cloned())
            .unwrap_or_default()
    }

    fn apply_event(&self, event: ProductEvent, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match event {
            ProductEvent::Created(e) => self.set_label(e.product_id, e.name, e.sku),
            ProductEvent::Updated(e) => self.set_label(e.product_id, e.name, e.sku),
            ProductEvent::StockMoved(e) => {
                let (product_name, sku) = self.label(e.product_id);
                self.store.upsert(
                    envelope.event_id(),
                    MovementReadModel {
                        id: envelope.event_id(),
                        product_id: e.product_id,
                        product_name,
                        sku,
                        movement_type: e.movement_type,
                        quantity: e.quantity.get(),
                        stock_before: e.stock_before,
                        stock_after: e.stock_after,
                        reason: e.reason,
                        notes: e.notes,
                        recorded_by: e.recorded_by,
                        occurred_at: e.occurred_at,
                        sequence_number: envelope.sequence_number(),
                    },
                );
                Ok(())
            }
            // History is kept.
            ProductEvent::Deleted(_) => Ok(()),
        }
    }
}

fn newest_first(mut rows: Vec<MovementReadModel>) -> Vec<MovementReadModel> {
    rows.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.product_id.cmp(&a.product_id))
            .then_with(|| b.sequence_number.cmp(&a.sequence_number))
    });
    rows
}

impl<S> Projection for MovementLogProjection<S>
where
    S: ReadStore<Uuid, MovementReadModel>,
{
    fn name(&self) -> &'static str {
        "movement_log"
    }

    fn aggregate_type(&self) -> &'static str {
        aggregate_types::PRODUCT
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type() {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event = decode_payload(envelope, |e: &ProductEvent| product_of(e).0)?;
                self.apply_event(event, envelope)
            })
            .map(|_| ())
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.cursors.position(aggregate_id)
    }

    fn reset(&self) {
        self.cursors.reset(|| {
            self.store.clear();
            if let Ok(mut labels) = self.labels.write() {
                labels.clear();
            }
        });
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
