use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::{AggregateId, UserId};
use stockroom_events::EventEnvelope;
use stockroom_inventory::{ProductEvent, ProductId, StockLevels, StockStatus};

use super::{Projection, ProjectionError, StreamCursors, decode_payload};
use crate::aggregate_types;
use crate::read_model::ReadStore;

/// Current state of one live product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReadModel {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: u64,
    pub cost: u64,
    pub sku: String,
    pub stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub supplier_id: Option<AggregateId>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stream revision this row reflects.
    pub version: u64,
}

impl ProductReadModel {
    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.stock, self.min_stock, self.max_stock)
    }
}

impl StockLevels for ProductReadModel {
    fn stock(&self) -> i64 {
        self.stock
    }

    fn min_stock(&self) -> i64 {
        self.min_stock
    }

    fn max_stock(&self) -> i64 {
        self.max_stock
    }
}

/// Product catalog: one row per live product. Deleted products are removed.
#[derive(Debug)]
pub struct ProductCatalogProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductCatalogProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    /// Every live product, newest first.
    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows
    }

    /// Live products supplied by `supplier_id`.
    pub fn by_supplier(&self, supplier_id: AggregateId) -> Vec<ProductReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|p| p.supplier_id == Some(supplier_id))
            .collect()
    }

    fn apply_event(&self, event: ProductEvent, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let seq = envelope.sequence_number();
        match event {
            ProductEvent::Created(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        id: e.product_id,
                        name: e.name,
                        description: e.description,
                        category: e.category,
                        price: e.price,
                        cost: e.cost,
                        sku: e.sku,
                        stock: 0,
                        min_stock: e.min_stock,
                        max_stock: e.max_stock,
                        supplier_id: e.supplier_id,
                        created_by: e.created_by,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        version: seq,
                    },
                );
            }
            ProductEvent::Updated(e) => {
                let mut row = self.existing(&e.product_id)?;
                row.name = e.name;
                row.description = e.description;
                row.category = e.category;
                row.price = e.price;
                row.cost = e.cost;
                row.sku = e.sku;
                row.min_stock = e.min_stock;
                row.max_stock = e.max_stock;
                row.supplier_id = e.supplier_id;
                row.updated_at = e.occurred_at;
                row.version = seq;
                self.store.upsert(e.product_id, row);
            }
            ProductEvent::StockMoved(e) => {
                let mut row = self.existing(&e.product_id)?;
                row.stock = e.stock_after;
                row.updated_at = e.occurred_at;
                row.version = seq;
                self.store.upsert(e.product_id, row);
            }
            ProductEvent::Deleted(e) => {
                self.store.remove(&e.product_id);
            }
        }
        Ok(())
    }

    fn existing(&self, product_id: &ProductId) -> Result<ProductReadModel, ProjectionError> {
        self.store.get(product_id).ok_or_else(|| {
            ProjectionError::StreamMismatch(format!("product {product_id} has no catalog row"))
        })
    }
}

impl<S> Projection for ProductCatalogProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    fn name(&self) -> &'static str {
        "product_catalog"
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
        self.cursors.reset(|| self.store.clear());
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

pub(crate) fn product_of(event: &ProductEvent) -> ProductId {
    match event {
        ProductEvent::Created(e) => e.product_id,
        ProductEvent::Updated(e) => e.product_id,
        ProductEvent::StockMoved(e) => e.product_id,
        ProductEvent::Deleted(e) => e.product_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stockroom_events::InMemoryEventBus;
    use stockroom_inventory::{
        CreateProduct, DeleteProduct, MovementType, Product, ProductCommand, Quantity, RecordMovement,
    };

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::read_model::InMemoryReadStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn setup() -> (Dispatcher, ProductCatalogProjection<InMemoryReadStore<ProductId, ProductReadModel>>) {
        (
            CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new())),
            ProductCatalogProjection::new(InMemoryReadStore::new()),
        )
    }

    fn run(d: &Dispatcher, id: ProductId, cmd: ProductCommand) {
        d.dispatch(id.0, aggregate_types::PRODUCT, cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap();
    }

    fn create(d: &Dispatcher, stock: i64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        run(
            d,
            id,
            ProductCommand::Create(CreateProduct {
                product_id: id,
                name: "Lamp".to_string(),
                description: "Desk lamp".to_string(),
                category: "Lighting".to_string(),
                price: 2500,
                cost: 1200,
                sku: "LMP-1".to_string(),
                stock,
                min_stock: 5,
                max_stock: 40,
                supplier_id: None,
                created_by: None,
                occurred_at: Utc::now(),
            }),
        );
        id
    }

    fn receive(d: &Dispatcher, id: ProductId, qty: i64) {
        run(
            d,
            id,
            ProductCommand::RecordMovement(RecordMovement {
                product_id: id,
                movement_type: MovementType::In,
                quantity: Quantity::new(qty).unwrap(),
                reason: None,
                notes: None,
                recorded_by: None,
                occurred_at: Utc::now(),
            }),
        );
    }

    #[test]
    fn catch_up_reflects_the_ledger_balance() {
        let (d, projection) = setup();
        let id = create(&d, 3);
        receive(&d, id, 4);

        assert_eq!(projection.catch_up(d.store(), id.0).unwrap(), 3);
        let row = projection.get(&id).unwrap();
        assert_eq!(row.stock, 7);
        assert_eq!(row.version, 3);
        assert_eq!(row.status(), StockStatus::InStock);

        // Nothing new: no-op.
        assert_eq!(projection.catch_up(d.store(), id.0).unwrap(), 0);
    }

    #[test]
    fn redelivered_envelopes_are_ignored() {
        let (d, projection) = setup();
        let id = create(&d, 2);
        let events = d.store().load_stream(id.0).unwrap();

        for e in events.iter().chain(events.iter()) {
            projection.apply_envelope(&e.to_envelope()).unwrap();
        }
        assert_eq!(projection.get(&id).unwrap().stock, 2);
    }

    #[test]
    fn out_of_order_envelope_is_a_gap() {
        let (d, projection) = setup();
        let id = create(&d, 2);
        let events = d.store().load_stream(id.0).unwrap();

        let err = projection.apply_envelope(&events[1].to_envelope()).unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 0, found: 2 }));
    }

    #[test]
    fn deleted_products_leave_the_catalog() {
        let (d, projection) = setup();
        let id = create(&d, 0);
        run(
            &d,
            id,
            ProductCommand::Delete(DeleteProduct {
                product_id: id,
                deleted_by: None,
                occurred_at: Utc::now(),
            }),
        );

        projection.catch_up(d.store(), id.0).unwrap();
        assert!(projection.get(&id).is_none());
        assert!(projection.is_empty());
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let (d, projection) = setup();
        let a = create(&d, 10);
        let b = create(&d, 0);
        receive(&d, b, 50);
        projection.catch_up(d.store(), a.0).unwrap();
        projection.catch_up(d.store(), b.0).unwrap();
        let before = projection.list();

        let envelopes = d.store().load_all().unwrap().iter().map(|e| e.to_envelope()).collect::<Vec<_>>();
        assert_eq!(projection.rebuild_from_scratch(envelopes).unwrap(), 2);
        assert_eq!(projection.list(), before);
        assert_eq!(projection.get(&b).unwrap().status(), StockStatus::OverStock);
    }
}
