//! Restock alerts.
//!
//! Watches product envelopes on the bus, derives each product's stock status
//! from its ledger and records a `StockAlert` whenever the status changes.
//! Eventually consistent: the alert log trails the ledger by one bus hop.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use stockroom_events::{EventBus, EventEnvelope};
use stockroom_inventory::{Product, ProductId, StockStatus};

use super::event_worker::{EventWorker, WorkerHandle};
use crate::aggregate_types;
use crate::command_dispatcher::{DispatchError, load_aggregate};
use crate::event_store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub from: StockStatus,
    pub to: StockStatus,
    pub stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub at: DateTime<Utc>,
}

/// Bounded, newest-last log of alerts.
#[derive(Debug)]
pub struct AlertLog {
    capacity: usize,
    entries: RwLock<VecDeque<StockAlert>>,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn record(&self, alert: StockAlert) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(alert);
        }
    }

    /// Up to `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<StockAlert> {
        self.entries
            .read()
            .map(|e| e.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

/// Status-transition detector. Products start out as "In Stock".
#[derive(Debug)]
pub struct StockAlertMonitor<S> {
    store: S,
    log: Arc<AlertLog>,
    last_status: HashMap<ProductId, StockStatus>,
}

impl<S> StockAlertMonitor<S>
where
    S: EventStore,
{
    pub fn new(store: S, log: Arc<AlertLog>) -> Self {
        Self {
            store,
            log,
            last_status: HashMap::new(),
        }
    }

    /// Inspect one envelope; returns the alert it produced, if any.
    pub fn observe(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<Option<StockAlert>, DispatchError> {
        if envelope.aggregate_type() != aggregate_types::PRODUCT {
            return Ok(None);
        }

        let product_id = ProductId::new(envelope.aggregate_id());
        let product = load_aggregate(&self.store, product_id.0, |aid| Product::empty(ProductId::new(aid)))?;

        if !product.is_live() {
            self.last_status.remove(&product_id);
            return Ok(None);
        }

        let to = product.status();
        let from = self
            .last_status
            .insert(product_id, to)
            .unwrap_or(StockStatus::InStock);
        if from == to {
            return Ok(None);
        }

        let alert = StockAlert {
            product_id,
            sku: product.sku().to_string(),
            name: product.name().to_string(),
            from,
            to,
            stock: product.stock(),
            min_stock: product.min_stock(),
            max_stock: product.max_stock(),
            at: envelope.occurred_at(),
        };

        match to {
            StockStatus::LowStock => warn!(
                product_id = %product_id,
                sku = %alert.sku,
                stock = alert.stock,
                min_stock = alert.min_stock,
                "product needs restocking"
            ),
            StockStatus::OverStock => warn!(
                product_id = %product_id,
                sku = %alert.sku,
                stock = alert.stock,
                max_stock = alert.max_stock,
                "product is overstocked"
            ),
            StockStatus::InStock => info!(
                product_id = %product_id,
                sku = %alert.sku,
                stock = alert.stock,
                from = %from,
                "product stock back within thresholds"
            ),
        }

        self.log.record(alert.clone());
        Ok(Some(alert))
    }
}

/// Run a `StockAlertMonitor` on its own thread, fed by `bus`.
pub fn spawn_stock_alert_worker<S, B>(bus: &B, store: S, log: Arc<AlertLog>) -> io::Result<WorkerHandle>
where
    S: EventStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + ?Sized,
{
    let mut monitor = StockAlertMonitor::new(store, log);
    EventWorker::spawn("stock-alerts", bus, move |envelope: EventEnvelope<JsonValue>| {
        monitor.observe(&envelope).map(|_| ())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use stockroom_core::AggregateId;
    use stockroom_events::InMemoryEventBus;
    use stockroom_inventory::{CreateProduct, MovementType, ProductCommand, Quantity, RecordMovement};

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn run(d: &Dispatcher, id: ProductId, cmd: ProductCommand) -> Vec<EventEnvelope<JsonValue>> {
        d.dispatch(id.0, aggregate_types::PRODUCT, cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect()
    }

    fn create(d: &Dispatcher, stock: i64) -> (ProductId, Vec<EventEnvelope<JsonValue>>) {
        let id = ProductId::new(AggregateId::new());
        let envs = run(
            d,
            id,
            ProductCommand::Create(CreateProduct {
                product_id: id,
                name: "Paper".to_string(),
                description: "A4 ream".to_string(),
                category: "Office".to_string(),
                price: 500,
                cost: 250,
                sku: "PPR-A4".to_string(),
                stock,
                min_stock: 10,
                max_stock: 100,
                supplier_id: None,
                created_by: None,
                occurred_at: Utc::now(),
            }),
        );
        (id, envs)
    }

    fn movement(id: ProductId, movement_type: MovementType, qty: i64) -> ProductCommand {
        ProductCommand::RecordMovement(RecordMovement {
            product_id: id,
            movement_type,
            quantity: Quantity::new(qty).unwrap(),
            reason: None,
            notes: None,
            recorded_by: None,
            occurred_at: Utc::now(),
        })
    }

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    #[test]
    fn transitions_are_recorded_once() {
        let d = dispatcher();
        let log = Arc::new(AlertLog::new(10));
        let mut monitor = StockAlertMonitor::new(Arc::clone(d.store()), Arc::clone(&log));

        let (id, envs) = create(&d, 20);
        for env in &envs {
            assert!(monitor.observe(env).unwrap().is_none());
        }

        let envs = run(&d, id, movement(id, MovementType::Out, 15));
        let alert = monitor.observe(&envs[0]).unwrap().unwrap();
        assert_eq!((alert.from, alert.to), (StockStatus::InStock, StockStatus::LowStock));
        assert_eq!(alert.stock, 5);

        // Still low: no new alert.
        let envs = run(&d, id, movement(id, MovementType::Out, 1));
        assert!(monitor.observe(&envs[0]).unwrap().is_none());

        let envs = run(&d, id, movement(id, MovementType::In, 30));
        let alert = monitor.observe(&envs[0]).unwrap().unwrap();
        assert_eq!(alert.to, StockStatus::InStock);
        assert_eq!(log.len(), 2);
        assert_eq!(log.recent(1)[0].to, StockStatus::InStock);
    }

    #[test]
    fn log_is_bounded() {
        let log = AlertLog::new(2);
        let alert = |stock| StockAlert {
            product_id: ProductId::new(AggregateId::new()),
            sku: "S".to_string(),
            name: "N".to_string(),
            from: StockStatus::InStock,
            to: StockStatus::LowStock,
            stock,
            min_stock: 5,
            max_stock: 10,
            at: Utc::now(),
        };
        for stock in 0..3 {
            log.record(alert(stock));
        }
        let recent: Vec<i64> = log.recent(10).iter().map(|a| a.stock).collect();
        assert_eq!(recent, vec![2, 1]);
    }

    #[test]
    fn worker_picks_up_published_events() {
        let d = dispatcher();
        let log = Arc::new(AlertLog::new(10));
        let handle = spawn_stock_alert_worker(d.bus().as_ref(), Arc::clone(d.store()), Arc::clone(&log)).unwrap();

        // Opening stock below the minimum.
        create(&d, 3);

        for _ in 0..40 {
            if !log.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }
        handle.shutdown();

        assert_eq!(log.recent(1)[0].to, StockStatus::LowStock);
    }
}
