//! Infrastructure wiring behind the router.
//!
//! One in-memory ledger, one bus, four projections and the constraint
//! indexes. Every command goes through `dispatch_*`, which retries on
//! concurrent appends and then brings the affected projections up to date
//! from the ledger, so a handler can read back what it just wrote.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockroom_auth::{Hs256Jwt, User, UserCommand};
use stockroom_core::{AggregateId, UserId};
use stockroom_events::{EventEnvelope, InMemoryEventBus};
use stockroom_infra::aggregate_types;
use stockroom_infra::command_dispatcher::CommandDispatcher;
use stockroom_infra::config::AppConfig;
use stockroom_infra::constraints::{ReferenceIndex, UniqueIndex};
use stockroom_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use stockroom_infra::projections::{
    MovementLogProjection, MovementReadModel, ProductCatalogProjection, ProductReadModel, Projection,
    ProjectionError, SupplierDirectoryProjection, SupplierReadModel, UserDirectoryProjection, UserReadModel,
};
use stockroom_infra::read_model::InMemoryReadStore;
use stockroom_infra::workers::{AlertLog, WorkerHandle, spawn_stock_alert_worker};
use stockroom_inventory::{Product, ProductCommand, ProductId};
use stockroom_suppliers::{Supplier, SupplierCommand, SupplierId};

use crate::app::errors::ApiError;

pub type SharedStore = Arc<InMemoryEventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, SharedBus>;

pub type ProductCatalog = ProductCatalogProjection<InMemoryReadStore<ProductId, ProductReadModel>>;
pub type MovementLog = MovementLogProjection<InMemoryReadStore<Uuid, MovementReadModel>>;
pub type SupplierDirectory = SupplierDirectoryProjection<InMemoryReadStore<SupplierId, SupplierReadModel>>;
pub type UserDirectory = UserDirectoryProjection<InMemoryReadStore<UserId, UserReadModel>>;

/// Record counts after a full replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub events: usize,
    pub products: usize,
    pub movements: usize,
    pub suppliers: usize,
    pub users: usize,
}

pub struct AppServices {
    pub config: AppConfig,
    pub jwt: Arc<Hs256Jwt>,
    started_at: Instant,
    dispatcher: Dispatcher,

    pub products: ProductCatalog,
    pub movements: MovementLog,
    pub suppliers: SupplierDirectory,
    pub users: UserDirectory,

    pub skus: UniqueIndex,
    pub emails: UniqueIndex,
    pub usernames: UniqueIndex,
    pub supplier_refs: ReferenceIndex,

    pub alerts: Arc<AlertLog>,
    alert_worker: Mutex<Option<WorkerHandle>>,

    /// Held shared by every write flow, exclusively by a rebuild.
    maintenance: RwLock<()>,
    /// Serializes self-registration so only one account can be the first.
    pub registration: Mutex<()>,
    /// Serializes updates that move unique keys or supplier links.
    key_edits: Mutex<()>,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices")
            .field("app_env", &self.config.app_env)
            .field("products", &self.products.len())
            .field("suppliers", &self.suppliers.len())
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}

impl AppServices {
    /// Wire everything up and start the stock alert worker.
    pub fn build(config: AppConfig) -> io::Result<Self> {
        let store: SharedStore = Arc::new(InMemoryEventStore::new());
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());

        let alerts = Arc::new(AlertLog::new(config.alert_log_capacity));
        let alert_worker = spawn_stock_alert_worker(bus.as_ref(), Arc::clone(&store), Arc::clone(&alerts))?;

        Ok(Self {
            jwt: Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes())),
            config,
            started_at: Instant::now(),
            dispatcher: CommandDispatcher::new(store, bus),
            products: ProductCatalogProjection::new(InMemoryReadStore::new()),
            movements: MovementLogProjection::new(InMemoryReadStore::new()),
            suppliers: SupplierDirectoryProjection::new(InMemoryReadStore::new()),
            users: UserDirectoryProjection::new(InMemoryReadStore::new()),
            skus: UniqueIndex::case_insensitive("sku"),
            emails: UniqueIndex::case_insensitive("email"),
            usernames: UniqueIndex::case_insensitive("username"),
            supplier_refs: ReferenceIndex::new(),
            alerts,
            alert_worker: Mutex::new(Some(alert_worker)),
            maintenance: RwLock::new(()),
            registration: Mutex::new(()),
            key_edits: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &SharedStore {
        self.dispatcher.store()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Shared guard for a write flow. Rebuilds wait until it is dropped.
    pub fn write_guard(&self) -> Result<RwLockReadGuard<'_, ()>, ApiError> {
        self.maintenance
            .read()
            .map_err(|_| ApiError::internal("maintenance lock poisoned"))
    }

    /// Exclusive guard for an update that swaps unique keys. Taken after
    /// `write_guard`, held until the keys are reconciled.
    pub fn key_edit_guard(&self) -> Result<MutexGuard<'_, ()>, ApiError> {
        self.key_edits
            .lock()
            .map_err(|_| ApiError::internal("key edit lock poisoned"))
    }

    pub fn dispatch_product(&self, product_id: ProductId, command: ProductCommand) -> Result<Vec<StoredEvent>, ApiError> {
        let committed = self
            .dispatcher
            .dispatch_with_retry(
                product_id.0,
                aggregate_types::PRODUCT,
                command,
                |aid| Product::empty(ProductId::new(aid)),
                self.config.dispatch_max_retries,
            )
            .map_err(|e| ApiError::from_dispatch(e, "Product"))?;

        refreshed(&self.products, self.products.catch_up(self.store(), product_id.0));
        refreshed(&self.movements, self.movements.catch_up(self.store(), product_id.0));
        Ok(committed)
    }

    pub fn dispatch_supplier(
        &self,
        supplier_id: SupplierId,
        command: SupplierCommand,
    ) -> Result<Vec<StoredEvent>, ApiError> {
        let committed = self
            .dispatcher
            .dispatch_with_retry(
                supplier_id.0,
                aggregate_types::SUPPLIER,
                command,
                |aid| Supplier::empty(SupplierId::new(aid)),
                self.config.dispatch_max_retries,
            )
            .map_err(|e| ApiError::from_dispatch(e, "Supplier"))?;

        refreshed(&self.suppliers, self.suppliers.catch_up(self.store(), supplier_id.0));
        Ok(committed)
    }

    pub fn dispatch_user(&self, user_id: UserId, command: UserCommand) -> Result<Vec<StoredEvent>, ApiError> {
        let aggregate_id = AggregateId::from(user_id);
        let committed = self
            .dispatcher
            .dispatch_with_retry(
                aggregate_id,
                aggregate_types::USER,
                command,
                |aid| User::empty(UserId::from(aid)),
                self.config.dispatch_max_retries,
            )
            .map_err(|e| ApiError::from_dispatch(e, "User"))?;

        refreshed(&self.users, self.users.catch_up(self.store(), aggregate_id));
        Ok(committed)
    }

    /// Replay the whole ledger into empty projections, then rebuild the
    /// constraint indexes from the fresh read models.
    pub fn rebuild(&self) -> Result<RebuildReport, ApiError> {
        let _exclusive = self
            .maintenance
            .write()
            .map_err(|_| ApiError::internal("maintenance lock poisoned"))?;

        let envelopes: Vec<EventEnvelope<JsonValue>> = self
            .store()
            .load_all()
            .map_err(|e| ApiError::internal(e.to_string()))?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect();

        let report = RebuildReport {
            events: envelopes.len(),
            products: self.products.rebuild_from_scratch(envelopes.iter().cloned())?,
            movements: self.movements.rebuild_from_scratch(envelopes.iter().cloned())?,
            suppliers: self.suppliers.rebuild_from_scratch(envelopes.iter().cloned())?,
            users: self.users.rebuild_from_scratch(envelopes)?,
        };

        self.rebuild_indexes()?;
        tracing::info!(
            events = report.events,
            products = report.products,
            suppliers = report.suppliers,
            users = report.users,
            "ledger replayed"
        );
        Ok(report)
    }

    fn rebuild_indexes(&self) -> Result<(), ApiError> {
        self.skus.clear();
        self.emails.clear();
        self.usernames.clear();
        self.supplier_refs.clear();

        for supplier in self.suppliers.list() {
            self.supplier_refs.add_parent(supplier.id.0)?;
        }
        for product in self.products.list() {
            self.skus.reserve(&product.sku, product.id.0)?;
            if let Some(supplier_id) = product.supplier_id {
                self.supplier_refs.link(supplier_id, product.id.0)?;
            }
        }
        for user in self.users.list() {
            let owner = AggregateId::from(user.id);
            self.emails.reserve(&user.email, owner)?;
            self.usernames.reserve(&user.username, owner)?;
        }
        Ok(())
    }

    /// Stop the alert worker. Safe to call more than once.
    pub fn shutdown(&self) {
        let handle = match self.alert_worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            tracing::info!(worker = handle.name(), "stopping worker");
            handle.shutdown();
        }
    }
}

/// A failed catch-up leaves the view behind the ledger but the command
/// itself is committed; the next catch-up or a rebuild closes the gap.
fn refreshed<P: Projection>(projection: &P, result: Result<usize, ProjectionError>) {
    if let Err(err) = result {
        tracing::error!(projection = projection.name(), error = %err, "projection catch-up failed");
    }
}
