use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, UserId, optional_non_blank,
    require_non_blank,
};
use stockroom_events::Event;

use crate::movement::{MovementType, Quantity, apply_movement};
use crate::stats::StockLevels;
use crate::status::StockStatus;

/// Reason recorded on the movement that carries a product's opening stock.
pub const OPENING_BALANCE_REASON: &str = "opening balance";

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Aggregate root: Product.
///
/// The balance is owned by the ledger: `stock` only ever changes through
/// `StockMoved`, and is never negative after an applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    description: String,
    category: String,
    price: u64,
    cost: u64,
    sku: String,
    stock: i64,
    min_stock: i64,
    max_stock: i64,
    supplier_id: Option<AggregateId>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            category: String::new(),
            price: 0,
            cost: 0,
            sku: String::new(),
            stock: 0,
            min_stock: 0,
            max_stock: 0,
            supplier_id: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }

    pub fn max_stock(&self) -> i64 {
        self.max_stock
    }

    pub fn supplier_id(&self) -> Option<AggregateId> {
        self.supplier_id
    }

    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn status(&self) -> StockStatus {
        StockStatus::derive(self.stock, self.min_stock, self.max_stock)
    }
}

impl StockLevels for Product {
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

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct. `stock` is the opening balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
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
    pub occurred_at: DateTime<Utc>,
}

/// Descriptive fields an update may touch. The balance is not among them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<u64>,
    pub cost: Option<u64>,
    pub sku: Option<String>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub supplier_id: Option<AggregateId>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Command: UpdateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub patch: ProductPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    Update(UpdateProduct),
    RecordMovement(RecordMovement),
    Delete(DeleteProduct),
}

/// Event: ProductCreated. Always opens with a zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: u64,
    pub cost: u64,
    pub sku: String,
    pub min_stock: i64,
    pub max_stock: i64,
    pub supplier_id: Option<AggregateId>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated. Carries the full descriptive state after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: u64,
    pub cost: u64,
    pub sku: String,
    pub min_stock: i64,
    pub max_stock: i64,
    pub supplier_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: Quantity,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted (tombstone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub sku: String,
    pub supplier_id: Option<AggregateId>,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    Updated(ProductUpdated),
    StockMoved(StockMoved),
    Deleted(ProductDeleted),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "inventory.product.created",
            ProductEvent::Updated(_) => "inventory.product.updated",
            ProductEvent::StockMoved(_) => "inventory.product.stock_moved",
            ProductEvent::Deleted(_) => "inventory.product.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::Updated(e) => e.occurred_at,
            ProductEvent::StockMoved(e) => e.occurred_at,
            ProductEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category.clone();
                self.price = e.price;
                self.cost = e.cost;
                self.sku = e.sku.clone();
                self.stock = 0;
                self.min_stock = e.min_stock;
                self.max_stock = e.max_stock;
                self.supplier_id = e.supplier_id;
                self.created = true;
            }
            ProductEvent::Updated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category.clone();
                self.price = e.price;
                self.cost = e.cost;
                self.sku = e.sku.clone();
                self.min_stock = e.min_stock;
                self.max_stock = e.max_stock;
                self.supplier_id = e.supplier_id;
            }
            ProductEvent::StockMoved(e) => {
                self.stock = e.stock_after;
            }
            ProductEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::Update(cmd) => self.handle_update(cmd),
            ProductCommand::RecordMovement(cmd) => self.handle_movement(cmd),
            ProductCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn validate_thresholds(min_stock: i64, max_stock: i64) -> Result<(), DomainError> {
    if min_stock < 0 {
        return Err(DomainError::validation("minStock cannot be negative"));
    }
    if min_stock > max_stock {
        return Err(DomainError::validation(format!(
            "minStock ({min_stock}) cannot exceed maxStock ({max_stock})"
        )));
    }
    Ok(())
}

fn trimmed_note(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Product {
    fn ensure_live(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }

        let name = require_non_blank("name", &cmd.name)?;
        let description = require_non_blank("description", &cmd.description)?;
        let category = require_non_blank("category", &cmd.category)?;
        let sku = require_non_blank("sku", &cmd.sku)?;
        validate_thresholds(cmd.min_stock, cmd.max_stock)?;
        if cmd.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }

        let mut events = vec![ProductEvent::Created(ProductCreated {
            product_id: cmd.product_id,
            name,
            description,
            category,
            price: cmd.price,
            cost: cmd.cost,
            sku,
            min_stock: cmd.min_stock,
            max_stock: cmd.max_stock,
            supplier_id: cmd.supplier_id,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })];

        // The opening balance goes through the ledger like any other receipt.
        if cmd.stock > 0 {
            events.push(ProductEvent::StockMoved(StockMoved {
                product_id: cmd.product_id,
                movement_type: MovementType::In,
                quantity: Quantity::new(cmd.stock)?,
                stock_before: 0,
                stock_after: cmd.stock,
                reason: Some(OPENING_BALANCE_REASON.to_string()),
                notes: None,
                recorded_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live(cmd.product_id)?;

        let patch = &cmd.patch;
        if patch.is_empty() {
            return Err(DomainError::validation("nothing to update"));
        }

        let min_stock = patch.min_stock.unwrap_or(self.min_stock);
        let max_stock = patch.max_stock.unwrap_or(self.max_stock);
        validate_thresholds(min_stock, max_stock)?;

        Ok(vec![ProductEvent::Updated(ProductUpdated {
            product_id: cmd.product_id,
            name: optional_non_blank("name", patch.name.as_ref())?.unwrap_or_else(|| self.name.clone()),
            description: optional_non_blank("description", patch.description.as_ref())?
                .unwrap_or_else(|| self.description.clone()),
            category: optional_non_blank("category", patch.category.as_ref())?
                .unwrap_or_else(|| self.category.clone()),
            price: patch.price.unwrap_or(self.price),
            cost: patch.cost.unwrap_or(self.cost),
            sku: optional_non_blank("sku", patch.sku.as_ref())?.unwrap_or_else(|| self.sku.clone()),
            min_stock,
            max_stock,
            supplier_id: patch.supplier_id.or(self.supplier_id),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_movement(&self, cmd: &RecordMovement) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live(cmd.product_id)?;

        let stock_after = apply_movement(self.stock, cmd.movement_type, cmd.quantity)?;

        Ok(vec![ProductEvent::StockMoved(StockMoved {
            product_id: cmd.product_id,
            movement_type: cmd.movement_type,
            quantity: cmd.quantity,
            stock_before: self.stock,
            stock_after,
            reason: trimmed_note(cmd.reason.as_ref()),
            notes: trimmed_note(cmd.notes.as_ref()),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live(cmd.product_id)?;

        Ok(vec![ProductEvent::Deleted(ProductDeleted {
            product_id: cmd.product_id,
            sku: self.sku.clone(),
            supplier_id: self.supplier_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
