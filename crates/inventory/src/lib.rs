//! Inventory domain module (event-sourced).
//!
//! The product ledger, the stock adjustment rule, derived stock status and
//! inventory statistics. Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod movement;
pub mod product;
pub mod stats;
pub mod status;

pub use movement::{MovementType, Quantity, apply_movement};
pub use product::{
    CreateProduct, DeleteProduct, OPENING_BALANCE_REASON, Product, ProductCommand, ProductCreated,
    ProductDeleted, ProductEvent, ProductId, ProductPatch, ProductUpdated, RecordMovement,
    StockMoved, UpdateProduct,
};
pub use stats::{StockLevels, StockStats, compute_stats};
pub use status::StockStatus;
