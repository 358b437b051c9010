//! Infrastructure layer: event store, command dispatch, projections,
//! cross-aggregate constraints, background workers and configuration.

pub mod command_dispatcher;
pub mod config;
pub mod constraints;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;

/// Stream type names recorded with every stored event.
pub mod aggregate_types {
    pub const PRODUCT: &str = "inventory.product";
    pub const SUPPLIER: &str = "suppliers.supplier";
    pub const USER: &str = "auth.user";
}
