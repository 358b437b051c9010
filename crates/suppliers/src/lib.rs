//! Supplier domain module (event-sourced).
//!
//! Deterministic business rules only: no IO, no HTTP, no storage.

pub mod supplier;

pub use supplier::{
    DeleteSupplier, RegisterSupplier, Supplier, SupplierCommand, SupplierDeleted, SupplierDetails,
    SupplierEvent, SupplierId, SupplierPatch, SupplierRegistered, SupplierStatus, SupplierUpdated,
    UnknownSupplierStatus, UpdateSupplier,
};
