//! Append-only event store boundary.
//!
//! Every aggregate owns one stream. The product streams are the stock ledger:
//! the balance is whatever replaying them says it is.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
