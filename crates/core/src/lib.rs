//! `stockroom-core`: domain foundation building blocks.
//!
//! Pure domain primitives only. Storage, transport and auth live elsewhere.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use value_object::{Email, ValueObject, optional_non_blank, require_non_blank};
