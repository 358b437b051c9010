//! Event mechanics: the `Event` contract, stream envelopes and pub/sub.
//!
//! Nothing here knows about products, suppliers or users.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
