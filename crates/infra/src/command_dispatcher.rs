//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream from the store
//!   ↓
//! 2. Check the stream is well ordered, then rehydrate (apply history)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Step 4 makes every decision a compare-and-swap on the stream: if anything
//! was appended between load and append, the append fails with `Concurrency`
//! and nothing is written. `dispatch_with_retry` re-runs the whole cycle in
//! that case, so the decision is always made against the latest state. Two
//! racing stock-outs can therefore never both pass the balance check.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockroom_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use stockroom_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (the stream moved between load and append).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// The command contradicts current state (duplicate create and the like). Not retried.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// A historical payload did not decode into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; the events are stored).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::Corrupt(msg) => DispatchError::Deserialize(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => DispatchError::InsufficientStock {
                available,
                requested,
            },
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

impl DispatchError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests and the server run the same
/// pipeline over in-memory implementations.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one load, decide, append, publish cycle.
    ///
    /// Returns the committed events (empty when the command was a no-op).
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(e.to_string()))?;
        }

        Ok(committed)
    }

    /// `dispatch`, re-run from a fresh load on `Concurrency` up to `max_retries` times.
    ///
    /// Every other error, domain conflicts included, is returned immediately.
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
        max_retries: u32,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockroom_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            match self.dispatch(aggregate_id, aggregate_type, command.clone(), &make_aggregate) {
                Err(err) if err.is_concurrency() && attempt < max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        aggregate_type,
                        attempt,
                        "concurrent append, retrying command"
                    );
                }
                Err(err) if err.is_concurrency() => {
                    tracing::warn!(
                        aggregate_id = %aggregate_id,
                        aggregate_type,
                        retries = max_retries,
                        "giving up after repeated concurrent appends"
                    );
                    return Err(err);
                }
                other => return other,
            }
        }
    }

    /// Rehydrate an aggregate from its stream without dispatching anything.
    pub fn load<A>(&self, aggregate_id: AggregateId, make_aggregate: impl FnOnce(AggregateId) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load_aggregate(&self.store, aggregate_id, make_aggregate)
    }
}

/// Load and rehydrate an aggregate straight from a store.
pub fn load_aggregate<S, A>(
    store: &S,
    aggregate_id: AggregateId,
    make_aggregate: impl FnOnce(AggregateId) -> A,
) -> Result<A, DispatchError>
where
    S: EventStore + ?Sized,
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(aggregate_id)?;
    validate_loaded_stream(aggregate_id, &history)?;
    let mut aggregate = make_aggregate(aggregate_id);
    apply_history(&mut aggregate, &history)?;
    Ok(aggregate)
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = stored.decode()?;
        aggregate.apply(&ev);
    }
    Ok(())
}
