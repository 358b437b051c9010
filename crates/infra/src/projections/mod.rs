//! Projections (read model builders).
//!
//! Every projection is:
//! - **Rebuildable**: `rebuild_from_scratch` reconstructs it from the ledger
//! - **Idempotent**: redelivered events (at or below the stream cursor) are skipped
//! - **Gap-intolerant**: an event that skips ahead of the cursor is an error

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockroom_core::AggregateId;
use stockroom_events::EventEnvelope;

use crate::event_store::{EventStore, EventStoreError};

pub mod cursor;
pub mod movements;
pub mod products;
pub mod suppliers;
pub mod users;

pub use cursor::StreamCursors;
pub use movements::{MovementLogProjection, MovementReadModel};
pub use products::{ProductCatalogProjection, ProductReadModel};
pub use suppliers::{SupplierDirectoryProjection, SupplierReadModel};
pub use users::{UserDirectoryProjection, UserReadModel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    /// The payload names a different aggregate than the envelope.
    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("projection unavailable: {0}")]
    Unavailable(String),
}

/// Common surface of the materialized views.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Aggregate type whose streams feed this projection.
    fn aggregate_type(&self) -> &'static str;

    /// Apply one published envelope. Envelopes of other aggregate types are ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    fn cursor(&self, aggregate_id: AggregateId) -> u64;

    /// Drop every record and cursor.
    fn reset(&self);

    /// Number of records currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply whatever the ledger holds for `aggregate_id` past this projection's cursor.
    ///
    /// Used right after a dispatch so the caller reads its own writes.
    fn catch_up<S>(&self, store: &S, aggregate_id: AggregateId) -> Result<usize, ProjectionError>
    where
        Self: Sized,
        S: EventStore + ?Sized,
    {
        let from = self.cursor(aggregate_id);
        let pending: Vec<_> = store
            .load_stream(aggregate_id)?
            .into_iter()
            .filter(|e| e.sequence_number > from)
            .collect();

        for stored in &pending {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(pending.len())
    }

    /// Clear and replay in deterministic `(aggregate, sequence)` order.
    fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError>
    where
        Self: Sized,
    {
        self.reset();

        let mut envs: Vec<_> = envelopes
            .into_iter()
            .filter(|e| e.aggregate_type() == self.aggregate_type())
            .collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        tracing::info!(projection = self.name(), events = envs.len(), records = self.len(), "projection rebuilt");
        Ok(self.len())
    }
}

/// Decode an envelope payload and check it belongs to the envelope's stream.
pub(crate) fn decode_payload<E>(
    envelope: &EventEnvelope<JsonValue>,
    stream_of: impl FnOnce(&E) -> AggregateId,
) -> Result<E, ProjectionError>
where
    E: DeserializeOwned,
{
    let event: E = serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::Deserialize(format!("{}: {e}", envelope.event_type())))?;

    let target = stream_of(&event);
    if target != envelope.aggregate_id() {
        return Err(ProjectionError::StreamMismatch(format!(
            "payload targets {target}, envelope stream is {}",
            envelope.aggregate_id()
        )));
    }
    Ok(event)
}
