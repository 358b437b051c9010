use std::collections::HashMap;
use std::sync::RwLock;

use stockroom_core::AggregateId;

use super::ProjectionError;

/// Per-stream high-water marks for one projection.
///
/// A projection applies event `n` of a stream only when it has applied
/// `n - 1`; anything at or below the mark is a redelivery and is skipped.
#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied sequence number for `aggregate_id` (0 when none).
    pub fn position(&self, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&aggregate_id).copied())
            .unwrap_or(0)
    }

    /// Run `apply` for event `seq` of `aggregate_id` if it is the next one.
    ///
    /// Holds the cursor write lock for the duration of `apply`, so concurrent
    /// callers feeding the same stream cannot interleave out of order. Returns
    /// `Ok(false)` for a redelivery.
    pub fn advance<F>(&self, aggregate_id: AggregateId, seq: u64, apply: F) -> Result<bool, ProjectionError>
    where
        F: FnOnce() -> Result<(), ProjectionError>,
    {
        let mut cursors = self
            .inner
            .write()
            .map_err(|_| ProjectionError::Unavailable("cursor lock poisoned".to_string()))?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        apply()?;
        cursors.insert(aggregate_id, seq);
        Ok(true)
    }

    /// Forget every position and run `clear` under the same lock.
    pub fn reset<F: FnOnce()>(&self, clear: F) {
        match self.inner.write() {
            Ok(mut cursors) => {
                cursors.clear();
                clear();
            }
            Err(poisoned) => {
                let mut cursors = poisoned.into_inner();
                cursors.clear();
                clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_in_order_and_skips_redelivery() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        assert!(cursors.advance(id, 1, || Ok(())).unwrap());
        assert!(cursors.advance(id, 2, || Ok(())).unwrap());
        assert!(!cursors.advance(id, 2, || Ok(())).unwrap());
        assert_eq!(cursors.position(id), 2);
    }

    #[test]
    fn gaps_are_rejected() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        match cursors.advance(id, 2, || Ok(())).unwrap_err() {
            ProjectionError::NonMonotonicSequence { last, found } => {
                assert_eq!((last, found), (0, 2));
            }
            other => panic!("Expected NonMonotonicSequence, got {other:?}"),
        }
    }

    #[test]
    fn failed_apply_does_not_advance() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        let _ = cursors.advance(id, 1, || Err(ProjectionError::Deserialize("bad".to_string())));
        assert_eq!(cursors.position(id), 0);
    }
}
