use std::collections::HashMap;
use std::sync::RwLock;

use cubemerch_core::AggregateId;

use super::ProjectionError;

/// Per-stream sequence cursors.
///
/// Tracks the last applied sequence number per aggregate so projections can
/// skip duplicate deliveries (at-least-once bus) and reject gaps.
#[derive(Debug, Default)]
pub(crate) struct ProjectionCursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

/// Outcome of a cursor check for an incoming envelope.
pub(crate) enum CursorDecision {
    Apply,
    /// Already applied (duplicate delivery); skip silently.
    Skip,
}

impl ProjectionCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorDecision, ProjectionError> {
        let last = match self.inner.read() {
            Ok(map) => *map.get(&aggregate_id).unwrap_or(&0),
            Err(_) => 0,
        };

        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(CursorDecision::Skip);
        }
        if sequence_number != last + 1 && last != 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }

        Ok(CursorDecision::Apply)
    }

    pub fn advance(&self, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(aggregate_id, sequence_number);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
