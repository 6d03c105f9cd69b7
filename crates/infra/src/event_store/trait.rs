use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use cubemerch_core::{AggregateId, ExpectedVersion};

/// An event ready to be appended to a stream (not yet assigned a sequence
/// number).
///
/// Built from a typed domain event via [`UncommittedEvent::from_typed`],
/// which serializes the payload and captures the event metadata needed for
/// later deserialization. The event store assigns sequence numbers during
/// append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are assigned by the store during append; they are
/// monotonically increasing per stream, immutable, and drive both ordering
/// and the optimistic concurrency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an event envelope for publication.
    pub fn to_envelope(&self) -> cubemerch_events::EventEnvelope<JsonValue> {
        cubemerch_events::EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants, business rules).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only event store.
///
/// Events are organized into **streams**, one stream per aggregate instance,
/// keyed by `AggregateId`. Within a stream, sequence numbers increase
/// monotonically (1, 2, 3, ...).
///
/// Implementations must:
/// - enforce optimistic concurrency against the current stream version —
///   this is the conditional-update primitive the redemption path relies on
///   to keep check-then-debit atomic
/// - assign sequence numbers monotonically (no gaps, no duplicates)
/// - persist a batch atomically (all events or none)
/// - keep streams append-only (no mutation, no deletion)
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream (append-only).
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for an aggregate.
    ///
    /// Returns an empty vector if the stream doesn't exist yet.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    ///
    /// Keeps infra decoupled from business code while still capturing the
    /// event metadata needed for future deserialization.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: cubemerch_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
