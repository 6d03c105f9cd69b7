//! Command execution pipeline (application-level orchestration).
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections)
//! ```
//!
//! The dispatcher sits between the HTTP handlers and the infrastructure
//! traits. Persisting before publishing means a publish failure never loses
//! events: they're already durable, and republishing is safe (at-least-once,
//! consumers are idempotent).
//!
//! The optimistic `ExpectedVersion` captured at load time is what serializes
//! concurrent writers to the same stream: a debit that lost the race fails
//! with `Concurrency` instead of acting on a stale balance. Callers retry by
//! re-dispatching (which reloads) or surface a conflict.
//!
//! This module contains no IO itself; it composes the store and bus traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use cubemerch_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use cubemerch_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain-level not found.
    NotFound,
    /// Business rule: unresolved pending credits hold redemptions.
    PendingCreditsBlock,
    /// Business rule: the balance cannot cover the requested debit.
    InsufficientCredits { requested: u64, available: u64 },
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::PendingCreditsBlock => DispatchError::PendingCreditsBlock,
            DomainError::InsufficientCredits {
                requested,
                available,
            } => DispatchError::InsufficientCredits {
                requested,
                available,
            },
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests run against the in-memory
/// implementations and deployments can swap in persistent backends without
/// touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` closure lets the dispatcher work with any
    /// aggregate type without knowing how to construct it (e.g.
    /// `Account::empty(AccountId::new(id))`).
    ///
    /// Returns the committed `StoredEvent`s (with assigned sequence numbers)
    /// on success. Fails with `Concurrency` when another writer advanced the
    /// stream between load and append; callers may retry, which reloads the
    /// fresh state.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: cubemerch_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Load and rehydrate an aggregate without dispatching a command.
    ///
    /// Used by orchestration code (quote validation, idempotent replay
    /// detection) that needs current aggregate state for read-only checks.
    pub fn rehydrate<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Defense in depth: reject streams a buggy backend mis-keyed or
    // re-ordered.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
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
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
