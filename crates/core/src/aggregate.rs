//! Aggregate root traits for the event-sourced domain model.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// Intentionally small: each bounded context (catalog, accounts, redemption,
/// lanes) decides how it models state transitions without pulling in any
/// infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Corresponds to the number of events applied (the stream revision).
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate stream.
///
/// This is the guard that makes check-then-act sequences (balance check +
/// debit) atomic relative to concurrent writers: an append with a stale
/// `Exact` expectation is rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (idempotent commands, migrations).
    Any,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO or side effects. They only return events
/// describing what happened; money and credit mutations in particular are
/// never applied outside of `apply`.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    ///
    /// Implementations must stay deterministic and update their internal
    /// `version()` tracking consistently (+1 per applied event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// This must not mutate state. State evolution is done through `apply`.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_version_exact_rejects_stale() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Exact(2).check(5).is_err());
    }

    #[test]
    fn expected_version_any_always_matches() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.check(17).is_ok());
    }
}
