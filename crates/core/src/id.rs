//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of an aggregate root.
///
/// Domain crates wrap this in their own newtypes (`AccountId`, `ProductId`,
/// `RedemptionId`, ...) so streams stay strongly typed at the seams.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Derive a deterministic identifier from a namespace and a caller key.
    ///
    /// Used for idempotency: the same (namespace, key) pair always maps to
    /// the same aggregate stream.
    pub fn derived(namespace: Uuid, key: &[u8]) -> Self {
        Self(Uuid::new_v5(&namespace, key))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for AggregateId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<AggregateId> for Uuid {
    fn from(value: AggregateId) -> Self {
        value.0
    }
}

impl FromStr for AggregateId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| DomainError::invalid_id(format!("AggregateId: {e}")))?;
        Ok(Self(uuid))
    }
}
