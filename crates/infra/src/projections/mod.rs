//! CQRS read models.
//!
//! Each projection folds one aggregate type's events into a queryable view.
//! Projections are idempotent (per-stream cursors skip duplicates) and
//! disposable (rebuildable from the event store at any time).

pub mod accounts;
pub mod catalog;
mod cursors;
pub mod lanes;
pub mod metrics;
pub mod redemptions;

use thiserror::Error;

pub use accounts::{AccountReadModel, AccountsProjection};
pub use catalog::{CatalogProjection, ProductReadModel};
pub use lanes::{LaneReadModel, LanesProjection};
pub use metrics::{DailyMetrics, MetricsTotals, PlatformMetricsProjection};
pub use redemptions::{RedemptionReadModel, RedemptionsProjection};

/// Projection apply error.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("event does not match envelope stream: {0}")]
    MismatchedStream(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}
