//! Redemption domain module (event-sourced).
//!
//! A `Redemption` is the durable record of one credits-plus-cash purchase:
//! created `pending` alongside the payment authorization, then completed,
//! failed, or refunded by follow-up flows. Records are never silently
//! dropped; a redemption that could not finish stays visible as
//! `pending`/`failed` for reconciliation.

pub mod record;

pub use record::{
    CompleteRedemption, FailRedemption, RedemptionRefunded, RedemptionRequested, RefundRedemption,
    Redemption, RedemptionCommand, RedemptionCompleted, RedemptionEvent, RedemptionFailed,
    RedemptionId, RedemptionStatus, RequestRedemption, ShippingAddress,
};
