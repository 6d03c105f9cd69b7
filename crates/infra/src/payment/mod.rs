//! External payment boundary.
//!
//! The redemption executor authorizes the cash portion of every redemption
//! through this trait before any record is persisted or any credit debited.
//! Amounts cross this boundary in integer minor units (cents); failure or
//! timeout surfaces as `Unavailable`, which callers may retry without any
//! state having changed.

pub mod in_memory;
#[cfg(feature = "stripe")]
pub mod stripe;

use async_trait::async_trait;
use thiserror::Error;

use cubemerch_accounts::AccountId;
use cubemerch_catalog::ProductId;
use cubemerch_core::Credits;

pub use in_memory::InMemoryPaymentAuthorizer;
#[cfg(feature = "stripe")]
pub use stripe::StripePaymentAuthorizer;

/// Identifying metadata attached to every authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub credits_used: Credits,
}

/// One authorization request (amount in minor units).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub metadata: PaymentMetadata,
}

/// Successful authorization: provider reference + client-side secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
    pub payment_id: String,
    pub client_secret: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The provider could not be reached (or timed out). Retryable.
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the authorization. Not retryable as-is.
    #[error("payment rejected: {0}")]
    Rejected(String),
}

/// Payment authorization collaborator.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, request: PaymentRequest) -> Result<PaymentAuthorization, PaymentError>;
}
