//! Redemption orchestration (application-level transaction).
//!
//! Executes one redemption end to end:
//!
//! ```text
//! validate input
//!   ↓
//! idempotent replay check (caller-supplied key → derived stream id)
//!   ↓
//! preconditions (account exists, no pending hold, product in stock)
//!   ↓
//! re-derive the quote from the current product price (client quotes are
//! display material, never authoritative)
//!   ↓
//! clamped-credits balance check
//!   ↓
//! payment authorization (bounded by a timeout)
//!   ↓
//! persist Redemption record (pending)
//!   ↓
//! debit credits (optimistic append; bounded retry on contention)
//! ```
//!
//! Everything before the payment call is pure validation: a failure there
//! leaves no trace. A payment failure aborts before any record exists. Once
//! the record is persisted, a debit that cannot be committed is compensated
//! by failing the record, never by deleting it — the pending/failed row is
//! the reconciliation handle.
//!
//! Records are created `pending`: payment confirmation is asynchronous, and
//! a separate completion flow moves them to `completed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use cubemerch_accounts::{Account, AccountCommand, AccountId, DebitCredits};
use cubemerch_catalog::ProductId;
use cubemerch_core::{to_minor_units, AggregateId, Credits};
use cubemerch_events::{EventBus, EventEnvelope};
use cubemerch_pricing::{compute_quote, PricingConfig, Quote};
use cubemerch_redemption::{
    FailRedemption, Redemption, RedemptionCommand, RedemptionId, RedemptionStatus,
    RequestRedemption, ShippingAddress,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::payment::{PaymentAuthorizer, PaymentMetadata, PaymentRequest};
use crate::product_source::{ProductSourceChain, ProductView};
use crate::projections;

/// Namespace for deriving redemption stream ids from idempotency keys.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_u128(0x50c0be00_1dea_4000_8000_000000000002);

const MAX_DEBIT_ATTEMPTS: u32 = 3;
const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One redemption submission.
#[derive(Debug, Clone)]
pub struct RedemptionOrder {
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub credits_to_use: Credits,
    pub shipping_address: ShippingAddress,
    /// Caller-supplied deduplication token; a replayed submission with the
    /// same key returns the original confirmation without a second debit.
    pub idempotency_key: Option<String>,
}

/// Confirmation returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionConfirmation {
    pub redemption_id: RedemptionId,
    pub payment_reference: String,
    /// True when this confirmation was served from an earlier submission
    /// with the same idempotency key.
    pub replayed: bool,
}

/// Redemption failure taxonomy.
///
/// Validation-style failures (`InvalidInput`..`InsufficientCredits`) occur
/// before any side effect. `PaymentProviderUnavailable` is retryable by the
/// caller with no state change. `Persistence` means state may need
/// reconciliation and is never reported as success.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedemptionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("account not found")]
    UserNotFound,

    #[error("product not found or not in stock")]
    ProductNotFound,

    #[error("redemption blocked: unresolved pending credits")]
    PendingCreditsBlock,

    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: u64, available: u64 },

    #[error("payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// End-to-end redemption executor.
///
/// Holds the command dispatcher (event store + bus), the product resolution
/// chain, the payment collaborator, and the injected pricing configuration.
pub struct RedemptionExecutor<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    products: Arc<ProductSourceChain>,
    payments: Arc<dyn PaymentAuthorizer>,
    pricing: PricingConfig,
    payment_timeout: Duration,
}

impl<S, B> RedemptionExecutor<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        products: Arc<ProductSourceChain>,
        payments: Arc<dyn PaymentAuthorizer>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            dispatcher,
            products,
            payments,
            pricing,
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
        }
    }

    pub fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Price a redemption request without side effects.
    ///
    /// Runs the same validation order the execution path uses: account,
    /// pending hold, product, quote, balance (against the clamped credit
    /// amount). Safe to call any number of times.
    pub fn quote(
        &self,
        account_id: AccountId,
        product_id: ProductId,
        credits_to_use: Credits,
    ) -> Result<Quote, RedemptionError> {
        let account = self.load_account(account_id)?;

        if account.is_redemption_blocked() {
            return Err(RedemptionError::PendingCreditsBlock);
        }

        let product = self.resolve_product(product_id)?;

        let quote = compute_quote(&self.pricing, product.price, credits_to_use)
            .map_err(|e| RedemptionError::InvalidInput(e.to_string()))?;

        if quote.credits_applied > account.credit_balance() {
            return Err(RedemptionError::InsufficientCredits {
                requested: quote.credits_applied,
                available: account.credit_balance(),
            });
        }

        Ok(quote)
    }

    /// Execute one redemption as a single logical transaction.
    pub async fn execute(
        &self,
        order: RedemptionOrder,
    ) -> Result<RedemptionConfirmation, RedemptionError> {
        order
            .shipping_address
            .validate()
            .map_err(|e| RedemptionError::InvalidInput(e.to_string()))?;

        let redemption_id = self.redemption_id_for(&order);

        // Idempotent replay: a derived stream that already exists is the
        // original submission.
        if order.idempotency_key.is_some() {
            if let Some(confirmation) = self.try_replay(redemption_id, &order)? {
                return Ok(confirmation);
            }
        }

        // Preconditions + authoritative server-side quote (no side effects).
        let quote = self.quote(order.account_id, order.product_id, order.credits_to_use)?;

        // Payment authorization for the computed total, in minor units.
        let authorization = self.authorize_payment(&order, &quote).await?;

        // Durable record first (pending), then the debit. A crash between
        // the two leaves a pending record for reconciliation instead of a
        // silent loss.
        self.persist_record(redemption_id, &order, &quote, &authorization.payment_id)?;

        match self.debit_with_retry(&order, redemption_id, quote.credits_applied) {
            Ok(()) => {
                tracing::info!(
                    redemption_id = %redemption_id,
                    account_id = %order.account_id,
                    credits = quote.credits_applied,
                    payment_id = %authorization.payment_id,
                    "redemption recorded"
                );
                Ok(RedemptionConfirmation {
                    redemption_id,
                    payment_reference: authorization.payment_id,
                    replayed: false,
                })
            }
            Err(err) => {
                self.compensate_failed_debit(redemption_id, &err);
                Err(err)
            }
        }
    }

    fn redemption_id_for(&self, order: &RedemptionOrder) -> RedemptionId {
        match &order.idempotency_key {
            Some(key) => {
                let scoped = format!("{}:{}", order.account_id, key);
                RedemptionId::new(AggregateId::derived(IDEMPOTENCY_NAMESPACE, scoped.as_bytes()))
            }
            None => RedemptionId::new(AggregateId::new()),
        }
    }

    fn try_replay(
        &self,
        redemption_id: RedemptionId,
        order: &RedemptionOrder,
    ) -> Result<Option<RedemptionConfirmation>, RedemptionError> {
        let existing = self
            .dispatcher
            .rehydrate::<Redemption>(redemption_id.0, |id| Redemption::empty(RedemptionId::new(id)))
            .map_err(|e| RedemptionError::Persistence(format!("{e:?}")))?;

        if !existing.exists() {
            return Ok(None);
        }

        if existing.account_id() != Some(order.account_id)
            || existing.product_id() != Some(order.product_id)
        {
            return Err(RedemptionError::InvalidInput(
                "idempotency key was already used with different parameters".to_string(),
            ));
        }

        // A failed original must not replay as success.
        if existing.status() == RedemptionStatus::Failed {
            return Err(RedemptionError::Persistence(format!(
                "redemption {redemption_id} previously failed; submit with a new idempotency key"
            )));
        }

        Ok(Some(RedemptionConfirmation {
            redemption_id,
            payment_reference: existing.payment_reference().to_string(),
            replayed: true,
        }))
    }

    fn load_account(&self, account_id: AccountId) -> Result<Account, RedemptionError> {
        let account = self
            .dispatcher
            .rehydrate::<Account>(account_id.0, |id| Account::empty(AccountId::new(id)))
            .map_err(|e| RedemptionError::Persistence(format!("{e:?}")))?;

        if !account.exists() {
            return Err(RedemptionError::UserNotFound);
        }
        Ok(account)
    }

    fn resolve_product(&self, product_id: ProductId) -> Result<ProductView, RedemptionError> {
        match self.products.resolve(product_id) {
            Some(product) if product.in_stock => Ok(product),
            _ => Err(RedemptionError::ProductNotFound),
        }
    }

    async fn authorize_payment(
        &self,
        order: &RedemptionOrder,
        quote: &Quote,
    ) -> Result<crate::payment::PaymentAuthorization, RedemptionError> {
        let amount_minor_units = to_minor_units(quote.total)
            .ok_or_else(|| RedemptionError::InvalidInput("total overflows minor units".to_string()))?;

        let request = PaymentRequest {
            amount_minor_units,
            currency: "usd".to_string(),
            metadata: PaymentMetadata {
                account_id: order.account_id,
                product_id: order.product_id,
                credits_used: quote.credits_applied,
            },
        };

        match tokio::time::timeout(self.payment_timeout, self.payments.authorize(request)).await {
            Ok(Ok(authorization)) => Ok(authorization),
            Ok(Err(e)) => Err(RedemptionError::PaymentProviderUnavailable(e.to_string())),
            Err(_) => Err(RedemptionError::PaymentProviderUnavailable(
                "authorization timed out".to_string(),
            )),
        }
    }

    fn persist_record(
        &self,
        redemption_id: RedemptionId,
        order: &RedemptionOrder,
        quote: &Quote,
        payment_reference: &str,
    ) -> Result<(), RedemptionError> {
        let cmd = RedemptionCommand::RequestRedemption(RequestRedemption {
            redemption_id,
            account_id: order.account_id,
            product_id: order.product_id,
            credits_used: quote.credits_applied,
            cash_amount: quote.cash_amount,
            total_amount: quote.total,
            payment_reference: payment_reference.to_string(),
            shipping_address: order.shipping_address.clone(),
            occurred_at: Utc::now(),
        });

        self.dispatcher
            .dispatch::<Redemption>(
                redemption_id.0,
                projections::redemptions::AGGREGATE_TYPE,
                cmd,
                |id| Redemption::empty(RedemptionId::new(id)),
            )
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(
                    redemption_id = %redemption_id,
                    payment_reference,
                    error = ?e,
                    "redemption record could not be persisted after authorization"
                );
                RedemptionError::Persistence(format!("{e:?}"))
            })
    }

    /// Debit with bounded retries on optimistic-concurrency contention.
    ///
    /// Each dispatch reloads the stream, so every retry re-validates the
    /// pending hold and the balance against fresh state. Two racing
    /// redemptions therefore cannot both debit past the balance: the loser's
    /// retry sees the winner's debit and fails the insufficient-credits
    /// check.
    fn debit_with_retry(
        &self,
        order: &RedemptionOrder,
        redemption_id: RedemptionId,
        credits_applied: Credits,
    ) -> Result<(), RedemptionError> {
        for attempt in 1..=MAX_DEBIT_ATTEMPTS {
            let cmd = AccountCommand::DebitCredits(DebitCredits {
                account_id: order.account_id,
                amount: credits_applied,
                redemption_id: redemption_id.0,
                occurred_at: Utc::now(),
            });

            match self.dispatcher.dispatch::<Account>(
                order.account_id.0,
                projections::accounts::AGGREGATE_TYPE,
                cmd,
                |id| Account::empty(AccountId::new(id)),
            ) {
                Ok(_) => return Ok(()),
                Err(DispatchError::Concurrency(msg)) => {
                    tracing::debug!(
                        account_id = %order.account_id,
                        attempt,
                        msg,
                        "debit contention, retrying against fresh state"
                    );
                    continue;
                }
                Err(DispatchError::PendingCreditsBlock) => {
                    return Err(RedemptionError::PendingCreditsBlock)
                }
                Err(DispatchError::InsufficientCredits {
                    requested,
                    available,
                }) => {
                    return Err(RedemptionError::InsufficientCredits {
                        requested,
                        available,
                    })
                }
                Err(DispatchError::NotFound) => return Err(RedemptionError::UserNotFound),
                Err(e) => return Err(RedemptionError::Persistence(format!("{e:?}"))),
            }
        }

        Err(RedemptionError::Persistence(
            "debit retries exhausted under contention".to_string(),
        ))
    }

    /// Compensating action: the record stays visible as `failed`.
    fn compensate_failed_debit(&self, redemption_id: RedemptionId, cause: &RedemptionError) {
        let cmd = RedemptionCommand::FailRedemption(FailRedemption {
            redemption_id,
            reason: cause.to_string(),
            occurred_at: Utc::now(),
        });

        let result = self.dispatcher.dispatch::<Redemption>(
            redemption_id.0,
            projections::redemptions::AGGREGATE_TYPE,
            cmd,
            |id| Redemption::empty(RedemptionId::new(id)),
        );

        if let Err(e) = result {
            // The record is stuck in `pending`; reconciliation picks it up.
            tracing::error!(
                redemption_id = %redemption_id,
                error = ?e,
                "failed to compensate redemption after debit failure"
            );
        }
    }
}
