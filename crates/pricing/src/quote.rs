use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cubemerch_core::{Credits, DomainError, DomainResult, ValueObject};

/// Injected pricing knobs.
///
/// These are configuration, not hidden constants, so tests (and future
/// promotions) can vary them per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Currency value of a single credit.
    pub credit_unit_value: Decimal,
    /// At most this fraction of the item price is payable via credits.
    pub max_discount_fraction: Decimal,
    /// Flat shipping, always paid in cash.
    pub flat_shipping: Decimal,
    /// Tax rate applied to the pre-discount item price.
    pub tax_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            credit_unit_value: Decimal::new(3, 2),      // 0.03
            max_discount_fraction: Decimal::new(60, 2), // 0.60
            flat_shipping: Decimal::new(599, 2),        // 5.99
            tax_rate: Decimal::new(8, 2),               // 0.08
        }
    }
}

impl PricingConfig {
    fn validate(&self) -> DomainResult<()> {
        if self.credit_unit_value <= Decimal::ZERO {
            return Err(DomainError::validation("credit_unit_value must be positive"));
        }
        if self.max_discount_fraction < Decimal::ZERO || self.max_discount_fraction > Decimal::ONE {
            return Err(DomainError::validation(
                "max_discount_fraction must be within [0, 1]",
            ));
        }
        if self.flat_shipping < Decimal::ZERO {
            return Err(DomainError::validation("flat_shipping cannot be negative"));
        }
        if self.tax_rate < Decimal::ZERO {
            return Err(DomainError::validation("tax_rate cannot be negative"));
        }
        Ok(())
    }
}

/// Fully itemized price breakdown for one redemption request.
///
/// Ephemeral value object: computed on demand, never persisted. Amounts keep
/// full precision; display rounding happens at the interface boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub item_price: Decimal,
    pub credits_requested: Credits,
    /// Requested credits clamped to `max_credits_allowed`.
    pub credits_applied: Credits,
    pub credits_value: Decimal,
    pub cash_amount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub max_credits_allowed: Credits,
    pub credits_used_percentage: Decimal,
}

impl ValueObject for Quote {}

/// Price a redemption request.
///
/// Deterministic and side-effect free: identical inputs produce identical
/// output. Requests above the credit cap are silently clamped, not rejected.
///
/// Errors with `Validation` when `item_price <= 0` or the config is
/// malformed. Product resolution (and thus "product not found") is the
/// caller's concern; the calculator only ever sees a resolved price.
pub fn compute_quote(
    config: &PricingConfig,
    item_price: Decimal,
    credits_requested: Credits,
) -> DomainResult<Quote> {
    config.validate()?;

    if item_price <= Decimal::ZERO {
        return Err(DomainError::validation("item price must be positive"));
    }

    let max_credits_allowed = ((item_price * config.max_discount_fraction)
        / config.credit_unit_value)
        .floor()
        .to_u64()
        .ok_or_else(|| DomainError::validation("credit cap overflows"))?;

    let credits_applied = credits_requested.min(max_credits_allowed);
    let credits_value = Decimal::from(credits_applied) * config.credit_unit_value;
    let cash_amount = item_price - credits_value;
    let tax = item_price * config.tax_rate;
    let total = cash_amount + config.flat_shipping + tax;
    let credits_used_percentage = (credits_value / item_price) * Decimal::ONE_HUNDRED;

    Ok(Quote {
        item_price,
        credits_requested,
        credits_applied,
        credits_value,
        cash_amount,
        shipping: config.flat_shipping,
        tax,
        total,
        max_credits_allowed,
        credits_used_percentage,
    })
}
