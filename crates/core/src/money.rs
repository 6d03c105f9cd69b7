//! Money conventions shared across the domain.
//!
//! All currency amounts are `rust_decimal::Decimal`. Computation keeps full
//! precision; rounding happens only at two boundaries:
//! - `round_display` for presentation (2 decimal places),
//! - `to_minor_units` for the payment provider (integer cents).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Loyalty credits are whole, non-negative units.
pub type Credits = u64;

/// Round an amount for display (2 decimal places, half-up).
pub fn round_display(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a currency amount to integer minor units (cents), half-up.
///
/// Returns `None` when the amount does not fit an `i64` after scaling.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(Decimal::new(204092, 4)), Some(2041)); // 20.4092
        assert_eq!(to_minor_units(Decimal::new(12025, 3)), Some(1203)); // 12.025
        assert_eq!(to_minor_units(Decimal::new(1202, 2)), Some(1202)); // 12.02
    }

    #[test]
    fn display_rounding_is_two_places() {
        assert_eq!(round_display(Decimal::new(23992, 4)), Decimal::new(240, 2)); // 2.3992 -> 2.40
        assert_eq!(round_display(Decimal::new(1797, 2)), Decimal::new(1797, 2));
    }
}
