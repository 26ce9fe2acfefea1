//! Money handling.
//!
//! Amounts are stored as `i64` integer cents. Decimal input from clients is
//! normalized to two places with half-up rounding before it is converted.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{MarketError, Result};
use crate::promo::DiscountPercent;

/// Largest storable money value: 99 999 999.99 (ten digits, two decimals).
pub const MAX_AMOUNT_CENTS: i64 = 9_999_999_999;

/// Round a decimal amount half-up to two places.
#[must_use]
pub fn round_half_up(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a client-supplied decimal amount to cents.
///
/// # Errors
///
/// Returns `InvalidInput` for negative amounts and amounts above [`MAX_AMOUNT_CENTS`].
pub fn cents_from_decimal(amount: Decimal) -> Result<i64> {
    let cents = round_half_up(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|value| value.to_i64())
        .ok_or_else(|| MarketError::invalid("amount is out of range"))?;

    if cents < 0 {
        return Err(MarketError::invalid("amount must not be negative"));
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(MarketError::invalid("amount exceeds 99999999.99"));
    }
    Ok(cents)
}

/// Convert cents to a two-place decimal.
#[must_use]
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Render cents as a plain decimal string, e.g. `"27.00"`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    cents_to_decimal(cents).to_string()
}

/// Multiply a unit price by a quantity.
///
/// # Errors
///
/// Returns `InvalidInput` if the product overflows.
pub fn line_total(unit_cents: i64, quantity: u32) -> Result<i64> {
    unit_cents
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| MarketError::invalid("line total is out of range"))
}

/// Amount left after taking `discount` percent off `cents`, rounded half-up.
///
/// Computes `cents - cents * d / 100` exactly and rounds once.
///
/// # Errors
///
/// Returns `InvalidInput` if `cents` is negative.
pub fn apply_discount(cents: i64, discount: DiscountPercent) -> Result<i64> {
    if cents < 0 {
        return Err(MarketError::invalid("cannot discount a negative amount"));
    }
    let kept = i128::from(100 - discount.get());
    let scaled = i128::from(cents) * kept;
    i64::try_from((scaled + 50) / 100)
        .map_err(|_| MarketError::invalid("discounted amount is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pct(value: u8) -> DiscountPercent {
        DiscountPercent::try_from(value).unwrap()
    }

    #[test]
    fn cents_from_decimal_rounds_half_up() {
        assert_eq!(cents_from_decimal(dec("10.005")).unwrap(), 1001);
        assert_eq!(cents_from_decimal(dec("10.004")).unwrap(), 1000);
        assert_eq!(cents_from_decimal(dec("50")).unwrap(), 5000);
        assert_eq!(cents_from_decimal(dec("0.015")).unwrap(), 2);
    }

    #[test]
    fn cents_from_decimal_rejects_out_of_range() {
        assert!(cents_from_decimal(dec("-1")).is_err());
        assert!(cents_from_decimal(dec("100000000")).is_err());
        assert_eq!(
            cents_from_decimal(dec("99999999.99")).unwrap(),
            MAX_AMOUNT_CENTS
        );
    }

    #[test]
    fn format_keeps_two_places() {
        assert_eq!(format_cents(2700), "27.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(0), "0.00");
    }

    #[test]
    fn discount_is_rounded_half_up() {
        assert_eq!(apply_discount(3000, pct(10)).unwrap(), 2700);
        // 0.15 at 50% is 0.075 -> 0.08
        assert_eq!(apply_discount(15, pct(50)).unwrap(), 8);
        // 0.33 at 10% is 0.297 -> 0.30
        assert_eq!(apply_discount(33, pct(10)).unwrap(), 30);
        assert_eq!(apply_discount(999, pct(100)).unwrap(), 0);
    }

    #[test]
    fn line_total_detects_overflow() {
        assert_eq!(line_total(1000, 3).unwrap(), 3000);
        assert!(line_total(i64::MAX, 2).is_err());
    }
}
