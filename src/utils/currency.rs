//! Currency helpers for escrow amounts.
//!
//! Marketplace amounts arrive as JSON floats and are stored as NUMERIC
//! (BigDecimal) with 2 decimal places. The CHIP gateway only accepts minor
//! units (cents), so that conversion happens exactly once at the gateway
//! boundary.

use bigdecimal::{BigDecimal, ParseBigDecimalError, RoundingMode};
use num_traits::ToPrimitive;

/// Fixed platform commission charged on top of every escrow amount.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

/// Decimal amount from a JSON float, rounded half-up to 2 places.
/// Most cent values have no exact binary form (200.10_f64 is 200.0999...),
/// so the scale must round, not truncate. NaN and infinities are rejected.
pub fn amount_from_f64(amount: f64) -> Result<BigDecimal, ParseBigDecimalError> {
    Ok(BigDecimal::try_from(amount)?.with_scale_round(2, RoundingMode::HalfUp))
}

/// Platform fee for a given escrow amount, rounded to 2 decimal places.
pub fn platform_fee(amount: &BigDecimal) -> BigDecimal {
    (amount * BigDecimal::from(PLATFORM_FEE_PERCENT) / BigDecimal::from(100))
        .with_scale_round(2, RoundingMode::HalfUp)
}

/// Amount the payer is charged: escrow amount plus platform fee.
pub fn total_with_fee(amount: &BigDecimal) -> BigDecimal {
    (amount + platform_fee(amount)).with_scale_round(2, RoundingMode::HalfUp)
}

/// Convert a decimal amount to minor units (cents). `None` when the value
/// does not fit in an i64.
pub fn amount_to_cents(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
}

/// Convert minor units (cents) back to a decimal amount
pub fn cents_to_amount(cents: i64) -> BigDecimal {
    BigDecimal::new(cents.into(), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_platform_fee() {
        let budget = BigDecimal::from(500);
        assert_eq!(platform_fee(&budget), BigDecimal::from_str("25.00").unwrap());

        let odd = BigDecimal::from_str("123.45").unwrap();
        assert_eq!(platform_fee(&odd), BigDecimal::from_str("6.17").unwrap());
    }

    #[test]
    fn test_total_with_fee() {
        let budget = BigDecimal::from(500);
        assert_eq!(
            total_with_fee(&budget),
            BigDecimal::from_str("525.00").unwrap()
        );
    }

    #[test]
    fn test_amount_from_f64_rounds_binary_noise() {
        // 200.10_f64 is 200.0999...; truncating the scale would store 200.09.
        assert_eq!(
            amount_from_f64(200.10).unwrap(),
            BigDecimal::from_str("200.10").unwrap()
        );
        assert_eq!(
            amount_from_f64(0.29).unwrap(),
            BigDecimal::from_str("0.29").unwrap()
        );
        assert_eq!(
            amount_from_f64(500.0).unwrap(),
            BigDecimal::from_str("500.00").unwrap()
        );
    }

    #[test]
    fn test_amount_from_f64_rejects_non_finite() {
        assert!(amount_from_f64(f64::NAN).is_err());
        assert!(amount_from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_amount_to_cents() {
        assert_eq!(amount_to_cents(&BigDecimal::from(100)), Some(10000));
        assert_eq!(
            amount_to_cents(&BigDecimal::from_str("0.50").unwrap()),
            Some(50)
        );
        assert_eq!(
            amount_to_cents(&BigDecimal::from_str("525.00").unwrap()),
            Some(52500)
        );
        assert_eq!(
            amount_to_cents(&BigDecimal::from_str("123.456").unwrap()),
            Some(12346)
        );
    }

    #[test]
    fn test_amount_to_cents_overflow_is_refused() {
        // i64::MAX cents is roughly 9.2e16 in major units.
        let too_big = BigDecimal::from_str("100000000000000000").unwrap();
        assert_eq!(amount_to_cents(&too_big), None);
    }

    #[test]
    fn test_cents_to_amount() {
        assert_eq!(cents_to_amount(10000), BigDecimal::from(100));
        assert_eq!(cents_to_amount(50), BigDecimal::from_str("0.50").unwrap());
        assert_eq!(
            cents_to_amount(12345),
            BigDecimal::from_str("123.45").unwrap()
        );
    }

    #[test]
    fn test_fee_round_trips_through_cents() {
        let budget = BigDecimal::from(500);
        let total = total_with_fee(&budget);

        assert_eq!(amount_to_cents(&total), Some(52500));
        assert_eq!(cents_to_amount(52500), total);
    }
}
