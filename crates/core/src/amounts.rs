//! Human ↔ base-unit amount conversion.
//!
//! Conversion into base units is integer-exact: the human decimal string is
//! scaled by `10^decimals` and rounded half-to-even at the last representable
//! digit. Floats appear only on the display side.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("{0:?} is not a decimal amount")]
    Unparseable(String),

    #[error("amount must be positive")]
    NotPositive,

    #[error("amount does not fit in 64 bits at {decimals} decimals")]
    Overflow { decimals: u8 },
}

/// Convert a human-entered decimal amount into integer base units.
pub fn to_base_units(human: &str, decimals: u8) -> Result<u64, AmountError> {
    let value: Decimal = human
        .trim()
        .parse()
        .map_err(|_| AmountError::Unparseable(human.to_string()))?;
    if value <= Decimal::ZERO {
        return Err(AmountError::NotPositive);
    }
    let scale = Decimal::from(pow10(decimals));
    let scaled = value
        .checked_mul(scale)
        .ok_or(AmountError::Overflow { decimals })?;
    let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    rounded.to_u64().ok_or(AmountError::Overflow { decimals })
}

/// Render base units as a fixed-point decimal with all `decimals` digits.
pub fn format_base_units(amount: u64, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let divisor = pow10(decimals);
    format!(
        "{}.{:0width$}",
        amount / divisor,
        amount % divisor,
        width = decimals as usize
    )
}

/// Output per unit of input in human units. Display only.
pub fn rate(in_amount: u64, in_decimals: u8, out_amount: u64, out_decimals: u8) -> f64 {
    let input = in_amount as f64 / pow10(in_decimals) as f64;
    let output = out_amount as f64 / pow10(out_decimals) as f64;
    if input == 0.0 {
        return 0.0;
    }
    output / input
}

/// Decimals are bounded at 18, so the scale always fits a u64.
fn pow10(decimals: u8) -> u64 {
    10u64.pow(u32::from(decimals.min(18)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_uses_the_input_side_decimals() {
        // 0.05 SOL at 9 decimals is exactly 50 million lamports, not the
        // 50 thousand a 6-decimal assumption would produce.
        assert_eq!(to_base_units("0.05", 9).unwrap(), 50_000_000);
        assert_ne!(to_base_units("0.05", 9).unwrap(), 50_000);
        assert_eq!(to_base_units("0.05", 6).unwrap(), 50_000);
    }

    #[test]
    fn test_whole_and_fractional_amounts() {
        assert_eq!(to_base_units("1", 6).unwrap(), 1_000_000);
        assert_eq!(to_base_units("12.5", 6).unwrap(), 12_500_000);
        assert_eq!(to_base_units("0.000001", 6).unwrap(), 1);
        assert_eq!(to_base_units(" 3.25 ", 2).unwrap(), 325);
    }

    #[test]
    fn test_zero_decimal_tokens_work() {
        assert_eq!(to_base_units("42", 0).unwrap(), 42);
        assert_eq!(format_base_units(42, 0), "42");
        // Sub-unit amounts round half-to-even onto whole units.
        assert_eq!(to_base_units("2.5", 0).unwrap(), 2);
        assert_eq!(to_base_units("3.5", 0).unwrap(), 4);
    }

    #[test]
    fn test_excess_digits_round_half_to_even() {
        assert_eq!(to_base_units("0.0000015", 6).unwrap(), 2);
        assert_eq!(to_base_units("0.0000025", 6).unwrap(), 2);
        assert_eq!(to_base_units("0.0000026", 6).unwrap(), 3);
    }

    #[test]
    fn test_rejects_garbage_and_non_positive() {
        assert!(matches!(
            to_base_units("sol", 9),
            Err(AmountError::Unparseable(_))
        ));
        assert_eq!(to_base_units("0", 9), Err(AmountError::NotPositive));
        assert_eq!(to_base_units("-1", 9), Err(AmountError::NotPositive));
    }

    #[test]
    fn test_round_trip_stays_within_one_base_unit() {
        for decimals in [0u8, 2, 6, 9, 12] {
            for human in ["0.05", "1", "123.456", "0.999999", "7.000001"] {
                let Ok(units) = to_base_units(human, decimals) else {
                    continue;
                };
                let formatted = format_base_units(units, decimals);
                let original: f64 = human.parse().unwrap();
                let round_tripped: f64 = formatted.parse().unwrap();
                let tolerance = 1.0 / pow10(decimals) as f64;
                assert!(
                    (original - round_tripped).abs() < tolerance,
                    "{human} at {decimals} decimals drifted to {formatted}"
                );
            }
        }
    }

    #[test]
    fn test_format_keeps_every_decimal_place() {
        assert_eq!(format_base_units(9_721_400, 6), "9.721400");
        assert_eq!(format_base_units(50_000_000, 9), "0.050000000");
        assert_eq!(format_base_units(1, 6), "0.000001");
    }

    #[test]
    fn test_rate_is_in_human_units() {
        // 0.05 SOL -> 9.7214 USDC is a rate of ~194.4 USDC per SOL.
        let value = rate(50_000_000, 9, 9_721_400, 6);
        assert!((value - 194.428).abs() < 1e-6);
    }
}
