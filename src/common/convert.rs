// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use num_bigint::{BigInt, Sign};
use std::str::FromStr;

pub const MAX_PRECISION: u32 = 18;

/// Convert a fixed-point chain amount into a float for scoring and
/// reporting. The division happens in decimal space; only the final value
/// crosses into `f64`.
pub fn amount_to_f64(amount: &BigInt, precision: u32) -> Result<f64, AppError> {
    if precision > MAX_PRECISION {
        return Err(AppError::Math(format!(
            "precision {precision} out of range (max {MAX_PRECISION})"
        )));
    }
    if amount.sign() == Sign::Minus {
        return Err(AppError::Math(format!("amount {amount} is negative")));
    }

    let dec = BigDecimal::new(amount.clone(), i64::from(precision));
    let value = dec
        .to_f64()
        .ok_or_else(|| AppError::Math(format!("amount {amount} does not fit in f64")))?;
    if !value.is_finite() {
        return Err(AppError::Math(format!(
            "conversion of {amount} produced non-finite {value}"
        )));
    }
    Ok(value)
}

/// Convert a float back into a fixed-point amount. The float is rendered
/// to a decimal string first so binary representation error never reaches
/// the integer domain; fractional dust below the precision is truncated
/// toward zero.
pub fn f64_to_amount(value: f64, precision: u32) -> Result<BigInt, AppError> {
    if precision > MAX_PRECISION {
        return Err(AppError::Math(format!(
            "precision {precision} out of range (max {MAX_PRECISION})"
        )));
    }
    if !value.is_finite() {
        return Err(AppError::Math(format!("value {value} is not finite")));
    }
    if value < 0.0 {
        return Err(AppError::Math(format!("value {value} is negative")));
    }
    if value == 0.0 {
        return Ok(BigInt::from(0));
    }

    let rendered = format!("{value:.prec$}", prec = precision as usize);
    let dec = BigDecimal::from_str(&rendered)
        .map_err(|e| AppError::Math(format!("failed to parse '{rendered}': {e}")))?;

    let scaled = dec.with_scale_round(i64::from(precision), RoundingMode::Down);
    let (mut digits, exponent) = scaled.into_bigint_and_exponent();

    // with_scale_round pins the exponent to `precision`; anything else
    // means the decimal library changed contract under us.
    if exponent != i64::from(precision) {
        return Err(AppError::Math(format!(
            "unexpected scale {exponent} after rescale of '{rendered}'"
        )));
    }
    if digits.sign() == Sign::Minus {
        digits = BigInt::from(0);
    }
    Ok(digits)
}

/// Scale a fixed-point amount by a float factor in (0, 1], truncating
/// toward zero. Used by the viable-amount search so reduction never
/// round-trips through `f64`.
pub fn scale_amount(amount: &BigInt, factor: f64) -> Result<BigInt, AppError> {
    if !factor.is_finite() || factor <= 0.0 || factor > 1.0 {
        return Err(AppError::Math(format!("scale factor {factor} out of (0, 1]")));
    }
    let factor_dec = BigDecimal::from_str(&format!("{factor:.12}"))
        .map_err(|e| AppError::Math(format!("failed to parse factor {factor}: {e}")))?;
    let scaled = (BigDecimal::from(amount.clone()) * factor_dec)
        .with_scale_round(0, RoundingMode::Down);
    let (digits, _) = scaled.into_bigint_and_exponent();
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_micro_units() {
        let amount = BigInt::from(1_234_567u64);
        let value = amount_to_f64(&amount, 6).unwrap();
        assert!((value - 1.234567).abs() < 1e-12);
    }

    #[test]
    fn rejects_negative_amount() {
        assert!(amount_to_f64(&BigInt::from(-5), 6).is_err());
    }

    #[test]
    fn rejects_out_of_range_precision() {
        assert!(amount_to_f64(&BigInt::from(1), 19).is_err());
        assert!(f64_to_amount(1.0, 19).is_err());
    }

    #[test]
    fn rejects_non_finite_and_negative_floats() {
        assert!(f64_to_amount(f64::NAN, 6).is_err());
        assert!(f64_to_amount(f64::INFINITY, 6).is_err());
        assert!(f64_to_amount(-0.1, 6).is_err());
    }

    #[test]
    fn zero_maps_to_zero() {
        assert_eq!(f64_to_amount(0.0, 6).unwrap(), BigInt::from(0));
    }

    #[test]
    fn truncates_toward_zero() {
        // 1.9999999 at precision 6 keeps 1999999, never rounds up.
        assert_eq!(
            f64_to_amount(1.999_999_9, 6).unwrap(),
            BigInt::from(1_999_999u64)
        );
    }

    #[test]
    fn round_trips_within_precision() {
        for value in [0.000001, 0.5, 1.0, 42.123456, 987_654.321] {
            for precision in [6u32, 12, 18] {
                let fixed = f64_to_amount(value, precision).unwrap();
                let back = amount_to_f64(&fixed, precision).unwrap();
                let tolerance = 10f64.powi(-(precision as i32));
                assert!(
                    (back - value).abs() <= tolerance,
                    "value {value} precision {precision}: got {back}"
                );
            }
        }
    }

    #[test]
    fn scale_amount_truncates() {
        let amount = BigInt::from(1_000u64);
        assert_eq!(scale_amount(&amount, 0.9).unwrap(), BigInt::from(900u64));
        let odd = BigInt::from(999u64);
        assert_eq!(scale_amount(&odd, 0.9).unwrap(), BigInt::from(899u64));
    }

    #[test]
    fn scale_amount_rejects_bad_factor() {
        let amount = BigInt::from(10u64);
        assert!(scale_amount(&amount, 0.0).is_err());
        assert!(scale_amount(&amount, 1.5).is_err());
        assert!(scale_amount(&amount, f64::NAN).is_err());
    }

    #[test]
    fn large_amounts_survive() {
        // 10^24 base units at precision 18 = one million tokens.
        let amount: BigInt = "1000000000000000000000000".parse().unwrap();
        let value = amount_to_f64(&amount, 18).unwrap();
        assert!((value - 1_000_000.0).abs() < 1e-6);
    }
}
