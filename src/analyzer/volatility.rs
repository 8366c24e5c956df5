// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::token::PricePoint;

/// Annualized historical volatility from a price series.
///
/// The series is sorted chronologically if it is not already. Pairs with a
/// non-positive price on either side are skipped. Log-returns are reduced
/// with the population standard deviation (divide by N, not N-1) and
/// scaled by the square root of the annualization factor, e.g. 8760 for
/// hourly samples.
pub fn annualized_volatility(
    series: &[PricePoint],
    annualization_factor: f64,
) -> Result<f64, AppError> {
    if series.len() < 2 {
        return Err(AppError::InsufficientData);
    }
    if !annualization_factor.is_finite() || annualization_factor <= 0.0 {
        return Err(AppError::Math(format!(
            "annualization factor {annualization_factor} must be positive"
        )));
    }

    let mut sorted: Vec<PricePoint> = series.to_vec();
    sorted.sort_by_key(|p| p.timestamp);

    let mut log_returns = Vec::with_capacity(sorted.len() - 1);
    for pair in sorted.windows(2) {
        let previous = pair[0].price;
        let current = pair[1].price;
        if previous <= 0.0 || current <= 0.0 {
            continue;
        }
        log_returns.push((current / previous).ln());
    }

    if log_returns.is_empty() {
        return Err(AppError::InsufficientData);
    }

    let n = log_returns.len() as f64;
    let mean = log_returns.iter().sum::<f64>() / n;
    let variance = log_returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / n;
    let volatility = variance.sqrt() * annualization_factor.sqrt();

    if !volatility.is_finite() {
        return Err(AppError::Math(format!(
            "volatility computation produced {volatility}"
        )));
    }
    Ok(volatility)
}
