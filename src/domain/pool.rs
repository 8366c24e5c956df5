// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::token::Token;
use num_bigint::{BigInt, Sign};

pub type PoolId = u64;

/// One AMM pool, reconstructed from chain state every cycle and never
/// mutated after validation. Token A is always the non-USDC leg.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    pub id: PoolId,
    pub token_a: Token,
    pub token_b: Token,
    pub balance_a: BigInt,
    pub balance_b: BigInt,
    /// Normalized weights, each in (0, 1), summing to ~1.
    pub weight_a: f64,
    pub weight_b: f64,
    pub tvl_usd: f64,
    pub volume_7d_usd: f64,
    pub eden_apr: f64,
    pub usdc_fee_apr: f64,
    pub price_impact_apr: f64,
    pub is_smart_shielded: bool,
    pub swap_fee: f64,
    pub age_days: i64,
    /// External sentiment in [-1, 1]; 0 when no signal is available.
    pub sentiment: f64,
    pub total_shares: BigInt,

    // Vault-side augmentation, filled in by the engine after reading
    // positions. Drives the continuity bonus.
    pub has_position: bool,
    pub position_age_days: i64,
    pub position_value_usd: f64,
}

impl Pool {
    /// Full validation of everything the scorer and planner rely on.
    /// A pool that fails here aborts the cycle rather than being silently
    /// dropped.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id == 0 {
            return Err(AppError::PoolData("pool id cannot be zero".into()));
        }
        if self.token_a.symbol.is_empty() {
            return Err(AppError::PoolData(format!(
                "pool {}: token A symbol is empty",
                self.id
            )));
        }
        if self.token_b.symbol.is_empty() {
            return Err(AppError::PoolData(format!(
                "pool {}: token B symbol is empty",
                self.id
            )));
        }
        if self.token_a.ibc_denom == self.token_b.ibc_denom {
            return Err(AppError::PoolData(format!(
                "pool {}: token A and token B share denom {}",
                self.id, self.token_a.ibc_denom
            )));
        }
        if self.balance_a.sign() != Sign::Plus {
            return Err(AppError::PoolData(format!(
                "pool {}: balance A must be positive",
                self.id
            )));
        }
        if self.balance_b.sign() != Sign::Plus {
            return Err(AppError::PoolData(format!(
                "pool {}: balance B must be positive",
                self.id
            )));
        }
        if self.total_shares.sign() != Sign::Plus {
            return Err(AppError::PoolData(format!(
                "pool {}: total shares must be positive",
                self.id
            )));
        }
        if self.tvl_usd < 0.0 || !self.tvl_usd.is_finite() {
            return Err(AppError::PoolData(format!(
                "pool {}: TVL must be finite and non-negative",
                self.id
            )));
        }
        if self.volume_7d_usd < 0.0 || !self.volume_7d_usd.is_finite() {
            return Err(AppError::PoolData(format!(
                "pool {}: 7d volume must be finite and non-negative",
                self.id
            )));
        }
        for (value, name) in [
            (self.eden_apr, "eden apr"),
            (self.usdc_fee_apr, "usdc fee apr"),
            (self.price_impact_apr, "price impact apr"),
        ] {
            if !value.is_finite() {
                return Err(AppError::PoolData(format!(
                    "pool {}: {name} must be finite",
                    self.id
                )));
            }
        }
        if !self.token_a.volatility.is_finite() || self.token_a.volatility < 0.0 {
            return Err(AppError::PoolData(format!(
                "pool {}: token A volatility must be finite and non-negative",
                self.id
            )));
        }
        if self.age_days < 0 {
            return Err(AppError::PoolData(format!(
                "pool {}: age cannot be negative",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.swap_fee) {
            return Err(AppError::PoolData(format!(
                "pool {}: swap fee {} out of [0, 1]",
                self.id, self.swap_fee
            )));
        }
        let total_weight = self.weight_a + self.weight_b;
        if self.weight_a <= 0.0
            || self.weight_b <= 0.0
            || (total_weight - 1.0).abs() > 0.01
        {
            return Err(AppError::PoolData(format!(
                "pool {}: weights {}/{} must be positive and sum to ~1",
                self.id, self.weight_a, self.weight_b
            )));
        }
        if self.sentiment != 0.0 && !(-1.0..=1.0).contains(&self.sentiment) {
            return Err(AppError::PoolData(format!(
                "pool {}: sentiment {} out of [-1, 1]",
                self.id, self.sentiment
            )));
        }
        if self.has_position && self.position_age_days < 0 {
            return Err(AppError::PoolData(format!(
                "pool {}: position age cannot be negative when a position exists",
                self.id
            )));
        }
        Ok(())
    }
}
