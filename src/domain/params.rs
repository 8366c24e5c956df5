// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use serde::{Deserialize, Serialize};

/// All tunable weights, coefficients, and thresholds of the strategy.
/// Versioned sets live in the parameters store; exactly one is active per
/// configuration name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringParameters {
    // Selection & allocation caps
    pub max_pools: u32,
    /// Minimum fraction of vault value per selected pool.
    pub min_allocation: f64,
    /// Maximum fraction of vault value per selected pool.
    pub max_allocation: f64,
    /// Minimum fraction for the governance-asset pool whenever one is
    /// selected, regardless of its proportional share.
    pub forced_allocation_minimum: f64,

    // Rebalance limits
    /// Percentage deviation from target required before a pool is touched.
    pub rebalance_threshold_pct: f64,
    /// Cap on total withdrawals per cycle, as a percentage of vault value.
    /// Deposits are not capped.
    pub max_withdraw_pct_per_cycle: f64,
    /// USDC kept liquid and never deposited.
    pub min_liquid_usdc_buffer: f64,

    // Slippage limits (percent, 0..=100)
    pub smart_shield_slippage_pct: f64,
    pub normal_pool_slippage_pct: f64,
    /// Multiplier applied per retry when searching for a viable swap size.
    pub swap_reduction_factor: f64,
    /// Multiplier applied once when a deposit exceeds its slippage limit.
    pub deposit_reduction_factor: f64,

    // Reward component
    pub apr_coefficient: f64,
    pub volume_coefficient: f64,
    pub eden_weight: f64,
    pub usdc_fee_weight: f64,
    pub price_impact_weight: f64,

    // Risk component
    pub il_risk_coefficient: f64,
    pub volatility_coefficient: f64,
    pub new_pool_coefficient: f64,
    pub pool_maturity_days: i64,
    pub il_holding_period_years: f64,
    pub il_confidence_factor: f64,
    pub smart_shield_reduction_factor: f64,

    // Liquidity component
    pub tvl_coefficient: f64,
    pub min_tvl_threshold: f64,

    // Bonus component
    pub smart_shield_bonus: f64,
    pub continuity_coefficient: f64,
    pub continuity_lookback_days: i64,

    pub sentiment_impact_factor: f64,

    // Reserved parameter-learning extension point. Persisted with every
    // version, read by nothing yet.
    pub optimization_interval_cycles: u32,
    pub learning_rate: f64,
    pub max_parameter_change: f64,
}

impl ScoringParameters {
    /// Baseline strategy calibrated for large capital: diversification over
    /// yield-chasing, strict slippage control, strong penalties for young
    /// pools.
    pub fn default_strategy() -> Self {
        Self {
            max_pools: 5,
            min_allocation: 0.08,
            max_allocation: 0.35,
            forced_allocation_minimum: 0.10,

            rebalance_threshold_pct: 5.0,
            max_withdraw_pct_per_cycle: 10.0,
            min_liquid_usdc_buffer: 50.0,

            smart_shield_slippage_pct: 1.0,
            normal_pool_slippage_pct: 3.0,
            swap_reduction_factor: 0.9,
            deposit_reduction_factor: 0.8,

            apr_coefficient: 0.8,
            volume_coefficient: 0.5,
            eden_weight: 0.8,
            usdc_fee_weight: 1.5,
            price_impact_weight: 1.3,

            il_risk_coefficient: -1.2,
            volatility_coefficient: -1.0,
            new_pool_coefficient: -8.0,
            pool_maturity_days: 30,
            il_holding_period_years: 30.0 / 365.0,
            il_confidence_factor: 2.5,
            smart_shield_reduction_factor: 0.15,

            tvl_coefficient: 0.6,
            min_tvl_threshold: 50_000.0,

            smart_shield_bonus: 8.0,
            continuity_coefficient: 2.0,
            continuity_lookback_days: 30,

            sentiment_impact_factor: -0.3,

            optimization_interval_cycles: 288,
            learning_rate: 0.005,
            max_parameter_change: 0.05,
        }
    }

    /// Scoring-side validation. Every coefficient must be finite, the APR
    /// weights must sum to something positive, and the IL model must be
    /// well-formed.
    pub fn validate_scoring(&self) -> Result<(), AppError> {
        if self.eden_weight < 0.0 || self.usdc_fee_weight < 0.0 || self.price_impact_weight < 0.0 {
            return Err(AppError::ScoringParams("APR weights cannot be negative".into()));
        }
        let total_apr_weight = self.eden_weight + self.usdc_fee_weight + self.price_impact_weight;
        if !total_apr_weight.is_finite() || total_apr_weight <= 0.0 {
            return Err(AppError::ScoringParams(
                "total APR weight must be positive".into(),
            ));
        }
        for (value, name) in [
            (self.apr_coefficient, "apr_coefficient"),
            (self.volume_coefficient, "volume_coefficient"),
            (self.il_risk_coefficient, "il_risk_coefficient"),
            (self.volatility_coefficient, "volatility_coefficient"),
            (self.tvl_coefficient, "tvl_coefficient"),
            (self.new_pool_coefficient, "new_pool_coefficient"),
            (self.continuity_coefficient, "continuity_coefficient"),
            (self.smart_shield_bonus, "smart_shield_bonus"),
            (self.sentiment_impact_factor, "sentiment_impact_factor"),
        ] {
            if !value.is_finite() {
                return Err(AppError::ScoringParams(format!("{name} must be finite")));
            }
        }
        if !self.min_tvl_threshold.is_finite() || self.min_tvl_threshold <= 0.0 {
            return Err(AppError::ScoringParams(
                "min_tvl_threshold must be positive".into(),
            ));
        }
        if self.pool_maturity_days < 0 {
            return Err(AppError::ScoringParams(
                "pool_maturity_days cannot be negative".into(),
            ));
        }
        if self.continuity_lookback_days <= 0 {
            return Err(AppError::ScoringParams(
                "continuity_lookback_days must be positive".into(),
            ));
        }
        if !self.il_holding_period_years.is_finite() || self.il_holding_period_years <= 0.0 {
            return Err(AppError::ScoringParams(
                "il_holding_period_years must be positive".into(),
            ));
        }
        if !self.il_confidence_factor.is_finite() || self.il_confidence_factor <= 0.0 {
            return Err(AppError::ScoringParams(
                "il_confidence_factor must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.smart_shield_reduction_factor) {
            return Err(AppError::ScoringParams(
                "smart_shield_reduction_factor must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Planner-side validation of rebalance, slippage, and reduction
    /// parameters.
    pub fn validate_planning(&self) -> Result<(), AppError> {
        if !self.rebalance_threshold_pct.is_finite() || self.rebalance_threshold_pct < 0.0 {
            return Err(AppError::ScoringParams(
                "rebalance_threshold_pct must be finite and non-negative".into(),
            ));
        }
        if self.rebalance_threshold_pct > 100.0 {
            return Err(AppError::ScoringParams(
                "rebalance_threshold_pct cannot exceed 100".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.max_withdraw_pct_per_cycle)
            || !self.max_withdraw_pct_per_cycle.is_finite()
        {
            return Err(AppError::ScoringParams(
                "max_withdraw_pct_per_cycle must be within [0, 100]".into(),
            ));
        }
        if !self.min_liquid_usdc_buffer.is_finite() || self.min_liquid_usdc_buffer < 0.0 {
            return Err(AppError::ScoringParams(
                "min_liquid_usdc_buffer must be finite and non-negative".into(),
            ));
        }
        for (value, name) in [
            (self.smart_shield_slippage_pct, "smart_shield_slippage_pct"),
            (self.normal_pool_slippage_pct, "normal_pool_slippage_pct"),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(AppError::ScoringParams(format!(
                    "{name} must be within [0, 100]"
                )));
            }
        }
        for (value, name) in [
            (self.swap_reduction_factor, "swap_reduction_factor"),
            (self.deposit_reduction_factor, "deposit_reduction_factor"),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(AppError::ScoringParams(format!(
                    "{name} must be within (0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Allocation constraint validation, checked before the allocator runs.
    pub fn validate_allocation(&self) -> Result<(), AppError> {
        if self.max_pools == 0 {
            return Err(AppError::AllocationConstraints(
                "max_pools must be positive".into(),
            ));
        }
        if !self.min_allocation.is_finite() || self.min_allocation < 0.0 {
            return Err(AppError::AllocationConstraints(
                "min_allocation must be finite and non-negative".into(),
            ));
        }
        if !self.max_allocation.is_finite() || self.max_allocation <= 0.0 {
            return Err(AppError::AllocationConstraints(
                "max_allocation must be positive".into(),
            ));
        }
        if self.min_allocation > self.max_allocation {
            return Err(AppError::AllocationConstraints(format!(
                "min_allocation ({:.4}) cannot exceed max_allocation ({:.4})",
                self.min_allocation, self.max_allocation
            )));
        }
        if !self.forced_allocation_minimum.is_finite()
            || !(0.0..=1.0).contains(&self.forced_allocation_minimum)
        {
            return Err(AppError::AllocationConstraints(
                "forced_allocation_minimum must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.validate_scoring()?;
        self.validate_planning()?;
        self.validate_allocation()
    }
}
