// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::params::ScoringParameters;
use crate::domain::pool::{Pool, PoolId};
use serde::{Deserialize, Serialize};

/// Component breakdown kept alongside the final score; persisted in
/// snapshots so a cycle's ranking can be audited later.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub weighted_apr: f64,
    pub il_risk: f64,
    pub annualized_volatility: f64,
    pub reward: f64,
    pub risk: f64,
    pub liquidity: f64,
    pub bonus: f64,
    pub sentiment_adjustment: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PoolScore {
    pub pool_id: PoolId,
    pub score: f64,
    pub components: ScoreComponents,
}

fn finite(value: f64, what: &str) -> Result<f64, AppError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::Math(format!("{what} produced non-finite {value}")))
    }
}

/// Weighted average of the three APR components using the configured
/// weights. Fails when the weights sum to zero or anything is non-finite.
pub fn weighted_apr(pool: &Pool, params: &ScoringParameters) -> Result<f64, AppError> {
    let total_weight = params.eden_weight + params.usdc_fee_weight + params.price_impact_weight;
    if !total_weight.is_finite() || total_weight <= 0.0 {
        return Err(AppError::ScoringParams(
            "total APR weight is non-positive".into(),
        ));
    }
    let weighted = pool.eden_apr * params.eden_weight
        + pool.usdc_fee_apr * params.usdc_fee_weight
        + pool.price_impact_apr * params.price_impact_weight;
    finite(weighted / total_weight, "weighted APR")
}

/// Reward = apr_coefficient · weighted_apr + volume_coefficient ·
/// log10(volume). A pool with zero volume contributes nothing from the
/// volume term instead of -inf; negative volume is a hard error.
pub fn reward_score(
    weighted_apr: f64,
    pool: &Pool,
    params: &ScoringParameters,
) -> Result<f64, AppError> {
    let apr_part = finite(params.apr_coefficient * weighted_apr, "APR reward part")?;

    if pool.volume_7d_usd < 0.0 {
        return Err(AppError::PoolData(format!(
            "pool {}: volume cannot be negative",
            pool.id
        )));
    }
    let volume_part = if pool.volume_7d_usd == 0.0 {
        tracing::debug!(pool_id = pool.id, "zero volume, reward uses APR only");
        0.0
    } else {
        let log_volume = finite(pool.volume_7d_usd.log10(), "log10 volume")?;
        finite(params.volume_coefficient * log_volume, "volume reward part")?
    };

    finite(apr_part + volume_part, "reward score")
}

/// IL ≈ confidence · σ² · T, reduced multiplicatively for shielded pools.
/// Zero volatility means zero IL.
pub fn il_risk(
    annualized_volatility: f64,
    is_smart_shielded: bool,
    params: &ScoringParameters,
) -> Result<f64, AppError> {
    if !annualized_volatility.is_finite() || annualized_volatility < 0.0 {
        return Err(AppError::Math(format!(
            "annualized volatility {annualized_volatility} invalid"
        )));
    }
    if annualized_volatility == 0.0 {
        return Ok(0.0);
    }

    let variance = finite(annualized_volatility.powi(2), "variance")?;
    let base = finite(
        params.il_confidence_factor * variance * params.il_holding_period_years,
        "IL base",
    )?;

    if is_smart_shielded && params.smart_shield_reduction_factor > 0.0 {
        let multiplier = 1.0 - params.smart_shield_reduction_factor;
        if multiplier < 0.0 {
            return Err(AppError::ScoringParams(
                "smart shield reduction factor exceeds 1".into(),
            ));
        }
        return finite(base * multiplier, "shielded IL");
    }
    Ok(base)
}

/// Linearly decaying penalty for pools younger than the maturity window.
/// Zero when the window is disabled or the pool is mature.
pub fn age_penalty(pool: &Pool, params: &ScoringParameters) -> Result<f64, AppError> {
    if params.pool_maturity_days == 0 || pool.age_days >= params.pool_maturity_days {
        return Ok(0.0);
    }
    let maturity_scale = pool.age_days as f64 / params.pool_maturity_days as f64;
    finite(
        params.new_pool_coefficient * (1.0 - maturity_scale),
        "age penalty",
    )
}

pub fn sentiment_adjustment(pool: &Pool, params: &ScoringParameters) -> Result<f64, AppError> {
    if pool.sentiment == 0.0 || params.sentiment_impact_factor == 0.0 {
        return Ok(0.0);
    }
    finite(
        pool.sentiment * params.sentiment_impact_factor,
        "sentiment adjustment",
    )
}

pub fn risk_score(
    il_risk: f64,
    age_penalty: f64,
    sentiment_adjustment: f64,
    pool: &Pool,
    params: &ScoringParameters,
) -> Result<f64, AppError> {
    let il_penalty = finite(params.il_risk_coefficient * il_risk, "IL penalty")?;
    let volatility_penalty = finite(
        params.volatility_coefficient * pool.token_a.volatility,
        "volatility penalty",
    )?;
    finite(
        il_penalty + volatility_penalty + age_penalty + sentiment_adjustment,
        "risk score",
    )
}

/// Liquidity = tvl_coefficient · log10(max(threshold, tvl)). Pools with
/// non-positive TVL cannot be scored.
pub fn liquidity_score(pool: &Pool, params: &ScoringParameters) -> Result<f64, AppError> {
    if params.min_tvl_threshold <= 0.0 {
        return Err(AppError::ScoringParams(
            "min_tvl_threshold must be positive".into(),
        ));
    }
    if pool.tvl_usd <= 0.0 {
        return Err(AppError::PoolData(format!(
            "pool {}: TVL must be positive for scoring",
            pool.id
        )));
    }
    let log_tvl = finite(
        params.min_tvl_threshold.max(pool.tvl_usd).log10(),
        "log10 TVL",
    )?;
    finite(params.tvl_coefficient * log_tvl, "liquidity score")
}

/// Flat bonus for shield protection plus a continuity bonus that scales
/// with how long the vault has already been in the pool.
pub fn bonus_score(pool: &Pool, params: &ScoringParameters) -> Result<f64, AppError> {
    let shield = if pool.is_smart_shielded {
        params.smart_shield_bonus
    } else {
        0.0
    };

    let continuity = if !pool.has_position {
        0.0
    } else {
        if params.continuity_lookback_days <= 0 {
            return Err(AppError::ScoringParams(
                "continuity_lookback_days must be positive".into(),
            ));
        }
        if pool.position_age_days < 0 {
            return Err(AppError::PoolData(format!(
                "pool {}: position age cannot be negative",
                pool.id
            )));
        }
        let scale =
            (pool.position_age_days as f64 / params.continuity_lookback_days as f64).min(1.0);
        finite(params.continuity_coefficient * scale, "continuity bonus")?
    };

    finite(shield + continuity, "bonus score")
}

/// Score one pool. Pure in `(pool, params)`; any non-finite intermediate
/// surfaces as a `Math` error so a bad pool aborts the cycle instead of
/// being ranked on garbage.
pub fn score_pool(pool: &Pool, params: &ScoringParameters) -> Result<PoolScore, AppError> {
    pool.validate()?;
    params.validate_scoring()?;

    let weighted_apr = weighted_apr(pool, params)?;
    let reward = reward_score(weighted_apr, pool, params)?;

    let age_penalty = age_penalty(pool, params)?;
    let sentiment = sentiment_adjustment(pool, params)?;
    let il = il_risk(pool.token_a.volatility, pool.is_smart_shielded, params)?;
    let risk = risk_score(il, age_penalty, sentiment, pool, params)?;

    let liquidity = liquidity_score(pool, params)?;
    let bonus = bonus_score(pool, params)?;

    let score = finite(reward + risk + liquidity + bonus, "final score")?;

    tracing::debug!(
        pool_id = pool.id,
        score,
        reward,
        risk,
        liquidity,
        bonus,
        "pool scored"
    );

    Ok(PoolScore {
        pool_id: pool.id,
        score,
        components: ScoreComponents {
            weighted_apr,
            il_risk: il,
            annualized_volatility: pool.token_a.volatility,
            reward,
            risk,
            liquidity,
            bonus,
            sentiment_adjustment: sentiment,
        },
    })
}

/// Score a batch, validating the parameters once up front. The first
/// failing pool fails the whole batch.
pub fn score_pools(pools: &[Pool], params: &ScoringParameters) -> Result<Vec<PoolScore>, AppError> {
    if pools.is_empty() {
        return Err(AppError::DataMissing("no pools provided for scoring".into()));
    }
    params.validate_scoring()?;

    let mut results = Vec::with_capacity(pools.len());
    for pool in pools {
        let result = score_pool(pool, params).map_err(|e| {
            AppError::PoolData(format!("pool {} scoring failed: {e}", pool.id))
        })?;
        results.push(result);
    }
    tracing::info!(pools = results.len(), "batch pool scoring complete");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::Token;
    use num_bigint::BigInt;

    fn token(symbol: &str, denom: &str, volatility: f64) -> Token {
        Token {
            symbol: symbol.into(),
            base_denom: denom.into(),
            ibc_denom: format!("ibc/{symbol}"),
            precision: 6,
            price_usd: 1.0,
            oracle_sourced: true,
            volatility,
            ..Token::default()
        }
    }

    fn pool(id: PoolId) -> Pool {
        Pool {
            id,
            token_a: token("ATOM", "uatom", 0.4),
            token_b: token("USDC", "uusdc", 0.0),
            balance_a: BigInt::from(1_000_000u64),
            balance_b: BigInt::from(1_000_000u64),
            weight_a: 0.5,
            weight_b: 0.5,
            tvl_usd: 250_000.0,
            volume_7d_usd: 1_000_000.0,
            eden_apr: 0.20,
            usdc_fee_apr: 0.06,
            price_impact_apr: 0.02,
            is_smart_shielded: false,
            swap_fee: 0.002,
            age_days: 90,
            sentiment: 0.0,
            total_shares: BigInt::from(1_000_000u64),
            has_position: false,
            position_age_days: 0,
            position_value_usd: 0.0,
        }
    }

    fn params() -> ScoringParameters {
        ScoringParameters::default_strategy()
    }

    #[test]
    fn scoring_is_deterministic() {
        let p = pool(1);
        let a = score_pool(&p, &params()).unwrap();
        let b = score_pool(&p, &params()).unwrap();
        assert_eq!(a.score, b.score);
        assert!(a.score.is_finite());
    }

    #[test]
    fn zero_volume_uses_apr_only() {
        let mut p = pool(2);
        let with_volume = score_pool(&p, &params()).unwrap();
        p.volume_7d_usd = 0.0;
        let without_volume = score_pool(&p, &params()).unwrap();
        let expected_drop =
            params().volume_coefficient * 1_000_000f64.log10();
        assert!(
            (with_volume.components.reward - without_volume.components.reward - expected_drop)
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn negative_volume_fails() {
        let mut p = pool(3);
        p.volume_7d_usd = -1.0;
        assert!(score_pool(&p, &params()).is_err());
    }

    #[test]
    fn zero_apr_weights_fail() {
        let p = pool(4);
        let mut cfg = params();
        cfg.eden_weight = 0.0;
        cfg.usdc_fee_weight = 0.0;
        cfg.price_impact_weight = 0.0;
        assert!(score_pool(&p, &cfg).is_err());
    }

    #[test]
    fn zero_volatility_means_zero_il() {
        assert_eq!(il_risk(0.0, false, &params()).unwrap(), 0.0);
    }

    #[test]
    fn shield_reduces_il() {
        let cfg = params();
        let open = il_risk(0.5, false, &cfg).unwrap();
        let shielded = il_risk(0.5, true, &cfg).unwrap();
        assert!(shielded < open);
        assert!(
            (shielded - open * (1.0 - cfg.smart_shield_reduction_factor)).abs() < 1e-12
        );
    }

    #[test]
    fn mature_pool_has_no_age_penalty() {
        let mut p = pool(5);
        p.age_days = params().pool_maturity_days;
        assert_eq!(age_penalty(&p, &params()).unwrap(), 0.0);
    }

    #[test]
    fn young_pool_penalty_decays_linearly() {
        let cfg = params();
        let mut p = pool(6);
        p.age_days = 0;
        let full = age_penalty(&p, &cfg).unwrap();
        assert!((full - cfg.new_pool_coefficient).abs() < 1e-12);
        p.age_days = cfg.pool_maturity_days / 2;
        let half = age_penalty(&p, &cfg).unwrap();
        assert!(half.abs() < full.abs());
    }

    #[test]
    fn continuity_bonus_caps_at_lookback() {
        let cfg = params();
        let mut p = pool(7);
        p.has_position = true;
        p.position_age_days = cfg.continuity_lookback_days * 3;
        let capped = bonus_score(&p, &cfg).unwrap();
        assert!((capped - cfg.continuity_coefficient).abs() < 1e-12);

        p.position_age_days = cfg.continuity_lookback_days / 2;
        let partial = bonus_score(&p, &cfg).unwrap();
        assert!(partial < capped);
    }

    #[test]
    fn no_position_means_no_continuity_bonus() {
        let mut p = pool(8);
        p.is_smart_shielded = true;
        let score = bonus_score(&p, &params()).unwrap();
        assert_eq!(score, params().smart_shield_bonus);
    }

    #[test]
    fn zero_tvl_fails_liquidity() {
        let mut p = pool(9);
        p.tvl_usd = 0.0;
        assert!(liquidity_score(&p, &params()).is_err());
    }

    #[test]
    fn tvl_below_threshold_is_floored() {
        let cfg = params();
        let mut p = pool(10);
        p.tvl_usd = 1.0;
        let floored = liquidity_score(&p, &cfg).unwrap();
        let expected = cfg.tvl_coefficient * cfg.min_tvl_threshold.log10();
        assert!((floored - expected).abs() < 1e-12);
    }

    #[test]
    fn sentiment_scales_linearly() {
        let cfg = params();
        let mut p = pool(13);
        p.sentiment = -1.0;
        let negative = sentiment_adjustment(&p, &cfg).unwrap();
        assert!((negative - (-1.0 * cfg.sentiment_impact_factor)).abs() < 1e-12);
        p.sentiment = 0.0;
        assert_eq!(sentiment_adjustment(&p, &cfg).unwrap(), 0.0);
    }

    #[test]
    fn risk_score_sums_its_parts() {
        let cfg = params();
        let p = pool(14);
        let il = il_risk(p.token_a.volatility, false, &cfg).unwrap();
        let risk = risk_score(il, -0.5, 0.1, &p, &cfg).unwrap();
        let expected = cfg.il_risk_coefficient * il
            + cfg.volatility_coefficient * p.token_a.volatility
            - 0.5
            + 0.1;
        assert!((risk - expected).abs() < 1e-12);
    }

    #[test]
    fn score_is_sum_of_components() {
        let p = pool(15);
        let result = score_pool(&p, &params()).unwrap();
        let c = result.components;
        assert!(
            (result.score - (c.reward + c.risk + c.liquidity + c.bonus)).abs() < 1e-12
        );
    }

    #[test]
    fn batch_fails_on_first_bad_pool() {
        let good = pool(11);
        let mut bad = pool(12);
        bad.volume_7d_usd = -5.0;
        let err = score_pools(&[good, bad], &params()).unwrap_err();
        assert!(err.to_string().contains("pool 12"));
    }
}
