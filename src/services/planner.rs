// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::convert::{amount_to_f64, f64_to_amount, scale_amount};
use crate::domain::constants::{DUST_THRESHOLD_USD, USDC_SYMBOL, VIABLE_AMOUNT_MAX_RETRIES};
use crate::domain::error::AppError;
use crate::domain::params::ScoringParameters;
use crate::domain::pool::{Pool, PoolId};
use crate::domain::position::{Coin, Position, SubAction};
use crate::domain::token::Token;
use crate::infrastructure::network::simulator::{JoinEstimate, Simulator, SwapEstimate};
use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::{BigInt, Sign};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

/// Everything the planner reads for one cycle. Borrowed immutably; the
/// planner never mutates vault state.
pub struct PlanInput<'a> {
    pub current_positions: &'a [Position],
    pub liquid_usdc: f64,
    pub target_allocations: &'a BTreeMap<PoolId, f64>,
    pub total_vault_value_usd: f64,
    pub pools: &'a HashMap<PoolId, Pool>,
    pub tokens: &'a HashMap<String, Token>,
}

/// The two ordered phases of a plan: withdrawals plus consolidation
/// swaps, then single-sided USDC deposits.
#[derive(Clone, Debug, Default)]
pub struct PlanPhases {
    pub withdrawals: Vec<SubAction>,
    pub deposits: Vec<SubAction>,
}

impl PlanPhases {
    pub fn is_empty(&self) -> bool {
        self.withdrawals.is_empty() && self.deposits.is_empty()
    }
}

/// A pool-level intent before it is sized and simulated.
#[derive(Clone, Debug)]
struct PendingAction {
    pool_id: PoolId,
    delta_usd: f64,
    target_lp_shares: BigInt,
}

/// Turns target allocations into an executable two-phase plan. Every
/// action is sized against a fresh simulation; any simulation error
/// aborts planning so a partial plan is never broadcast.
pub struct Planner {
    simulator: Arc<dyn Simulator>,
    params: ScoringParameters,
}

impl Planner {
    pub fn new(simulator: Arc<dyn Simulator>, params: ScoringParameters) -> Self {
        Self { simulator, params }
    }

    pub async fn generate_plan(&self, input: &PlanInput<'_>) -> Result<PlanPhases, AppError> {
        self.validate_input(input)?;

        let mut total_value = input.total_vault_value_usd;
        if total_value <= 0.0 && input.liquid_usdc <= 0.0 {
            tracing::info!("vault is empty, nothing to plan");
            return Ok(PlanPhases::default());
        }
        if total_value <= 0.0 {
            total_value = input.liquid_usdc;
            tracing::info!(total_value, "vault has no positions, planning from liquid USDC");
        }

        let usdc = usdc_token(input.tokens)?;
        tracing::info!(
            usdc_denom = %usdc.ibc_denom,
            liquid_usdc = input.liquid_usdc,
            total_value,
            "planning rebalance"
        );

        let (mut withdrawals, deposits) = self.analyze_required_changes(input, total_value)?;
        self.apply_withdrawal_cap(&mut withdrawals, total_value);

        let mut simulated_liquid = input.liquid_usdc;

        let (withdrawal_actions, non_usdc_assets) = self
            .process_withdrawals(&withdrawals, input, &usdc, &mut simulated_liquid)
            .await?;

        let consolidation_actions = self
            .process_consolidation(&non_usdc_assets, &usdc, &mut simulated_liquid)
            .await?;

        let deposit_actions = self
            .process_deposits(&deposits, input, &usdc, &mut simulated_liquid)
            .await?;

        let mut phase_one = withdrawal_actions;
        phase_one.extend(consolidation_actions);

        tracing::info!(
            withdrawals_and_swaps = phase_one.len(),
            deposits = deposit_actions.len(),
            projected_liquid = simulated_liquid,
            "action plan generated"
        );
        Ok(PlanPhases {
            withdrawals: phase_one,
            deposits: deposit_actions,
        })
    }

    fn validate_input(&self, input: &PlanInput<'_>) -> Result<(), AppError> {
        if !input.liquid_usdc.is_finite() || input.liquid_usdc < 0.0 {
            return Err(AppError::PoolData(format!(
                "liquid USDC {} is invalid",
                input.liquid_usdc
            )));
        }
        if !input.total_vault_value_usd.is_finite() {
            return Err(AppError::PoolData(format!(
                "total vault value {} is invalid",
                input.total_vault_value_usd
            )));
        }

        let mut total_allocation = 0.0;
        for (&pool_id, &allocation) in input.target_allocations {
            if !allocation.is_finite() || !(0.0..=1.0).contains(&allocation) {
                return Err(AppError::AllocationConstraints(format!(
                    "allocation {allocation} for pool {pool_id} out of [0, 1]"
                )));
            }
            total_allocation += allocation;
        }
        if !input.target_allocations.is_empty() && (total_allocation - 1.0).abs() > 0.01 {
            return Err(AppError::AllocationConstraints(format!(
                "target allocations sum to {total_allocation:.6}, expected 1.0"
            )));
        }

        for (index, position) in input.current_positions.iter().enumerate() {
            if position.pool_id == 0 {
                return Err(AppError::PoolData(format!(
                    "position {index} has pool id zero"
                )));
            }
            if position.lp_shares.sign() == Sign::Minus {
                return Err(AppError::PoolData(format!(
                    "position {index} has negative LP shares"
                )));
            }
            if !position.usd_value.is_finite() || position.usd_value < 0.0 {
                return Err(AppError::PoolData(format!(
                    "position {index} has invalid value {}",
                    position.usd_value
                )));
            }
        }

        if input.tokens.is_empty() {
            return Err(AppError::DataMissing("token map is empty".into()));
        }
        self.params.validate_planning()
    }

    /// Union of held and targeted pools, classified into withdrawals and
    /// deposits by percentage deviation from target.
    fn analyze_required_changes(
        &self,
        input: &PlanInput<'_>,
        total_value: f64,
    ) -> Result<(Vec<PendingAction>, Vec<PendingAction>), AppError> {
        let mut all_pool_ids: HashSet<PoolId> = input.target_allocations.keys().copied().collect();
        all_pool_ids.extend(input.current_positions.iter().map(|p| p.pool_id));

        let mut withdrawals = Vec::new();
        let mut deposits = Vec::new();

        for pool_id in all_pool_ids {
            let current_usd = find_position(input.current_positions, pool_id)
                .map(|p| p.usd_value)
                .unwrap_or(0.0);
            let target_usd =
                total_value * input.target_allocations.get(&pool_id).copied().unwrap_or(0.0);

            let delta_usd = target_usd - current_usd;
            let delta_pct = if target_usd > 0.0 {
                (delta_usd / target_usd) * 100.0
            } else if current_usd > 0.0 {
                -100.0
            } else {
                0.0
            };
            if !delta_pct.is_finite() {
                return Err(AppError::Math(format!(
                    "delta percentage for pool {pool_id} is not finite"
                )));
            }

            tracing::debug!(
                pool_id,
                current_usd,
                target_usd,
                delta_pct,
                threshold = self.params.rebalance_threshold_pct,
                "pool deviation"
            );

            if delta_pct < -self.params.rebalance_threshold_pct {
                withdrawals.push(PendingAction {
                    pool_id,
                    delta_usd,
                    target_lp_shares: target_shares(target_usd, pool_id, input.pools)?,
                });
            } else if delta_pct > self.params.rebalance_threshold_pct {
                deposits.push(PendingAction {
                    pool_id,
                    delta_usd,
                    target_lp_shares: target_shares(target_usd, pool_id, input.pools)?,
                });
            }
        }

        Ok((withdrawals, deposits))
    }

    /// Cap the combined withdrawal volume per cycle. Deposits stay
    /// uncapped; exits are what move markets and realize slippage.
    fn apply_withdrawal_cap(&self, withdrawals: &mut [PendingAction], total_value: f64) {
        let cap_usd = total_value * self.params.max_withdraw_pct_per_cycle / 100.0;
        let total_withdraw_usd: f64 = withdrawals.iter().map(|w| w.delta_usd.abs()).sum();
        if total_withdraw_usd <= cap_usd {
            return;
        }

        let scale = cap_usd / total_withdraw_usd;
        tracing::warn!(
            total_withdraw_usd,
            cap_usd,
            scale,
            "withdrawals exceed per-cycle cap, scaling down"
        );
        for withdrawal in withdrawals.iter_mut() {
            withdrawal.delta_usd *= scale;
        }
    }

    async fn process_withdrawals(
        &self,
        withdrawals: &[PendingAction],
        input: &PlanInput<'_>,
        usdc: &Token,
        simulated_liquid: &mut f64,
    ) -> Result<(Vec<SubAction>, BTreeMap<String, BigInt>), AppError> {
        let mut actions = Vec::new();
        let mut non_usdc: BTreeMap<String, BigInt> = BTreeMap::new();

        // Largest reduction first (delta is negative for withdrawals).
        let mut ordered: Vec<&PendingAction> = withdrawals.iter().collect();
        ordered.sort_by(|a, b| a.delta_usd.total_cmp(&b.delta_usd));

        for withdrawal in ordered {
            let Some(position) = find_position(input.current_positions, withdrawal.pool_id) else {
                tracing::warn!(pool_id = withdrawal.pool_id, "no position for withdrawal, skipping");
                continue;
            };

            // When the cap scaled this withdrawal down, re-derive the kept
            // share target from the scaled delta instead of the original.
            let scaled_target_usd = (position.usd_value + withdrawal.delta_usd).max(0.0);
            let target_shares_now = if scaled_target_usd > 0.0 {
                target_shares(scaled_target_usd, withdrawal.pool_id, input.pools)?
            } else {
                withdrawal.target_lp_shares.clone()
            };

            let shares_to_withdraw = &position.lp_shares - &target_shares_now;
            if shares_to_withdraw.sign() != Sign::Plus {
                tracing::debug!(pool_id = withdrawal.pool_id, "no shares to withdraw, skipping");
                continue;
            }

            let pool = input.pools.get(&withdrawal.pool_id).ok_or_else(|| {
                AppError::DataMissing(format!(
                    "pool {} data missing for withdrawal",
                    withdrawal.pool_id
                ))
            })?;

            let estimate = self
                .simulator
                .simulate_exit(withdrawal.pool_id, &shares_to_withdraw, Some(&usdc.ibc_denom))
                .await?;
            if !estimate.slippage.is_finite() || estimate.slippage < 0.0 {
                return Err(AppError::Simulation(format!(
                    "exit estimation slippage {} invalid for pool {}",
                    estimate.slippage, withdrawal.pool_id
                )));
            }
            if estimate.amounts_out.is_empty() {
                return Err(AppError::Simulation(format!(
                    "exit estimation returned no amounts for pool {}",
                    withdrawal.pool_id
                )));
            }

            let limit = slippage_limit(pool, &self.params);
            if estimate.slippage > limit {
                // Rebalancing out of a bad pool beats being stuck in it;
                // the tolerance still rides on the message min-outs.
                tracing::warn!(
                    pool_id = withdrawal.pool_id,
                    slippage = estimate.slippage,
                    limit,
                    "exit slippage above limit, proceeding for rebalance"
                );
            }

            for coin in &estimate.amounts_out {
                if coin.denom == usdc.ibc_denom {
                    *simulated_liquid += amount_to_f64(&coin.amount, usdc.precision)?;
                } else {
                    non_usdc
                        .entry(coin.denom.clone())
                        .and_modify(|existing| *existing += &coin.amount)
                        .or_insert_with(|| coin.amount.clone());
                }
            }

            tracing::info!(
                pool_id = withdrawal.pool_id,
                shares = %shares_to_withdraw,
                slippage = estimate.slippage,
                "withdrawal action created"
            );
            actions.push(SubAction::WithdrawLp {
                pool_id: withdrawal.pool_id,
                shares_in: shares_to_withdraw,
                target_denom_on_exit: Some(usdc.ibc_denom.clone()),
                expected_amounts_out: estimate.amounts_out,
                expected_slippage: estimate.slippage,
                slippage_tolerance_pct: limit,
            });
        }

        Ok((actions, non_usdc))
    }

    /// Swap every non-USDC exit residue into USDC, shrinking the amount
    /// until the swap fits inside the normal slippage limit. Denoms with
    /// no viable amount are left alone for a future cycle.
    async fn process_consolidation(
        &self,
        assets: &BTreeMap<String, BigInt>,
        usdc: &Token,
        simulated_liquid: &mut f64,
    ) -> Result<Vec<SubAction>, AppError> {
        let mut actions = Vec::new();
        if assets.is_empty() {
            return Ok(actions);
        }
        tracing::info!(denoms = assets.len(), "consolidating non-USDC proceeds");

        let limit = self.params.normal_pool_slippage_pct / 100.0;
        for (denom, amount) in assets {
            if amount.sign() != Sign::Plus {
                continue;
            }
            if *denom == usdc.ibc_denom {
                return Err(AppError::Math(
                    "USDC ended up in the consolidation map".into(),
                ));
            }

            match self.viable_swap_amount(denom, amount, &usdc.ibc_denom, limit).await {
                Some((estimate, final_amount)) => {
                    *simulated_liquid += amount_to_f64(&estimate.token_out, usdc.precision)?;
                    tracing::info!(
                        denom = %denom,
                        amount = %final_amount,
                        slippage = estimate.slippage,
                        "consolidation swap created"
                    );
                    actions.push(SubAction::Swap {
                        token_in: Coin::new(denom.clone(), final_amount),
                        token_out_denom: usdc.ibc_denom.clone(),
                        expected_out: estimate.token_out,
                        expected_slippage: estimate.slippage,
                        slippage_tolerance_pct: limit,
                    });
                }
                None => {
                    tracing::warn!(denom = %denom, "no viable swap amount, leaving asset for next cycle");
                }
            }
        }
        Ok(actions)
    }

    /// Bounded reduction search: try the full amount, then shrink by the
    /// configured factor until the simulated slippage fits or the amount
    /// dies out.
    async fn viable_swap_amount(
        &self,
        denom_in: &str,
        max_amount: &BigInt,
        denom_out: &str,
        max_slippage: f64,
    ) -> Option<(SwapEstimate, BigInt)> {
        let mut amount = max_amount.clone();
        for _ in 0..VIABLE_AMOUNT_MAX_RETRIES {
            if amount.sign() != Sign::Plus {
                break;
            }
            let candidate = Coin::new(denom_in.to_string(), amount.clone());
            match self.simulator.simulate_swap(&candidate, denom_out).await {
                Ok(estimate) if estimate.slippage <= max_slippage => {
                    return Some((estimate, amount));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(denom = denom_in, error = %e, "swap simulation failed during reduction");
                }
            }
            amount = scale_amount(&amount, self.params.swap_reduction_factor).ok()?;
        }
        None
    }

    async fn process_deposits(
        &self,
        deposits: &[PendingAction],
        input: &PlanInput<'_>,
        usdc: &Token,
        simulated_liquid: &mut f64,
    ) -> Result<Vec<SubAction>, AppError> {
        let mut actions = Vec::new();

        // Largest deposit first.
        let mut ordered: Vec<&PendingAction> = deposits.iter().collect();
        ordered.sort_by(|a, b| b.delta_usd.total_cmp(&a.delta_usd));

        for deposit in ordered {
            let pool = input.pools.get(&deposit.pool_id).ok_or_else(|| {
                AppError::DataMissing(format!("pool {} data missing for deposit", deposit.pool_id))
            })?;

            let mut target_usd = deposit.delta_usd;
            if target_usd <= 0.0 {
                continue;
            }

            // The liquid buffer survives every deposit.
            let available = (*simulated_liquid - self.params.min_liquid_usdc_buffer).max(0.0);
            if target_usd > available {
                tracing::warn!(
                    pool_id = deposit.pool_id,
                    wanted = target_usd,
                    available,
                    buffer = self.params.min_liquid_usdc_buffer,
                    "clamping deposit to preserve liquid buffer"
                );
                target_usd = available;
            }
            if target_usd < DUST_THRESHOLD_USD {
                tracing::debug!(pool_id = deposit.pool_id, target_usd, "deposit is dust, skipping");
                continue;
            }

            let usdc_amount = f64_to_amount(target_usd, usdc.precision)?;
            let limit = slippage_limit(pool, &self.params);

            let Some((estimate, final_amount)) = self
                .viable_deposit_amount(deposit.pool_id, &usdc.ibc_denom, usdc_amount, limit)
                .await
            else {
                tracing::warn!(pool_id = deposit.pool_id, "no viable deposit amount, skipping");
                continue;
            };

            let used_usd = amount_to_f64(&final_amount, usdc.precision)?;
            *simulated_liquid -= used_usd;

            tracing::info!(
                pool_id = deposit.pool_id,
                usdc = used_usd,
                slippage = estimate.slippage,
                "deposit action created"
            );
            actions.push(SubAction::DepositLp {
                pool_id: deposit.pool_id,
                amounts_in: vec![Coin::new(usdc.ibc_denom.clone(), final_amount)],
                expected_shares_out: estimate.shares_out,
                expected_slippage: estimate.slippage,
                slippage_tolerance_pct: limit,
            });
        }

        Ok(actions)
    }

    /// Deposits get exactly one reduction retry: single-sided joins move
    /// the pool in one direction, so shrinking once either fixes it or
    /// the pool is too thin this cycle.
    async fn viable_deposit_amount(
        &self,
        pool_id: PoolId,
        usdc_denom: &str,
        amount: BigInt,
        max_slippage: f64,
    ) -> Option<(JoinEstimate, BigInt)> {
        let full = vec![Coin::new(usdc_denom.to_string(), amount.clone())];
        match self.simulator.simulate_join(pool_id, &full).await {
            Ok(estimate) if estimate.slippage <= max_slippage => return Some((estimate, amount)),
            Ok(estimate) => {
                tracing::debug!(pool_id, slippage = estimate.slippage, max_slippage, "full deposit over limit");
            }
            Err(e) => {
                tracing::debug!(pool_id, error = %e, "join simulation failed at full amount");
            }
        }

        let reduced = scale_amount(&amount, self.params.deposit_reduction_factor).ok()?;
        if reduced.sign() != Sign::Plus {
            return None;
        }
        let retry = vec![Coin::new(usdc_denom.to_string(), reduced.clone())];
        match self.simulator.simulate_join(pool_id, &retry).await {
            Ok(estimate) if estimate.slippage <= max_slippage => Some((estimate, reduced)),
            _ => None,
        }
    }
}

fn find_position(positions: &[Position], pool_id: PoolId) -> Option<&Position> {
    positions.iter().find(|p| p.pool_id == pool_id)
}

fn slippage_limit(pool: &Pool, params: &ScoringParameters) -> f64 {
    if pool.is_smart_shielded {
        params.smart_shield_slippage_pct / 100.0
    } else {
        params.normal_pool_slippage_pct / 100.0
    }
}

/// LP shares corresponding to a USD target, from the pool's share price
/// implied by TVL. Decimal arithmetic end to end; truncation toward zero.
fn target_shares(
    target_usd: f64,
    pool_id: PoolId,
    pools: &HashMap<PoolId, Pool>,
) -> Result<BigInt, AppError> {
    if target_usd <= 0.0 {
        return Ok(BigInt::from(0));
    }
    let pool = pools
        .get(&pool_id)
        .ok_or_else(|| AppError::DataMissing(format!("pool {pool_id} data not found")))?;
    if pool.total_shares.sign() != Sign::Plus {
        return Err(AppError::PoolData(format!(
            "pool {pool_id} has no outstanding shares"
        )));
    }
    if pool.tvl_usd <= 0.0 {
        return Err(AppError::PoolData(format!(
            "pool {pool_id} has invalid TVL {}",
            pool.tvl_usd
        )));
    }

    let ratio = target_usd / pool.tvl_usd;
    if !ratio.is_finite() {
        return Err(AppError::Math(format!(
            "share ratio for pool {pool_id} is not finite"
        )));
    }
    let ratio_dec = BigDecimal::from_str(&format!("{ratio:.18}"))
        .map_err(|e| AppError::Math(format!("share ratio: {e}")))?;
    let shares = (ratio_dec * BigDecimal::from(pool.total_shares.clone()))
        .with_scale_round(0, RoundingMode::Down);
    let (digits, _) = shares.into_bigint_and_exponent();
    Ok(digits)
}

fn usdc_token(tokens: &HashMap<String, Token>) -> Result<Token, AppError> {
    let usdc = tokens
        .values()
        .find(|t| t.symbol == USDC_SYMBOL)
        .cloned()
        .ok_or_else(|| AppError::DataMissing("USDC token configuration not found".into()))?;

    if usdc.ibc_denom.is_empty() {
        return Err(AppError::DataMissing("USDC denom is empty".into()));
    }
    if usdc.precision > 18 {
        return Err(AppError::PoolData(format!(
            "USDC precision {} is invalid",
            usdc.precision
        )));
    }
    if !usdc.price_usd.is_finite() || (usdc.price_usd - 1.0).abs() > 0.1 {
        return Err(AppError::PoolData(format!(
            "USDC price {} is too far from $1",
            usdc.price_usd
        )));
    }
    Ok(usdc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_shares_tracks_tvl_share() {
        let mut pools = HashMap::new();
        let mut pool = Pool::default();
        pool.id = 1;
        pool.tvl_usd = 100_000.0;
        pool.total_shares = BigInt::from(1_000_000u64);
        pools.insert(1, pool);

        // 10% of TVL -> 10% of shares.
        assert_eq!(
            target_shares(10_000.0, 1, &pools).unwrap(),
            BigInt::from(100_000u64)
        );
        assert_eq!(target_shares(0.0, 1, &pools).unwrap(), BigInt::from(0));
    }

    #[test]
    fn target_shares_requires_pool_data() {
        let pools = HashMap::new();
        assert!(matches!(
            target_shares(5.0, 9, &pools),
            Err(AppError::DataMissing(_))
        ));
    }

    #[test]
    fn slippage_limit_depends_on_shield() {
        let params = ScoringParameters::default_strategy();
        let mut pool = Pool::default();
        pool.is_smart_shielded = true;
        assert_eq!(slippage_limit(&pool, &params), 0.01);
        pool.is_smart_shielded = false;
        assert_eq!(slippage_limit(&pool, &params), 0.03);
    }

    #[test]
    fn usdc_token_rejects_depegged_price() {
        let mut tokens = HashMap::new();
        tokens.insert(
            "ibc/USDC".to_string(),
            Token {
                symbol: "USDC".into(),
                ibc_denom: "ibc/USDC".into(),
                precision: 6,
                price_usd: 0.7,
                ..Token::default()
            },
        );
        assert!(usdc_token(&tokens).is_err());
    }

    #[test]
    fn usdc_token_must_exist() {
        let tokens: HashMap<String, Token> = HashMap::new();
        assert!(matches!(
            usdc_token(&tokens),
            Err(AppError::DataMissing(_))
        ));
    }
}
