// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::analyzer::scoring::{score_pools, PoolScore};
use crate::analyzer::selection::{determine_target_allocations, select_top_pools};
use crate::domain::constants::DEFAULT_SCORING_CONFIG_NAME;
use crate::domain::error::AppError;
use crate::domain::params::ScoringParameters;
use crate::domain::pool::{Pool, PoolId};
use crate::domain::position::{ActionPlan, ActionReceipt, Position, SubAction};
use crate::domain::snapshot::{CycleSnapshot, PositionSnapshot};
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::pools::MarketDataProvider;
use crate::infrastructure::network::simulator::Simulator;
use crate::services::planner::{PlanInput, Planner};
use crate::services::vault::VaultExecutor;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Drives the per-cycle state machine:
///
/// fetch data -> read vault -> score -> select -> allocate -> plan ->
/// execute withdrawals -> execute deposits -> record snapshot
///
/// Steps run strictly in order; any failure aborts the cycle and records
/// a snapshot with final state equal to initial state. Exactly one
/// snapshot is written per cycle, and the cycle counter advances exactly
/// once at entry.
pub struct Engine {
    market: Arc<dyn MarketDataProvider>,
    vault: Arc<dyn VaultExecutor>,
    simulator: Arc<dyn Simulator>,
    store: Database,
    params: ScoringParameters,
    config_name: String,
    interval: Duration,
    cancel: CancellationToken,
}

/// Vault state captured around an execution phase, used to derive the
/// realized USD amount per action.
struct VaultStateCapture {
    positions: Vec<Position>,
    liquid_usdc: f64,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        vault: Arc<dyn VaultExecutor>,
        simulator: Arc<dyn Simulator>,
        store: Database,
        params: ScoringParameters,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, AppError> {
        params.validate()?;
        Ok(Self {
            market,
            vault,
            simulator,
            store,
            params,
            config_name: DEFAULT_SCORING_CONFIG_NAME.to_string(),
            interval,
            cancel,
        })
    }

    pub fn with_config_name(mut self, config_name: &str) -> Self {
        self.config_name = config_name.to_string();
        self
    }

    /// Main loop: run one cycle immediately, then on every tick until
    /// cancelled. Cycles never overlap.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "engine loop starting");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("engine loop stopped by cancellation");
                    return;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// One full rebalancing cycle. Errors are handled internally; the
    /// loop keeps running regardless of per-cycle outcomes.
    pub async fn run_cycle(&self) {
        let cycle_number = match self.store.increment_cycle_counter().await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "cannot obtain cycle number, skipping cycle");
                return;
            }
        };
        let span = tracing::info_span!("cycle", cycle_id = cycle_number);
        self.run_numbered_cycle(cycle_number).instrument(span).await;
    }

    async fn run_numbered_cycle(&self, cycle_number: i64) {
        tracing::info!("--- cycle starting ---");

        let params_id = self
            .store
            .active_params_id(&self.config_name)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "active params id unavailable");
                None
            });
        let mut snapshot = CycleSnapshot::new(cycle_number, Utc::now(), params_id);

        match self.execute_cycle(&mut snapshot).await {
            Ok(()) => tracing::info!("--- cycle complete ---"),
            Err(e) => {
                tracing::error!(error = %e, "cycle aborted");
                // Failure path: final state mirrors initial state, zero
                // efficiency, but whatever tx hashes were obtained stay.
                snapshot.final_vault_usd = snapshot.initial_vault_usd;
                snapshot.final_liquid_usdc = snapshot.initial_liquid_usdc;
                snapshot.final_positions = snapshot.initial_positions.clone();
                snapshot.allocation_efficiency_pct = 0.0;
                snapshot.net_return_usd = 0.0;
                snapshot.total_slippage_usd = 0.0;
                self.save_snapshot(&snapshot).await;
            }
        }
    }

    async fn execute_cycle(&self, snapshot: &mut CycleSnapshot) -> Result<(), AppError> {
        // Step 1: upstream data.
        self.check_cancelled()?;
        tracing::info!("step 1: fetching market data");
        let tradable = self.vault.tradable_denoms().await?;
        tracing::info!(denoms = tradable.len(), "tradable denoms loaded");
        let market = self.market.snapshot(&tradable).await?;
        let mut pools_by_id: HashMap<PoolId, Pool> =
            market.pools.iter().map(|p| (p.id, p.clone())).collect();

        // Step 2: vault state.
        self.check_cancelled()?;
        tracing::info!("step 2: reading vault state");
        let positions = self.vault.pool_positions().await?;
        let liquid_usdc = self.vault.liquid_usdc().await?;
        let total_value = self.vault.total_vault_value_usd().await?;
        let non_pool = self.vault.non_pool_positions().await?;
        if !non_pool.is_empty() {
            tracing::info!(
                count = non_pool.len(),
                value_usd = non_pool.iter().map(|p| p.usd_value).sum::<f64>(),
                "vault holds non-pool token balances"
            );
        }

        // Augment pools with position state for continuity scoring.
        for position in &positions {
            if let Some(pool) = pools_by_id.get_mut(&position.pool_id) {
                pool.has_position = true;
                pool.position_age_days = position.age_days;
                pool.position_value_usd = position.usd_value;
            }
        }
        let pools: Vec<Pool> = pools_by_id.values().cloned().collect();

        snapshot.initial_vault_usd = total_value;
        snapshot.initial_liquid_usdc = liquid_usdc;
        snapshot.initial_positions =
            position_snapshots(&positions, &pools_by_id, total_value, &HashMap::new());
        tracing::info!(
            positions = positions.len(),
            liquid_usdc,
            total_value,
            "vault state captured"
        );

        // Step 3: score, select, allocate.
        self.check_cancelled()?;
        tracing::info!("step 3: scoring and allocation");
        let scored = score_pools(&pools, &self.params)?;
        let scores_by_id: HashMap<PoolId, PoolScore> =
            scored.iter().map(|s| (s.pool_id, *s)).collect();
        let (selected, forced_pool) = select_top_pools(&scored, &self.params, &pools_by_id)?;

        if selected.is_empty() {
            tracing::info!("no pools selected, recording no-op cycle");
            self.finalize_unchanged(snapshot, total_value, liquid_usdc, &positions, &pools_by_id, &scores_by_id);
            snapshot.allocation_efficiency_pct = 100.0;
            snapshot.action_plan = ActionPlan {
                goal: "no rebalancing: no pools selected".into(),
                sub_actions: Vec::new(),
                estimated_net_usd_change: 0.0,
            };
            self.save_snapshot(snapshot).await;
            return Ok(());
        }

        let targets =
            determine_target_allocations(&selected, &scores_by_id, &self.params, forced_pool)?;
        snapshot.target_allocations = targets.clone();
        tracing::info!(selected = selected.len(), "allocation targets computed");

        // Step 4: plan.
        self.check_cancelled()?;
        tracing::info!("step 4: planning actions");
        let planner = Planner::new(self.simulator.clone(), self.params.clone());
        let plan = planner
            .generate_plan(&PlanInput {
                current_positions: &positions,
                liquid_usdc,
                target_allocations: &targets,
                total_vault_value_usd: total_value,
                pools: &pools_by_id,
                tokens: &market.tokens,
            })
            .await?;

        snapshot.action_plan = ActionPlan {
            goal: "rebalance to target allocations".into(),
            sub_actions: plan
                .withdrawals
                .iter()
                .chain(plan.deposits.iter())
                .cloned()
                .collect(),
            estimated_net_usd_change: 0.0,
        };

        if plan.is_empty() {
            tracing::info!("plan is empty, recording no-op cycle");
            self.finalize_unchanged(snapshot, total_value, liquid_usdc, &positions, &pools_by_id, &scores_by_id);
            snapshot.allocation_efficiency_pct =
                allocation_efficiency(&snapshot.final_positions, &targets);
            self.save_snapshot(snapshot).await;
            return Ok(());
        }
        tracing::info!(
            withdrawals = plan.withdrawals.len(),
            deposits = plan.deposits.len(),
            "action plan ready"
        );

        // Step 5: execute, withdrawals strictly before deposits.
        self.check_cancelled()?;
        let mut total_gas_usd = 0.0;
        self.execute_phase("withdrawal/consolidation", &plan.withdrawals, snapshot, &mut total_gas_usd)
            .await?;
        self.execute_phase("deposit", &plan.deposits, snapshot, &mut total_gas_usd)
            .await?;

        // Step 6: final state and performance metrics.
        tracing::info!("step 6: capturing final state");
        let final_liquid = self.vault.liquid_usdc().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "final liquid USDC read failed, reusing initial");
            liquid_usdc
        });
        let final_positions = self.vault.pool_positions().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "final positions read failed, reusing initial");
            positions.clone()
        });
        let final_total = self.vault.total_vault_value_usd().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "final vault value read failed, reusing initial");
            total_value
        });

        let net_return = final_total - total_value;
        // Value lost beyond gas is realized slippage.
        let total_slippage = (-(net_return + total_gas_usd)).max(0.0);

        snapshot.final_vault_usd = final_total;
        snapshot.final_liquid_usdc = final_liquid;
        snapshot.final_positions =
            position_snapshots(&final_positions, &pools_by_id, final_total, &scores_by_id);
        snapshot.allocation_efficiency_pct =
            allocation_efficiency(&snapshot.final_positions, &targets);
        snapshot.net_return_usd = net_return;
        snapshot.total_slippage_usd = total_slippage;
        snapshot.total_gas_fee_usd = total_gas_usd;

        tracing::info!(
            final_total,
            final_liquid,
            net_return,
            total_slippage,
            total_gas_usd,
            efficiency = snapshot.allocation_efficiency_pct,
            "cycle metrics"
        );
        self.save_snapshot(snapshot).await;
        Ok(())
    }

    /// Execute one phase of the plan, capturing vault state before and
    /// after to attach realized USD amounts to the receipts.
    async fn execute_phase(
        &self,
        label: &str,
        actions: &[SubAction],
        snapshot: &mut CycleSnapshot,
        total_gas_usd: &mut f64,
    ) -> Result<(), AppError> {
        if actions.is_empty() {
            return Ok(());
        }
        tracing::info!(phase = label, actions = actions.len(), "executing phase");

        let before = self.capture_vault_state().await?;
        let result = self.vault.execute_action_plan(actions).await?;
        snapshot.tx_hashes.push(result.tx_hash.clone());
        *total_gas_usd += result.gas_fee_usd;
        let after = self.capture_vault_state().await?;

        for action in actions {
            let actual = actual_amount_usd(action, &before, &after);
            snapshot.action_receipts.push(ActionReceipt {
                sub_action: action.clone(),
                success: true,
                message: format!("{label} executed"),
                timestamp: Utc::now(),
                actual_amount_usd: actual,
            });
            tracing::info!(
                phase = label,
                kind = action.kind(),
                pool_id = action.pool_id().unwrap_or(0),
                actual_usd = actual,
                "action receipt recorded"
            );
        }

        tracing::info!(phase = label, tx_hash = %result.tx_hash, "phase complete");
        Ok(())
    }

    async fn capture_vault_state(&self) -> Result<VaultStateCapture, AppError> {
        Ok(VaultStateCapture {
            positions: self.vault.pool_positions().await?,
            liquid_usdc: self.vault.liquid_usdc().await?,
        })
    }

    fn finalize_unchanged(
        &self,
        snapshot: &mut CycleSnapshot,
        total_value: f64,
        liquid_usdc: f64,
        positions: &[Position],
        pools: &HashMap<PoolId, Pool>,
        scores: &HashMap<PoolId, PoolScore>,
    ) {
        snapshot.final_vault_usd = total_value;
        snapshot.final_liquid_usdc = liquid_usdc;
        snapshot.final_positions = position_snapshots(positions, pools, total_value, scores);
        snapshot.net_return_usd = 0.0;
        snapshot.total_slippage_usd = 0.0;
        snapshot.total_gas_fee_usd = 0.0;
    }

    async fn save_snapshot(&self, snapshot: &CycleSnapshot) {
        match self.store.save_cycle_snapshot(snapshot).await {
            Ok(id) => tracing::info!(snapshot_id = id, "snapshot persisted"),
            Err(e) => tracing::error!(error = %e, "failed to persist cycle snapshot"),
        }
    }

    fn check_cancelled(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Config("cycle cancelled between steps".into()));
        }
        Ok(())
    }
}

/// Realized USD amount of an action from the state delta around its
/// phase. Position value change is the primary measure; the liquid-USDC
/// delta is the fallback.
fn actual_amount_usd(
    action: &SubAction,
    before: &VaultStateCapture,
    after: &VaultStateCapture,
) -> f64 {
    let position_value = |capture: &VaultStateCapture, pool_id: PoolId| -> f64 {
        capture
            .positions
            .iter()
            .find(|p| p.pool_id == pool_id)
            .map(|p| p.usd_value)
            .unwrap_or(0.0)
    };
    let usdc_delta = after.liquid_usdc - before.liquid_usdc;

    let value = match action {
        SubAction::WithdrawLp { pool_id, .. } => {
            let reduction = position_value(before, *pool_id) - position_value(after, *pool_id);
            if reduction > 0.0 {
                reduction
            } else {
                usdc_delta.max(0.0)
            }
        }
        SubAction::DepositLp { pool_id, .. } => {
            let increase = position_value(after, *pool_id) - position_value(before, *pool_id);
            if increase > 0.0 {
                increase
            } else {
                (-usdc_delta).max(0.0)
            }
        }
        SubAction::Swap { .. } => usdc_delta.abs(),
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Denormalized per-position snapshot rows.
fn position_snapshots(
    positions: &[Position],
    pools: &HashMap<PoolId, Pool>,
    total_value: f64,
    scores: &HashMap<PoolId, PoolScore>,
) -> Vec<PositionSnapshot> {
    positions
        .iter()
        .map(|position| {
            let pool = pools.get(&position.pool_id);
            PositionSnapshot {
                pool_id: position.pool_id,
                lp_shares: position.lp_shares.to_string(),
                usd_value: position.usd_value,
                allocation_pct: if total_value > 0.0 {
                    position.usd_value / total_value * 100.0
                } else {
                    0.0
                },
                age_days: position.age_days,
                token_a: pool.map(|p| p.token_a.symbol.clone()).unwrap_or_default(),
                token_b: pool.map(|p| p.token_b.symbol.clone()).unwrap_or_default(),
                pool_tvl_usd: pool.map(|p| p.tvl_usd).unwrap_or(0.0),
                pool_score: scores
                    .get(&position.pool_id)
                    .map(|s| s.score)
                    .unwrap_or(0.0),
            }
        })
        .collect()
}

/// 100 minus the total percentage-point deviation between targets and
/// realized allocations, clamped to [0, 100]. Perfect when there are no
/// targets.
fn allocation_efficiency(
    final_positions: &[PositionSnapshot],
    targets: &BTreeMap<PoolId, f64>,
) -> f64 {
    if targets.is_empty() {
        return 100.0;
    }
    let actual: HashMap<PoolId, f64> = final_positions
        .iter()
        .map(|p| (p.pool_id, p.allocation_pct / 100.0))
        .collect();

    let total_deviation: f64 = targets
        .iter()
        .map(|(pool_id, target)| (target - actual.get(pool_id).copied().unwrap_or(0.0)).abs())
        .sum();

    (100.0 - total_deviation * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn position_snapshot(pool_id: PoolId, allocation_pct: f64) -> PositionSnapshot {
        PositionSnapshot {
            pool_id,
            lp_shares: "1".into(),
            usd_value: 0.0,
            allocation_pct,
            age_days: 0,
            token_a: String::new(),
            token_b: String::new(),
            pool_tvl_usd: 0.0,
            pool_score: 0.0,
        }
    }

    #[test]
    fn efficiency_is_perfect_without_targets() {
        assert_eq!(allocation_efficiency(&[], &BTreeMap::new()), 100.0);
    }

    #[test]
    fn efficiency_penalizes_deviation() {
        let targets = BTreeMap::from([(1u64, 0.6), (2u64, 0.4)]);
        let exact = vec![position_snapshot(1, 60.0), position_snapshot(2, 40.0)];
        assert!((allocation_efficiency(&exact, &targets) - 100.0).abs() < 1e-9);

        let off = vec![position_snapshot(1, 50.0), position_snapshot(2, 40.0)];
        // 10 percentage points off -> 90.
        assert!((allocation_efficiency(&off, &targets) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn efficiency_clamps_at_zero() {
        let targets = BTreeMap::from([(1u64, 1.0)]);
        let wild = vec![position_snapshot(2, 300.0)];
        assert_eq!(allocation_efficiency(&wild, &targets), 0.0);
    }

    #[test]
    fn withdraw_actual_prefers_position_reduction() {
        let action = SubAction::WithdrawLp {
            pool_id: 1,
            shares_in: BigInt::from(10u64),
            target_denom_on_exit: None,
            expected_amounts_out: vec![],
            expected_slippage: 0.0,
            slippage_tolerance_pct: 0.01,
        };
        let before = VaultStateCapture {
            positions: vec![Position {
                pool_id: 1,
                lp_shares: BigInt::from(100u64),
                age_days: 5,
                usd_value: 1_000.0,
            }],
            liquid_usdc: 50.0,
        };
        let after = VaultStateCapture {
            positions: vec![Position {
                pool_id: 1,
                lp_shares: BigInt::from(50u64),
                age_days: 5,
                usd_value: 420.0,
            }],
            liquid_usdc: 620.0,
        };
        assert!((actual_amount_usd(&action, &before, &after) - 580.0).abs() < 1e-9);
    }

    #[test]
    fn swap_actual_uses_absolute_usdc_delta() {
        let action = SubAction::Swap {
            token_in: crate::domain::position::Coin::new("ibc/X", BigInt::from(5u64)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(4u64),
            expected_slippage: 0.0,
            slippage_tolerance_pct: 0.01,
        };
        let before = VaultStateCapture {
            positions: vec![],
            liquid_usdc: 100.0,
        };
        let after = VaultStateCapture {
            positions: vec![],
            liquid_usdc: 140.0,
        };
        assert!((actual_amount_usd(&action, &before, &after) - 40.0).abs() < 1e-9);
    }
}
