// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

//! Shared mock implementations of the external boundaries: simulator,
//! vault executor, and market data.

#![allow(dead_code)]

use async_trait::async_trait;
use num_bigint::BigInt;
use oxidity_vault::domain::error::AppError;
use oxidity_vault::domain::pool::{Pool, PoolId};
use oxidity_vault::domain::position::{
    Coin, Position, SubAction, TokenPosition, TransactionResult,
};
use oxidity_vault::domain::token::Token;
use oxidity_vault::infrastructure::network::pools::{MarketDataProvider, MarketSnapshot};
use oxidity_vault::infrastructure::network::simulator::{
    ExitEstimate, JoinEstimate, Simulator, SwapEstimate,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const USDC_DENOM: &str = "ibc/USDC";
pub const USDC_PRECISION: u32 = 6;

pub fn usdc_token() -> Token {
    Token {
        symbol: "USDC".into(),
        base_denom: "uusdc".into(),
        ibc_denom: USDC_DENOM.into(),
        precision: USDC_PRECISION,
        price_usd: 1.0,
        oracle_sourced: true,
        price_series: Vec::new(),
        volatility: 0.0,
    }
}

pub fn volatile_token(symbol: &str, denom: &str) -> Token {
    Token {
        symbol: symbol.into(),
        base_denom: denom.into(),
        ibc_denom: format!("ibc/{symbol}"),
        precision: 6,
        price_usd: 5.0,
        oracle_sourced: true,
        price_series: Vec::new(),
        volatility: 0.3,
    }
}

/// A mature, liquid, unshielded pool paired against USDC.
pub fn pool(id: PoolId, symbol: &str, denom: &str) -> Pool {
    Pool {
        id,
        token_a: volatile_token(symbol, denom),
        token_b: usdc_token(),
        balance_a: BigInt::from(100_000_000_000u64),
        balance_b: BigInt::from(500_000_000_000u64),
        weight_a: 0.5,
        weight_b: 0.5,
        tvl_usd: 1_000_000.0,
        volume_7d_usd: 2_000_000.0,
        eden_apr: 0.18,
        usdc_fee_apr: 0.05,
        price_impact_apr: 0.01,
        is_smart_shielded: false,
        swap_fee: 0.0025,
        age_days: 180,
        sentiment: 0.0,
        total_shares: BigInt::from(1_000_000u64),
        has_position: false,
        position_age_days: 0,
        position_value_usd: 0.0,
    }
}

pub fn micro_usdc(usd: f64) -> BigInt {
    BigInt::from((usd * 1_000_000.0).round() as i64)
}

/// Scripted simulator. Exits come from a per-pool table; swap slippage
/// depends on the input amount crossing a threshold; joins have a flat
/// slippage unless told to fail.
pub struct MockSimulator {
    pub exits: HashMap<PoolId, ExitEstimate>,
    pub fail_exits: bool,
    pub join_slippage: f64,
    pub join_shares_out: BigInt,
    pub fail_joins: bool,
    /// Swap slippage is `high` at amounts above the threshold and `low`
    /// at or below it; no threshold means always `low`.
    pub swap_viable_at_or_below: Option<BigInt>,
    pub swap_low_slippage: f64,
    pub swap_high_slippage: f64,
    pub swap_calls: AtomicUsize,
}

impl Default for MockSimulator {
    fn default() -> Self {
        Self {
            exits: HashMap::new(),
            fail_exits: false,
            join_slippage: 0.01,
            join_shares_out: BigInt::from(10_000u64),
            fail_joins: false,
            swap_viable_at_or_below: None,
            swap_low_slippage: 0.01,
            swap_high_slippage: 0.05,
            swap_calls: AtomicUsize::new(0),
        }
    }
}

impl MockSimulator {
    pub fn with_usdc_exit(mut self, pool_id: PoolId, usd: f64, slippage: f64) -> Self {
        self.exits.insert(
            pool_id,
            ExitEstimate {
                amounts_out: vec![Coin::new(USDC_DENOM, micro_usdc(usd))],
                slippage,
                swap_fee: 0.0025,
                taker_fee: 0.0005,
                weight_balance_ratio: 0.0,
                weight_balance_reward: None,
            },
        );
        self
    }

    pub fn with_exit(mut self, pool_id: PoolId, estimate: ExitEstimate) -> Self {
        self.exits.insert(pool_id, estimate);
        self
    }
}

#[async_trait]
impl Simulator for MockSimulator {
    async fn simulate_swap(
        &self,
        token_in: &Coin,
        _denom_out: &str,
    ) -> Result<SwapEstimate, AppError> {
        self.swap_calls.fetch_add(1, Ordering::Relaxed);
        let slippage = match &self.swap_viable_at_or_below {
            Some(threshold) if token_in.amount > *threshold => self.swap_high_slippage,
            _ => self.swap_low_slippage,
        };
        Ok(SwapEstimate {
            token_out: token_in.amount.clone(),
            slippage,
        })
    }

    async fn simulate_join(
        &self,
        pool_id: PoolId,
        amounts_in: &[Coin],
    ) -> Result<JoinEstimate, AppError> {
        if self.fail_joins {
            return Err(AppError::Simulation(format!(
                "join simulation for pool {pool_id} unavailable"
            )));
        }
        Ok(JoinEstimate {
            shares_out: self.join_shares_out.clone(),
            amounts_in: amounts_in.to_vec(),
            slippage: self.join_slippage,
            swap_fee: 0.0025,
            taker_fee: 0.0005,
            weight_balance_ratio: 0.0,
            weight_balance_reward: None,
        })
    }

    async fn simulate_exit(
        &self,
        pool_id: PoolId,
        _shares_in: &BigInt,
        _target_denom: Option<&str>,
    ) -> Result<ExitEstimate, AppError> {
        if self.fail_exits {
            return Err(AppError::Simulation(format!(
                "exit simulation for pool {pool_id} unavailable"
            )));
        }
        self.exits
            .get(&pool_id)
            .cloned()
            .ok_or_else(|| AppError::Simulation(format!("no scripted exit for pool {pool_id}")))
    }
}

#[derive(Clone, Debug)]
pub struct VaultState {
    pub positions: Vec<Position>,
    pub liquid_usdc: f64,
    pub total_value_usd: f64,
}

/// In-memory vault. `execute_action_plan` applies deposits and
/// withdrawals to the internal state at their expected values, which is
/// enough for the engine's receipts and metrics to be meaningful.
pub struct MockVault {
    pub state: Mutex<VaultState>,
    pub tradable: Vec<String>,
    pub fail_execution: bool,
    pub executions: AtomicUsize,
}

impl MockVault {
    pub fn new(state: VaultState) -> Self {
        Self {
            state: Mutex::new(state),
            tradable: vec![USDC_DENOM.to_string(), "ibc/ATOM".to_string()],
            fail_execution: false,
            executions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl oxidity_vault::services::vault::VaultExecutor for MockVault {
    async fn liquid_usdc(&self) -> Result<f64, AppError> {
        Ok(self.state.lock().unwrap().liquid_usdc)
    }

    async fn pool_positions(&self) -> Result<Vec<Position>, AppError> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn non_pool_positions(&self) -> Result<Vec<TokenPosition>, AppError> {
        Ok(Vec::new())
    }

    async fn total_vault_value_usd(&self) -> Result<f64, AppError> {
        Ok(self.state.lock().unwrap().total_value_usd)
    }

    async fn tradable_denoms(&self) -> Result<Vec<String>, AppError> {
        Ok(self.tradable.clone())
    }

    async fn execute_action_plan(
        &self,
        actions: &[SubAction],
    ) -> Result<TransactionResult, AppError> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if self.fail_execution {
            return Err(AppError::Rpc("broadcast refused".into()));
        }

        let mut state = self.state.lock().unwrap();
        for action in actions {
            match action {
                SubAction::DepositLp {
                    pool_id,
                    amounts_in,
                    expected_shares_out,
                    ..
                } => {
                    let usd: f64 = amounts_in
                        .iter()
                        .map(|c| {
                            c.amount
                                .to_string()
                                .parse::<f64>()
                                .unwrap_or(0.0)
                                / 1_000_000.0
                        })
                        .sum();
                    state.liquid_usdc -= usd;
                    if let Some(existing) =
                        state.positions.iter_mut().find(|p| p.pool_id == *pool_id)
                    {
                        existing.usd_value += usd;
                        existing.lp_shares += expected_shares_out;
                    } else {
                        state.positions.push(Position {
                            pool_id: *pool_id,
                            lp_shares: expected_shares_out.clone(),
                            age_days: 0,
                            usd_value: usd,
                        });
                    }
                }
                SubAction::WithdrawLp {
                    pool_id,
                    shares_in,
                    expected_amounts_out,
                    ..
                } => {
                    let usd: f64 = expected_amounts_out
                        .iter()
                        .filter(|c| c.denom == USDC_DENOM)
                        .map(|c| {
                            c.amount
                                .to_string()
                                .parse::<f64>()
                                .unwrap_or(0.0)
                                / 1_000_000.0
                        })
                        .sum();
                    state.liquid_usdc += usd;
                    if let Some(existing) =
                        state.positions.iter_mut().find(|p| p.pool_id == *pool_id)
                    {
                        existing.usd_value = (existing.usd_value - usd).max(0.0);
                        existing.lp_shares -= shares_in;
                    }
                    state.positions.retain(|p| {
                        p.lp_shares > BigInt::from(0) && p.usd_value > 0.0
                    });
                }
                SubAction::Swap { .. } => {}
            }
        }

        Ok(TransactionResult {
            tx_hash: format!("MOCKTX{}", self.executions.load(Ordering::Relaxed)),
            gas_used: 200_000,
            gas_wanted: 250_000,
            gas_fee_usd: 0.25,
            success: true,
            error: None,
        })
    }
}

/// Static market data: the given pools plus a token map derived from
/// them (always includes USDC).
pub struct MockMarket {
    pub pools: Vec<Pool>,
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    async fn snapshot(&self, _tradable_denoms: &[String]) -> Result<MarketSnapshot, AppError> {
        let mut tokens: HashMap<String, Token> = HashMap::new();
        tokens.insert(USDC_DENOM.to_string(), usdc_token());
        for pool in &self.pools {
            tokens.insert(pool.token_a.ibc_denom.clone(), pool.token_a.clone());
        }
        Ok(MarketSnapshot {
            tokens,
            pools: self.pools.clone(),
        })
    }
}
