// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::pool::PoolId;
use crate::domain::position::Coin;
use crate::infrastructure::network::node::{parse_decimal_field, parse_int_field, NodeClient};
use async_trait::async_trait;
use num_bigint::{BigInt, Sign};
use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct SwapEstimate {
    pub token_out: BigInt,
    pub slippage: f64,
}

#[derive(Clone, Debug)]
pub struct JoinEstimate {
    pub shares_out: BigInt,
    pub amounts_in: Vec<Coin>,
    pub slippage: f64,
    pub swap_fee: f64,
    pub taker_fee: f64,
    pub weight_balance_ratio: f64,
    pub weight_balance_reward: Option<Coin>,
}

#[derive(Clone, Debug)]
pub struct ExitEstimate {
    pub amounts_out: Vec<Coin>,
    pub slippage: f64,
    pub swap_fee: f64,
    pub taker_fee: f64,
    pub weight_balance_ratio: f64,
    pub weight_balance_reward: Option<Coin>,
}

/// AMM estimation boundary. The planner sizes every action against these
/// simulations before anything is broadcast; errors are typed and abort
/// planning, never swallowed.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate_swap(
        &self,
        token_in: &Coin,
        denom_out: &str,
    ) -> Result<SwapEstimate, AppError>;

    async fn simulate_join(
        &self,
        pool_id: PoolId,
        amounts_in: &[Coin],
    ) -> Result<JoinEstimate, AppError>;

    async fn simulate_exit(
        &self,
        pool_id: PoolId,
        shares_in: &BigInt,
        target_denom: Option<&str>,
    ) -> Result<ExitEstimate, AppError>;
}

// --- Node-backed implementation ---

#[derive(Deserialize)]
struct CoinRaw {
    denom: String,
    amount: String,
}

impl CoinRaw {
    fn into_coin(self, field: &str) -> Result<Coin, AppError> {
        let amount = parse_int_field(&self.amount, field)?;
        if amount.sign() == Sign::Minus {
            return Err(AppError::Simulation(format!(
                "{field}: negative amount {amount}"
            )));
        }
        Ok(Coin::new(self.denom, amount))
    }
}

#[derive(Deserialize)]
struct SwapEstimationRaw {
    amount: CoinRaw,
    slippage: String,
}

#[derive(Deserialize)]
struct JoinEstimationRaw {
    share_amount_out: CoinRaw,
    amounts_in: Vec<CoinRaw>,
    slippage: String,
    swap_fee: String,
    taker_fee: String,
    weight_balance_ratio: String,
    #[serde(default)]
    weight_balance_reward: Option<CoinRaw>,
}

#[derive(Deserialize)]
struct ExitEstimationRaw {
    amounts_out: Vec<CoinRaw>,
    slippage: String,
    swap_fee: String,
    taker_fee: String,
    weight_balance_ratio: String,
    #[serde(default)]
    weight_balance_reward: Option<CoinRaw>,
}

fn validated_slippage(raw: &str) -> Result<f64, AppError> {
    let slippage = parse_decimal_field(raw, "slippage")
        .map_err(|e| AppError::Simulation(e.to_string()))?;
    if slippage < 0.0 {
        return Err(AppError::Simulation(format!(
            "negative slippage {slippage}"
        )));
    }
    Ok(slippage)
}

/// Simulator that queries the AMM module of the chain node.
#[derive(Clone)]
pub struct NodeSimulator {
    node: NodeClient,
}

impl NodeSimulator {
    pub fn new(node: NodeClient) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Simulator for NodeSimulator {
    async fn simulate_swap(
        &self,
        token_in: &Coin,
        denom_out: &str,
    ) -> Result<SwapEstimate, AppError> {
        let raw: SwapEstimationRaw = self
            .node
            .get_slow(
                "/elys/amm/swap_estimation_by_denom",
                &[
                    ("denom_in", token_in.denom.clone()),
                    ("denom_out", denom_out.to_string()),
                    ("amount", token_in.amount.to_string()),
                ],
            )
            .await
            .map_err(|e| AppError::Simulation(format!("swap estimation: {e}")))?;

        let out = raw.amount.into_coin("swap token out")?;
        let estimate = SwapEstimate {
            token_out: out.amount,
            slippage: validated_slippage(&raw.slippage)?,
        };
        tracing::debug!(
            denom_in = %token_in.denom,
            denom_out,
            slippage = estimate.slippage,
            "swap simulation complete"
        );
        Ok(estimate)
    }

    async fn simulate_join(
        &self,
        pool_id: PoolId,
        amounts_in: &[Coin],
    ) -> Result<JoinEstimate, AppError> {
        if amounts_in.is_empty() {
            return Err(AppError::Simulation(format!(
                "join pool {pool_id}: no amounts provided"
            )));
        }
        let amounts = amounts_in
            .iter()
            .map(|c| format!("{}{}", c.amount, c.denom))
            .collect::<Vec<_>>()
            .join(",");

        let raw: JoinEstimationRaw = self
            .node
            .get_slow(
                &format!("/elys/amm/pool/{pool_id}/join_estimation"),
                &[("amounts_in", amounts)],
            )
            .await
            .map_err(|e| AppError::Simulation(format!("join estimation pool {pool_id}: {e}")))?;

        let shares = raw.share_amount_out.into_coin("join shares out")?;
        let amounts_in_actual = raw
            .amounts_in
            .into_iter()
            .map(|c| c.into_coin("join amount in"))
            .collect::<Result<Vec<_>, _>>()?;
        let estimate = JoinEstimate {
            shares_out: shares.amount,
            amounts_in: amounts_in_actual,
            slippage: validated_slippage(&raw.slippage)?,
            swap_fee: parse_decimal_field(&raw.swap_fee, "swap_fee")?,
            taker_fee: parse_decimal_field(&raw.taker_fee, "taker_fee")?,
            weight_balance_ratio: parse_decimal_field(
                &raw.weight_balance_ratio,
                "weight_balance_ratio",
            )?,
            weight_balance_reward: raw
                .weight_balance_reward
                .map(|c| c.into_coin("join reward"))
                .transpose()?,
        };
        tracing::debug!(
            pool_id,
            slippage = estimate.slippage,
            shares_out = %estimate.shares_out,
            "join simulation complete"
        );
        Ok(estimate)
    }

    async fn simulate_exit(
        &self,
        pool_id: PoolId,
        shares_in: &BigInt,
        target_denom: Option<&str>,
    ) -> Result<ExitEstimate, AppError> {
        let mut query = vec![("share_amount_in", shares_in.to_string())];
        if let Some(denom) = target_denom {
            query.push(("token_out_denom", denom.to_string()));
        }

        let raw: ExitEstimationRaw = self
            .node
            .get_slow(&format!("/elys/amm/pool/{pool_id}/exit_estimation"), &query)
            .await
            .map_err(|e| AppError::Simulation(format!("exit estimation pool {pool_id}: {e}")))?;

        let amounts_out = raw
            .amounts_out
            .into_iter()
            .map(|c| c.into_coin("exit amount out"))
            .collect::<Result<Vec<_>, _>>()?;
        if amounts_out.is_empty() {
            return Err(AppError::Simulation(format!(
                "exit estimation pool {pool_id}: no amounts returned"
            )));
        }
        let estimate = ExitEstimate {
            amounts_out,
            slippage: validated_slippage(&raw.slippage)?,
            swap_fee: parse_decimal_field(&raw.swap_fee, "swap_fee")?,
            taker_fee: parse_decimal_field(&raw.taker_fee, "taker_fee")?,
            weight_balance_ratio: parse_decimal_field(
                &raw.weight_balance_ratio,
                "weight_balance_ratio",
            )?,
            weight_balance_reward: raw
                .weight_balance_reward
                .map(|c| c.into_coin("exit reward"))
                .transpose()?,
        };
        tracing::debug!(
            pool_id,
            slippage = estimate.slippage,
            "exit simulation complete"
        );
        Ok(estimate)
    }
}
