// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::pool::PoolId;
use chrono::{DateTime, Utc};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};

/// Fixed-point amounts travel as decimal strings in JSON, matching the
/// chain's own encoding and avoiding any float round-trip.
pub mod bigint_string {
    use num_bigint::BigInt;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigInt::from_str(&raw).map_err(|e| D::Error::custom(format!("invalid integer '{raw}': {e}")))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "bigint_string")]
    pub amount: BigInt,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: BigInt) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// An LP position the vault currently holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub pool_id: PoolId,
    #[serde(with = "bigint_string")]
    pub lp_shares: BigInt,
    pub age_days: i64,
    /// Populated by the vault executor from current pool state.
    pub usd_value: f64,
}

/// A bare token balance held outside any pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPosition {
    pub denom: String,
    pub symbol: String,
    #[serde(with = "bigint_string")]
    pub amount: BigInt,
    pub usd_value: f64,
}

/// A single executable step of a rebalancing plan. Every variant carries
/// the simulation expectations needed to derive on-chain minimum-output
/// protection at message-construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubAction {
    Swap {
        token_in: Coin,
        token_out_denom: String,
        #[serde(with = "bigint_string")]
        expected_out: BigInt,
        expected_slippage: f64,
        slippage_tolerance_pct: f64,
    },
    DepositLp {
        pool_id: PoolId,
        amounts_in: Vec<Coin>,
        #[serde(with = "bigint_string")]
        expected_shares_out: BigInt,
        expected_slippage: f64,
        slippage_tolerance_pct: f64,
    },
    WithdrawLp {
        pool_id: PoolId,
        #[serde(with = "bigint_string")]
        shares_in: BigInt,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_denom_on_exit: Option<String>,
        expected_amounts_out: Vec<Coin>,
        expected_slippage: f64,
        slippage_tolerance_pct: f64,
    },
}

fn validate_slippage_fields(
    tolerance: f64,
    expected: f64,
    context: &str,
) -> Result<(), AppError> {
    if !tolerance.is_finite() {
        return Err(AppError::PoolData(format!(
            "{context}: slippage tolerance is not finite"
        )));
    }
    if !(0.0..1.0).contains(&tolerance) {
        return Err(AppError::PoolData(format!(
            "{context}: slippage tolerance {tolerance} out of [0, 1)"
        )));
    }
    if !expected.is_finite() || !(0.0..=1.0).contains(&expected) {
        return Err(AppError::PoolData(format!(
            "{context}: expected slippage {expected} out of [0, 1]"
        )));
    }
    Ok(())
}

impl SubAction {
    pub fn kind(&self) -> &'static str {
        match self {
            SubAction::Swap { .. } => "SWAP",
            SubAction::DepositLp { .. } => "DEPOSIT_LP",
            SubAction::WithdrawLp { .. } => "WITHDRAW_LP",
        }
    }

    /// Pool the action touches, if any. Swaps route through the AMM and
    /// are not pinned to a pool.
    pub fn pool_id(&self) -> Option<PoolId> {
        match self {
            SubAction::Swap { .. } => None,
            SubAction::DepositLp { pool_id, .. } | SubAction::WithdrawLp { pool_id, .. } => {
                Some(*pool_id)
            }
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            SubAction::Swap {
                token_in,
                token_out_denom,
                expected_out,
                expected_slippage,
                slippage_tolerance_pct,
            } => {
                if token_in.denom.is_empty() || token_out_denom.is_empty() {
                    return Err(AppError::PoolData("swap: empty denom".into()));
                }
                if token_in.denom == *token_out_denom {
                    return Err(AppError::PoolData(format!(
                        "swap: input and output denom are both {}",
                        token_in.denom
                    )));
                }
                if token_in.amount.sign() != Sign::Plus {
                    return Err(AppError::PoolData("swap: input amount must be positive".into()));
                }
                if expected_out.sign() == Sign::Minus {
                    return Err(AppError::PoolData("swap: expected output is negative".into()));
                }
                validate_slippage_fields(*slippage_tolerance_pct, *expected_slippage, "swap")
            }
            SubAction::DepositLp {
                pool_id,
                amounts_in,
                expected_shares_out,
                expected_slippage,
                slippage_tolerance_pct,
            } => {
                if *pool_id == 0 {
                    return Err(AppError::PoolData("deposit: pool id cannot be zero".into()));
                }
                if amounts_in.is_empty() {
                    return Err(AppError::PoolData(format!(
                        "deposit into pool {pool_id}: no amounts"
                    )));
                }
                for coin in amounts_in {
                    if coin.amount.sign() != Sign::Plus {
                        return Err(AppError::PoolData(format!(
                            "deposit into pool {pool_id}: non-positive amount of {}",
                            coin.denom
                        )));
                    }
                }
                if expected_shares_out.sign() == Sign::Minus {
                    return Err(AppError::PoolData(format!(
                        "deposit into pool {pool_id}: expected shares are negative"
                    )));
                }
                validate_slippage_fields(*slippage_tolerance_pct, *expected_slippage, "deposit")
            }
            SubAction::WithdrawLp {
                pool_id,
                shares_in,
                expected_amounts_out,
                expected_slippage,
                slippage_tolerance_pct,
                ..
            } => {
                if *pool_id == 0 {
                    return Err(AppError::PoolData("withdraw: pool id cannot be zero".into()));
                }
                if shares_in.sign() != Sign::Plus {
                    return Err(AppError::PoolData(format!(
                        "withdraw from pool {pool_id}: shares must be positive"
                    )));
                }
                if expected_amounts_out.is_empty() {
                    return Err(AppError::PoolData(format!(
                        "withdraw from pool {pool_id}: no expected amounts"
                    )));
                }
                validate_slippage_fields(*slippage_tolerance_pct, *expected_slippage, "withdraw")
            }
        }
    }
}

/// The plan as persisted inside a cycle snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub goal: String,
    pub sub_actions: Vec<SubAction>,
    pub estimated_net_usd_change: f64,
}

/// Post-execution record for one sub-action, with the realized USD amount
/// derived from vault state captured around the phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub sub_action: SubAction,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub actual_amount_usd: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionResult {
    pub tx_hash: String,
    pub gas_used: i64,
    pub gas_wanted: i64,
    pub gas_fee_usd: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap(amount: i64, tolerance: f64) -> SubAction {
        SubAction::Swap {
            token_in: Coin::new("ibc/ATOM", BigInt::from(amount)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(95_000u64),
            expected_slippage: 0.004,
            slippage_tolerance_pct: tolerance,
        }
    }

    #[test]
    fn valid_swap_passes() {
        assert!(swap(10_000, 0.03).validate().is_ok());
    }

    #[test]
    fn zero_amount_swap_rejected() {
        assert!(swap(0, 0.03).validate().is_err());
    }

    #[test]
    fn full_tolerance_rejected() {
        assert!(swap(10_000, 1.0).validate().is_err());
    }

    #[test]
    fn same_denom_swap_rejected() {
        let action = SubAction::Swap {
            token_in: Coin::new("ibc/USDC", BigInt::from(10u64)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(10u64),
            expected_slippage: 0.0,
            slippage_tolerance_pct: 0.01,
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn subaction_json_round_trips_amounts_as_strings() {
        let action = SubAction::WithdrawLp {
            pool_id: 7,
            shares_in: BigInt::from(123_456_789_000_000_000_000u128),
            target_denom_on_exit: Some("ibc/USDC".into()),
            expected_amounts_out: vec![Coin::new("ibc/USDC", BigInt::from(42u64))],
            expected_slippage: 0.01,
            slippage_tolerance_pct: 0.03,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "WITHDRAW_LP");
        assert_eq!(json["shares_in"], "123456789000000000000");
        let back: SubAction = serde_json::from_value(json).unwrap();
        match back {
            SubAction::WithdrawLp { shares_in, .. } => {
                assert_eq!(shares_in, BigInt::from(123_456_789_000_000_000_000u128))
            }
            _ => panic!("wrong variant"),
        }
    }
}
