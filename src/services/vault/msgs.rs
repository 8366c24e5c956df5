// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::pool::PoolId;
use crate::domain::position::{bigint_string, Coin, SubAction};
use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Swap through the AMM router with a chain-enforced minimum output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSwapByDenom {
    pub vault_id: u64,
    pub amount: Coin,
    pub denom_in: String,
    pub denom_out: String,
    pub min_amount: Coin,
    pub max_amount: Coin,
}

/// Join a pool with a minimum share output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionJoinPool {
    pub vault_id: u64,
    pub pool_id: PoolId,
    pub max_amounts_in: Vec<Coin>,
    #[serde(with = "bigint_string")]
    pub share_amount_out: BigInt,
}

/// Exit a pool with minimum amounts out per denom.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionExitPool {
    pub vault_id: u64,
    pub pool_id: PoolId,
    pub min_amounts_out: Vec<Coin>,
    #[serde(with = "bigint_string")]
    pub share_amount_in: BigInt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_out_denom: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum VaultMsg {
    #[serde(rename = "/elys.vaults.MsgActionSwapByDenom")]
    SwapByDenom(ActionSwapByDenom),
    #[serde(rename = "/elys.vaults.MsgActionJoinPool")]
    JoinPool(ActionJoinPool),
    #[serde(rename = "/elys.vaults.MsgActionExitPool")]
    ExitPool(ActionExitPool),
}

/// floor(expected · (1 − tolerance)) in decimal space, floored at one
/// base unit whenever something is expected at all. The chain rejects the
/// transaction when the realized output lands below this.
pub fn minimum_output(expected: &BigInt, tolerance: f64) -> Result<BigInt, AppError> {
    if expected.sign() == Sign::Minus {
        return Err(AppError::Math(format!(
            "expected output {expected} is negative"
        )));
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(AppError::Math(format!(
            "slippage tolerance {tolerance} is invalid"
        )));
    }
    if tolerance >= 1.0 {
        return Err(AppError::Math(
            "slippage tolerance must be below 100%".into(),
        ));
    }
    if expected.sign() == Sign::NoSign {
        return Ok(BigInt::from(0));
    }

    let keep = BigDecimal::from_str(&format!("{:.12}", 1.0 - tolerance))
        .map_err(|e| AppError::Math(format!("tolerance factor: {e}")))?;
    let scaled = (BigDecimal::from(expected.clone()) * keep).with_scale_round(0, RoundingMode::Down);
    let (floor, _) = scaled.into_bigint_and_exponent();

    // Never demand zero when output is expected; one base unit keeps the
    // protection armed.
    if floor.sign() != Sign::Plus {
        return Ok(BigInt::from(1));
    }
    Ok(floor)
}

fn minimum_amounts_out(
    expected: &[Coin],
    tolerance: f64,
) -> Result<Vec<Coin>, AppError> {
    expected
        .iter()
        .map(|coin| {
            minimum_output(&coin.amount, tolerance)
                .map(|amount| Coin::new(coin.denom.clone(), amount))
        })
        .collect()
}

/// Translate one planner phase into broadcast-ready vault messages with
/// embedded slippage protection. Every sub-action is validated first; a
/// single bad action poisons the whole batch.
pub fn build_vault_messages(
    vault_id: u64,
    actions: &[SubAction],
) -> Result<Vec<VaultMsg>, AppError> {
    if vault_id == 0 {
        return Err(AppError::Config("vault id cannot be zero".into()));
    }
    let mut msgs = Vec::with_capacity(actions.len());
    for action in actions {
        action.validate()?;
        let msg = match action {
            SubAction::Swap {
                token_in,
                token_out_denom,
                expected_out,
                slippage_tolerance_pct,
                ..
            } => {
                let min_amount = minimum_output(expected_out, *slippage_tolerance_pct)?;
                VaultMsg::SwapByDenom(ActionSwapByDenom {
                    vault_id,
                    amount: token_in.clone(),
                    denom_in: token_in.denom.clone(),
                    denom_out: token_out_denom.clone(),
                    min_amount: Coin::new(token_out_denom.clone(), min_amount),
                    max_amount: Coin::new(token_out_denom.clone(), BigInt::from(0)),
                })
            }
            SubAction::DepositLp {
                pool_id,
                amounts_in,
                expected_shares_out,
                slippage_tolerance_pct,
                ..
            } => {
                let min_shares = minimum_output(expected_shares_out, *slippage_tolerance_pct)?;
                VaultMsg::JoinPool(ActionJoinPool {
                    vault_id,
                    pool_id: *pool_id,
                    max_amounts_in: amounts_in.clone(),
                    share_amount_out: min_shares,
                })
            }
            SubAction::WithdrawLp {
                pool_id,
                shares_in,
                target_denom_on_exit,
                expected_amounts_out,
                slippage_tolerance_pct,
                ..
            } => VaultMsg::ExitPool(ActionExitPool {
                vault_id,
                pool_id: *pool_id,
                min_amounts_out: minimum_amounts_out(
                    expected_amounts_out,
                    *slippage_tolerance_pct,
                )?,
                share_amount_in: shares_in.clone(),
                token_out_denom: target_denom_on_exit.clone(),
            }),
        };
        msgs.push(msg);
    }
    Ok(msgs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_output_floors_toward_zero() {
        // 1000 at 3% tolerance -> floor(970.0) = 970
        assert_eq!(
            minimum_output(&BigInt::from(1000), 0.03).unwrap(),
            BigInt::from(970)
        );
        // 999 at 3% -> floor(969.03) = 969
        assert_eq!(
            minimum_output(&BigInt::from(999), 0.03).unwrap(),
            BigInt::from(969)
        );
    }

    #[test]
    fn min_output_never_zero_when_expected_positive() {
        assert_eq!(
            minimum_output(&BigInt::from(1), 0.99).unwrap(),
            BigInt::from(1)
        );
        assert_eq!(
            minimum_output(&BigInt::from(3), 0.9).unwrap(),
            BigInt::from(1)
        );
    }

    #[test]
    fn zero_expected_means_zero_minimum() {
        assert_eq!(
            minimum_output(&BigInt::from(0), 0.05).unwrap(),
            BigInt::from(0)
        );
    }

    #[test]
    fn tolerance_of_one_or_more_rejected() {
        assert!(minimum_output(&BigInt::from(100), 1.0).is_err());
        assert!(minimum_output(&BigInt::from(100), 1.5).is_err());
        assert!(minimum_output(&BigInt::from(100), f64::NAN).is_err());
        assert!(minimum_output(&BigInt::from(100), -0.1).is_err());
    }

    #[test]
    fn large_amounts_keep_integer_precision() {
        // 10^21 at 1% tolerance: exactly 0.99 * 10^21, no float drift.
        let expected: BigInt = "1000000000000000000000".parse().unwrap();
        let min = minimum_output(&expected, 0.01).unwrap();
        let exact: BigInt = "990000000000000000000".parse().unwrap();
        assert_eq!(min, exact);
    }

    #[test]
    fn builds_exit_message_with_min_amounts() {
        let action = SubAction::WithdrawLp {
            pool_id: 4,
            shares_in: BigInt::from(1_000_000u64),
            target_denom_on_exit: Some("ibc/USDC".into()),
            expected_amounts_out: vec![Coin::new("ibc/USDC", BigInt::from(500_000u64))],
            expected_slippage: 0.002,
            slippage_tolerance_pct: 0.01,
        };
        let msgs = build_vault_messages(9, &[action]).unwrap();
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            VaultMsg::ExitPool(msg) => {
                assert_eq!(msg.vault_id, 9);
                assert_eq!(msg.pool_id, 4);
                assert_eq!(msg.share_amount_in, BigInt::from(1_000_000u64));
                assert_eq!(msg.min_amounts_out[0].amount, BigInt::from(495_000u64));
                assert_eq!(msg.token_out_denom.as_deref(), Some("ibc/USDC"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn builds_join_message_with_min_shares() {
        let action = SubAction::DepositLp {
            pool_id: 2,
            amounts_in: vec![Coin::new("ibc/USDC", BigInt::from(950_000_000u64))],
            expected_shares_out: BigInt::from(10_000u64),
            expected_slippage: 0.005,
            slippage_tolerance_pct: 0.03,
        };
        let msgs = build_vault_messages(1, &[action]).unwrap();
        match &msgs[0] {
            VaultMsg::JoinPool(msg) => {
                assert_eq!(msg.share_amount_out, BigInt::from(9_700u64));
                assert_eq!(msg.max_amounts_in[0].amount, BigInt::from(950_000_000u64));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn builds_swap_message_with_min_out() {
        let action = SubAction::Swap {
            token_in: Coin::new("ibc/ATOM", BigInt::from(1_000u64)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(9_000u64),
            expected_slippage: 0.01,
            slippage_tolerance_pct: 0.03,
        };
        let msgs = build_vault_messages(3, &[action]).unwrap();
        match &msgs[0] {
            VaultMsg::SwapByDenom(msg) => {
                assert_eq!(msg.min_amount.amount, BigInt::from(8_730u64));
                assert_eq!(msg.denom_in, "ibc/ATOM");
                assert_eq!(msg.denom_out, "ibc/USDC");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn invalid_action_poisons_batch() {
        let good = SubAction::Swap {
            token_in: Coin::new("ibc/ATOM", BigInt::from(1_000u64)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(9_000u64),
            expected_slippage: 0.01,
            slippage_tolerance_pct: 0.03,
        };
        let bad = SubAction::WithdrawLp {
            pool_id: 0,
            shares_in: BigInt::from(1u64),
            target_denom_on_exit: None,
            expected_amounts_out: vec![Coin::new("ibc/USDC", BigInt::from(1u64))],
            expected_slippage: 0.0,
            slippage_tolerance_pct: 0.01,
        };
        assert!(build_vault_messages(1, &[good, bad]).is_err());
    }

    #[test]
    fn messages_serialize_with_type_tags() {
        let action = SubAction::Swap {
            token_in: Coin::new("ibc/ATOM", BigInt::from(5u64)),
            token_out_denom: "ibc/USDC".into(),
            expected_out: BigInt::from(40u64),
            expected_slippage: 0.0,
            slippage_tolerance_pct: 0.01,
        };
        let msgs = build_vault_messages(2, &[action]).unwrap();
        let json = serde_json::to_value(&msgs[0]).unwrap();
        assert_eq!(json["@type"], "/elys.vaults.MsgActionSwapByDenom");
        assert_eq!(json["amount"]["amount"], "5");
    }
}
