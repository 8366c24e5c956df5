// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::pool::PoolId;
use crate::domain::position::{ActionPlan, ActionReceipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A position as recorded in a snapshot, denormalized with pool metadata
/// so historical rows stay readable after pools churn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub pool_id: PoolId,
    /// LP shares as a decimal string; fixed-point amounts never pass
    /// through floats on the persistence path.
    pub lp_shares: String,
    pub usd_value: f64,
    pub allocation_pct: f64,
    pub age_days: i64,
    pub token_a: String,
    pub token_b: String,
    pub pool_tvl_usd: f64,
    pub pool_score: f64,
}

/// Full record of one cycle: state before, the plan, state after, and the
/// performance metrics derived from the difference. Written exactly once
/// per cycle, including aborted ones.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    pub cycle_number: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_id: Option<i64>,

    pub initial_vault_usd: f64,
    pub initial_liquid_usdc: f64,
    pub initial_positions: Vec<PositionSnapshot>,

    pub target_allocations: BTreeMap<PoolId, f64>,
    pub action_plan: ActionPlan,

    pub final_vault_usd: f64,
    pub final_liquid_usdc: f64,
    pub final_positions: Vec<PositionSnapshot>,

    pub tx_hashes: Vec<String>,
    pub action_receipts: Vec<ActionReceipt>,

    pub allocation_efficiency_pct: f64,
    pub net_return_usd: f64,
    pub total_slippage_usd: f64,
    pub total_gas_fee_usd: f64,
}

impl CycleSnapshot {
    pub fn new(cycle_number: i64, timestamp: DateTime<Utc>, params_id: Option<i64>) -> Self {
        Self {
            snapshot_id: None,
            cycle_number,
            timestamp,
            params_id,
            initial_vault_usd: 0.0,
            initial_liquid_usdc: 0.0,
            initial_positions: Vec::new(),
            target_allocations: BTreeMap::new(),
            action_plan: ActionPlan::default(),
            final_vault_usd: 0.0,
            final_liquid_usdc: 0.0,
            final_positions: Vec::new(),
            tx_hashes: Vec::new(),
            action_receipts: Vec::new(),
            allocation_efficiency_pct: 0.0,
            net_return_usd: 0.0,
            total_slippage_usd: 0.0,
            total_gas_fee_usd: 0.0,
        }
    }
}
