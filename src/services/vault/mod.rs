// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

pub mod live;
pub mod msgs;

use crate::domain::error::AppError;
use crate::domain::position::{Position, SubAction, TokenPosition, TransactionResult};
use async_trait::async_trait;

/// The vault boundary. Reads describe current state; `execute_action_plan`
/// turns one phase of a plan into a broadcast transaction. The engine
/// calls these strictly sequentially within a cycle and assumes nothing
/// beyond that.
#[async_trait]
pub trait VaultExecutor: Send + Sync {
    async fn liquid_usdc(&self) -> Result<f64, AppError>;

    async fn pool_positions(&self) -> Result<Vec<Position>, AppError>;

    /// Bare token balances held outside any pool (consolidation leftovers
    /// and dust).
    async fn non_pool_positions(&self) -> Result<Vec<TokenPosition>, AppError>;

    async fn total_vault_value_usd(&self) -> Result<f64, AppError>;

    /// Denoms governance allows this vault to trade.
    async fn tradable_denoms(&self) -> Result<Vec<String>, AppError>;

    async fn execute_action_plan(
        &self,
        actions: &[SubAction],
    ) -> Result<TransactionResult, AppError>;
}
