// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::snapshot::CycleSnapshot;
use crate::infrastructure::data::db::Database;
use serde::Serialize;
use sqlx::Row;

/// Aggregates over all recorded cycles, surfaced at startup and by the
/// read-only observability path.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_return_usd: f64,
    pub total_gas_fees_usd: f64,
    pub total_slippage_usd: f64,
    pub avg_allocation_efficiency_pct: f64,
    pub total_cycles: i64,
    pub successful_cycles: i64,
}

impl Database {
    /// Persist a finished cycle. Positions, allocations, plan, and
    /// receipts travel as JSON columns; the unique index on cycle_number
    /// turns an accidental double-write into a hard error.
    pub async fn save_cycle_snapshot(&self, snapshot: &CycleSnapshot) -> Result<i64, AppError> {
        let initial_positions = serde_json::to_string(&snapshot.initial_positions)
            .map_err(|e| AppError::Database(format!("encode initial_positions: {e}")))?;
        let final_positions = serde_json::to_string(&snapshot.final_positions)
            .map_err(|e| AppError::Database(format!("encode final_positions: {e}")))?;
        let target_allocations = serde_json::to_string(&snapshot.target_allocations)
            .map_err(|e| AppError::Database(format!("encode target_allocations: {e}")))?;
        let action_plan = serde_json::to_string(&snapshot.action_plan)
            .map_err(|e| AppError::Database(format!("encode action_plan: {e}")))?;
        let action_receipts = serde_json::to_string(&snapshot.action_receipts)
            .map_err(|e| AppError::Database(format!("encode action_receipts: {e}")))?;
        let tx_hashes = serde_json::to_string(&snapshot.tx_hashes)
            .map_err(|e| AppError::Database(format!("encode tx_hashes: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO cycle_snapshots (
                cycle_number, snapshot_timestamp, scoring_params_id,
                initial_vault_value_usd, initial_liquid_usdc, initial_positions,
                target_allocations, action_plan,
                final_vault_value_usd, final_liquid_usdc, final_positions,
                transaction_hashes, action_receipts,
                allocation_efficiency_percent, net_return_usd, total_slippage_usd, total_gas_fee_usd
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING snapshot_id
            "#,
        )
        .bind(snapshot.cycle_number)
        .bind(snapshot.timestamp.to_rfc3339())
        .bind(snapshot.params_id)
        .bind(snapshot.initial_vault_usd)
        .bind(snapshot.initial_liquid_usdc)
        .bind(initial_positions)
        .bind(target_allocations)
        .bind(action_plan)
        .bind(snapshot.final_vault_usd)
        .bind(snapshot.final_liquid_usdc)
        .bind(final_positions)
        .bind(tx_hashes)
        .bind(action_receipts)
        .bind(snapshot.allocation_efficiency_pct)
        .bind(snapshot.net_return_usd)
        .bind(snapshot.total_slippage_usd)
        .bind(snapshot.total_gas_fee_usd)
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("snapshot insert failed: {e}")))?;

        let snapshot_id: i64 = row.get("snapshot_id");
        tracing::info!(
            snapshot_id,
            cycle_number = snapshot.cycle_number,
            final_vault_usd = snapshot.final_vault_usd,
            "cycle snapshot saved"
        );
        Ok(snapshot_id)
    }

    /// Most recent cycles, newest first, decoded back into full
    /// snapshots.
    pub async fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleSnapshot>, AppError> {
        let limit = limit.clamp(1, 100);
        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, cycle_number, snapshot_timestamp, scoring_params_id,
                   initial_vault_value_usd, initial_liquid_usdc, initial_positions,
                   target_allocations, action_plan,
                   final_vault_value_usd, final_liquid_usdc, final_positions,
                   transaction_hashes, action_receipts,
                   allocation_efficiency_percent, net_return_usd, total_slippage_usd, total_gas_fee_usd
            FROM cycle_snapshots
            ORDER BY cycle_number DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("recent cycles query failed: {e}")))?;

        let mut cycles = Vec::with_capacity(rows.len());
        for row in rows {
            cycles.push(decode_snapshot_row(&row)?);
        }
        Ok(cycles)
    }

    pub async fn performance_metrics(&self) -> Result<PerformanceMetrics, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(net_return_usd), 0) AS total_return,
                   COALESCE(SUM(total_gas_fee_usd), 0) AS total_gas,
                   COALESCE(SUM(total_slippage_usd), 0) AS total_slippage,
                   COALESCE(AVG(allocation_efficiency_percent), 0) AS avg_efficiency,
                   COUNT(*) AS total_cycles,
                   COUNT(CASE WHEN net_return_usd >= 0 THEN 1 END) AS successful_cycles
            FROM cycle_snapshots
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("metrics query failed: {e}")))?;

        Ok(PerformanceMetrics {
            total_return_usd: row.get("total_return"),
            total_gas_fees_usd: row.get("total_gas"),
            total_slippage_usd: row.get("total_slippage"),
            avg_allocation_efficiency_pct: row.get("avg_efficiency"),
            total_cycles: row.get("total_cycles"),
            successful_cycles: row.get("successful_cycles"),
        })
    }

    /// Atomically advance the persistent cycle counter and return the new
    /// value. Survives restarts; never reused.
    pub async fn increment_cycle_counter(&self) -> Result<i64, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE cycle_counter
            SET current_cycle = current_cycle + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = 1
            RETURNING current_cycle
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::Database(format!("cycle counter increment failed: {e}")))?;

        let cycle: i64 = row.get("current_cycle");
        tracing::info!(cycle, "cycle counter incremented");
        Ok(cycle)
    }

    pub async fn current_cycle_number(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT current_cycle FROM cycle_counter WHERE id = 1")
            .fetch_one(self.pool())
            .await
            .map_err(|e| AppError::Database(format!("cycle counter read failed: {e}")))?;
        Ok(row.get("current_cycle"))
    }
}

fn decode_snapshot_row(row: &sqlx::sqlite::SqliteRow) -> Result<CycleSnapshot, AppError> {
    let decode_json = |column: &str, raw: String| -> Result<serde_json::Value, AppError> {
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Database(format!("decode {column}: {e}")))
    };

    let timestamp_raw: String = row.get("snapshot_timestamp");
    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_raw)
        .map_err(|e| AppError::Database(format!("decode snapshot_timestamp: {e}")))?
        .with_timezone(&chrono::Utc);

    Ok(CycleSnapshot {
        snapshot_id: Some(row.get("snapshot_id")),
        cycle_number: row.get("cycle_number"),
        timestamp,
        params_id: row.get("scoring_params_id"),
        initial_vault_usd: row.get("initial_vault_value_usd"),
        initial_liquid_usdc: row.get("initial_liquid_usdc"),
        initial_positions: serde_json::from_value(decode_json(
            "initial_positions",
            row.get("initial_positions"),
        )?)
        .map_err(|e| AppError::Database(format!("decode initial_positions: {e}")))?,
        target_allocations: serde_json::from_value(decode_json(
            "target_allocations",
            row.get("target_allocations"),
        )?)
        .map_err(|e| AppError::Database(format!("decode target_allocations: {e}")))?,
        action_plan: serde_json::from_value(decode_json("action_plan", row.get("action_plan"))?)
            .map_err(|e| AppError::Database(format!("decode action_plan: {e}")))?,
        final_vault_usd: row.get("final_vault_value_usd"),
        final_liquid_usdc: row.get("final_liquid_usdc"),
        final_positions: serde_json::from_value(decode_json(
            "final_positions",
            row.get("final_positions"),
        )?)
        .map_err(|e| AppError::Database(format!("decode final_positions: {e}")))?,
        tx_hashes: serde_json::from_value(decode_json(
            "transaction_hashes",
            row.get("transaction_hashes"),
        )?)
        .map_err(|e| AppError::Database(format!("decode transaction_hashes: {e}")))?,
        action_receipts: serde_json::from_value(decode_json(
            "action_receipts",
            row.get("action_receipts"),
        )?)
        .map_err(|e| AppError::Database(format!("decode action_receipts: {e}")))?,
        allocation_efficiency_pct: row.get("allocation_efficiency_percent"),
        net_return_usd: row.get("net_return_usd"),
        total_slippage_usd: row.get("total_slippage_usd"),
        total_gas_fee_usd: row.get("total_gas_fee_usd"),
    })
}
