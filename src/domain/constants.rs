// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

/// Symbol of the settlement asset. Everything is consolidated into it
/// between the withdrawal and deposit phases.
pub const USDC_SYMBOL: &str = "USDC";

/// Base denom of the governance asset whose pool must always receive the
/// configured minimum allocation when such a pool exists.
pub const FORCED_ASSET_DENOM: &str = "uelys";

/// Annualization factor for hourly log-returns (hours per year).
pub const HOURLY_ANNUALIZATION_FACTOR: f64 = 8760.0;

/// Exactly 30 days of hourly closes are required per token before its
/// volatility is considered trustworthy.
pub const REQUIRED_PRICE_SAMPLES: usize = 720;

/// Upper bound on the constraint-enforcement loop in the allocator.
pub const MAX_ALLOCATION_ITERATIONS: usize = 20;

/// Upper bound on the amount-reduction search for a slippage-viable swap.
pub const VIABLE_AMOUNT_MAX_RETRIES: usize = 20;

/// Deposits below this are not worth a transaction.
pub const DUST_THRESHOLD_USD: f64 = 1.0;

pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 600;

pub const DEFAULT_SCORING_CONFIG_NAME: &str = "default_avm_strategy";
pub const DEFAULT_SCORING_CONFIG_VERSION: i64 = 1;
