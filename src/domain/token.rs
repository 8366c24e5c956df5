// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chain-level token metadata plus the market state the scorer needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Token {
    /// Display symbol, e.g. "ATOM".
    pub symbol: String,
    /// Base denom on the origin chain, e.g. "uatom".
    pub base_denom: String,
    /// Denom as it appears in vault balances, e.g. "ibc/273...A8".
    /// Equal to `base_denom` for native assets.
    pub ibc_denom: String,
    /// Decimal precision of the fixed-point representation (0..=18).
    pub precision: u32,
    pub price_usd: f64,
    /// Whether `price_usd` came from the chain oracle rather than AMM spot.
    pub oracle_sourced: bool,
    /// Hourly closes, oldest first. Exactly `REQUIRED_PRICE_SAMPLES` when
    /// the history provider succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_series: Vec<PricePoint>,
    /// Annualized volatility derived from `price_series`.
    pub volatility: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}
