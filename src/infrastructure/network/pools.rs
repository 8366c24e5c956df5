// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::analyzer::volatility::annualized_volatility;
use crate::domain::constants::{HOURLY_ANNUALIZATION_FACTOR, USDC_SYMBOL};
use crate::domain::error::AppError;
use crate::domain::pool::{Pool, PoolId};
use crate::domain::token::Token;
use crate::infrastructure::network::node::{parse_decimal_field, parse_int_field, NodeClient};
use crate::infrastructure::network::price_history::PriceHistoryProvider;
use crate::infrastructure::network::volume::VolumeApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PAGE_LIMIT: u32 = 100;

/// Everything the engine needs from upstream for one cycle: token
/// metadata keyed by vault denom, and fully assembled pools.
pub struct MarketSnapshot {
    pub tokens: HashMap<String, Token>,
    pub pools: Vec<Pool>,
}

/// Upstream market-data boundary, mocked in tests and node-backed in
/// production.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self, tradable_denoms: &[String]) -> Result<MarketSnapshot, AppError>;
}

// --- Wire DTOs ---

#[derive(Deserialize)]
struct CoinRaw {
    denom: String,
    amount: String,
}

#[derive(Deserialize)]
struct AssetEntryRaw {
    base_denom: String,
    denom: String,
    symbol: String,
    decimals: u32,
}

#[derive(Deserialize)]
struct AssetEntriesResponse {
    entry: Vec<AssetEntryRaw>,
}

#[derive(Deserialize)]
struct OraclePriceRaw {
    asset: String,
    price: String,
    source: String,
}

#[derive(Deserialize)]
struct OraclePricesResponse {
    price: Vec<OraclePriceRaw>,
}

#[derive(Deserialize)]
struct PoolAssetRaw {
    token: CoinRaw,
    weight: String,
}

#[derive(Deserialize)]
struct PoolParamsRaw {
    swap_fee: String,
    #[serde(default)]
    use_oracle: bool,
}

#[derive(Deserialize)]
struct PoolRaw {
    pool_id: String,
    pool_assets: Vec<PoolAssetRaw>,
    total_shares: CoinRaw,
    pool_params: PoolParamsRaw,
}

#[derive(Deserialize)]
struct PoolExtraRaw {
    tvl_usd: String,
    price_impact_apr: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
struct PaginationRaw {
    #[serde(default)]
    next_key: Option<String>,
}

#[derive(Deserialize)]
struct PoolsPageResponse {
    pool: Vec<PoolRaw>,
    extra_infos: Vec<PoolExtraRaw>,
    #[serde(default)]
    pagination: PaginationRaw,
}

#[derive(Deserialize)]
struct PoolAprRaw {
    pool_id: String,
    eden_apr: String,
    usdc_fee_apr: String,
}

#[derive(Deserialize)]
struct PoolAprsResponse {
    data: Vec<PoolAprRaw>,
}

/// Node-backed market data: asset profile + oracle prices for tokens,
/// paginated AMM pool listing with extras and APRs for pools, candle
/// history for volatility, and the external weekly-volume feed.
pub struct NodeMarketData {
    node: NodeClient,
    price_history: Arc<dyn PriceHistoryProvider>,
    volume: VolumeApi,
}

impl NodeMarketData {
    pub fn new(
        node: NodeClient,
        price_history: Arc<dyn PriceHistoryProvider>,
        volume: VolumeApi,
    ) -> Self {
        Self {
            node,
            price_history,
            volume,
        }
    }

    /// Token metadata keyed by the denom the vault holds (IBC denom for
    /// bridged assets). Prices come from the oracle module; tokens the
    /// oracle does not cover are dropped with a warning since nothing
    /// downstream can value them.
    async fn fetch_tokens(
        &self,
        tradable: &HashSet<&str>,
    ) -> Result<HashMap<String, Token>, AppError> {
        let entries: AssetEntriesResponse = self
            .node
            .get("/elys/assetprofile/entry_all", &[])
            .await?;
        let prices: OraclePricesResponse = self.node.get("/elys/oracle/price_all", &[]).await?;

        let mut price_by_symbol: HashMap<String, (f64, bool)> = HashMap::new();
        for raw in prices.price {
            let value = parse_decimal_field(&raw.price, "oracle price")?;
            if value <= 0.0 {
                return Err(AppError::PoolData(format!(
                    "oracle price for {} is {value}",
                    raw.asset
                )));
            }
            price_by_symbol.insert(raw.asset.to_uppercase(), (value, raw.source == "oracle"));
        }

        let mut tokens = HashMap::new();
        for entry in entries.entry {
            if !tradable.is_empty() && !tradable.contains(entry.denom.as_str()) {
                continue;
            }
            let Some(&(price_usd, oracle_sourced)) =
                price_by_symbol.get(&entry.symbol.to_uppercase())
            else {
                tracing::warn!(symbol = %entry.symbol, denom = %entry.denom, "no price for token, skipping");
                continue;
            };
            if entry.decimals > 18 {
                return Err(AppError::PoolData(format!(
                    "token {} has precision {}",
                    entry.symbol, entry.decimals
                )));
            }

            let mut token = Token {
                symbol: entry.symbol.clone(),
                base_denom: entry.base_denom,
                ibc_denom: entry.denom.clone(),
                precision: entry.decimals,
                price_usd,
                oracle_sourced,
                price_series: Vec::new(),
                volatility: 0.0,
            };

            // The stable quote asset carries no volatility of its own;
            // everything else needs a full candle history.
            if token.symbol != USDC_SYMBOL {
                let series = self.price_history.hourly_closes(&token.symbol).await?;
                token.volatility =
                    annualized_volatility(&series, HOURLY_ANNUALIZATION_FACTOR)?;
                token.price_series = series;
            }

            tokens.insert(entry.denom, token);
        }

        if tokens.is_empty() {
            return Err(AppError::DataMissing("no usable tokens from node".into()));
        }
        tracing::info!(tokens = tokens.len(), "token metadata assembled");
        Ok(tokens)
    }

    async fn fetch_pool_aprs(&self) -> Result<HashMap<PoolId, (f64, f64)>, AppError> {
        let response: PoolAprsResponse = self.node.get("/elys/incentive/pool_aprs", &[]).await?;
        let mut aprs = HashMap::new();
        for raw in response.data {
            let pool_id: PoolId = raw
                .pool_id
                .parse()
                .map_err(|_| AppError::Rpc(format!("bad pool id '{}' in APRs", raw.pool_id)))?;
            aprs.insert(
                pool_id,
                (
                    parse_decimal_field(&raw.eden_apr, "eden_apr")?,
                    parse_decimal_field(&raw.usdc_fee_apr, "usdc_fee_apr")?,
                ),
            );
        }
        Ok(aprs)
    }

    async fn fetch_pools_paginated(&self) -> Result<Vec<(PoolRaw, PoolExtraRaw)>, AppError> {
        let mut out = Vec::new();
        let mut next_key: Option<String> = None;
        loop {
            let mut query = vec![("pagination.limit", PAGE_LIMIT.to_string())];
            if let Some(key) = &next_key {
                query.push(("pagination.key", key.clone()));
            }
            let page: PoolsPageResponse = self.node.get("/elys/amm/pool_all", &query).await?;
            if page.pool.len() != page.extra_infos.len() {
                return Err(AppError::Rpc(format!(
                    "pool listing returned {} pools but {} extra infos",
                    page.pool.len(),
                    page.extra_infos.len()
                )));
            }
            out.extend(page.pool.into_iter().zip(page.extra_infos));
            match page.pagination.next_key {
                Some(key) if !key.is_empty() => next_key = Some(key),
                _ => break,
            }
        }
        Ok(out)
    }

    fn assemble_pool(
        raw: PoolRaw,
        extra: PoolExtraRaw,
        aprs: &HashMap<PoolId, (f64, f64)>,
        volume: &HashMap<PoolId, f64>,
        tokens: &HashMap<String, Token>,
        now: DateTime<Utc>,
    ) -> Result<Option<Pool>, AppError> {
        let pool_id: PoolId = raw
            .pool_id
            .parse()
            .map_err(|_| AppError::Rpc(format!("bad pool id '{}'", raw.pool_id)))?;

        if raw.pool_assets.len() != 2 {
            tracing::debug!(pool_id, assets = raw.pool_assets.len(), "skipping non-pair pool");
            return Ok(None);
        }

        let mut legs = Vec::with_capacity(2);
        for asset in &raw.pool_assets {
            let Some(token) = tokens.get(&asset.token.denom) else {
                tracing::debug!(pool_id, denom = %asset.token.denom, "skipping pool with unsupported token");
                return Ok(None);
            };
            let balance = parse_int_field(&asset.token.amount, "pool balance")?;
            let weight = parse_decimal_field(&asset.weight, "pool weight")?;
            legs.push((token.clone(), balance, weight));
        }

        // Token A is always the volatile, non-USDC leg.
        if legs[0].0.symbol == USDC_SYMBOL {
            legs.swap(0, 1);
        }

        let weight_total: f64 = legs.iter().map(|(_, _, w)| w).sum();
        if weight_total <= 0.0 {
            return Err(AppError::PoolData(format!(
                "pool {pool_id}: non-positive weight total"
            )));
        }

        let (eden_apr, usdc_fee_apr) = aprs.get(&pool_id).copied().unwrap_or((0.0, 0.0));
        let age_days = (now - extra.created_at).num_days().max(0);

        let (token_a, balance_a, weight_a) = legs.remove(0);
        let (token_b, balance_b, weight_b) = legs.remove(0);

        let pool = Pool {
            id: pool_id,
            token_a,
            token_b,
            balance_a,
            balance_b,
            weight_a: weight_a / weight_total,
            weight_b: weight_b / weight_total,
            tvl_usd: parse_decimal_field(&extra.tvl_usd, "tvl_usd")?,
            volume_7d_usd: volume.get(&pool_id).copied().unwrap_or(0.0),
            eden_apr,
            usdc_fee_apr,
            price_impact_apr: parse_decimal_field(&extra.price_impact_apr, "price_impact_apr")?,
            is_smart_shielded: raw.pool_params.use_oracle,
            swap_fee: parse_decimal_field(&raw.pool_params.swap_fee, "swap_fee")?,
            age_days,
            sentiment: 0.0,
            total_shares: parse_int_field(&raw.total_shares.amount, "total_shares")?,
            has_position: false,
            position_age_days: 0,
            position_value_usd: 0.0,
        };
        pool.validate()?;
        Ok(Some(pool))
    }
}

#[async_trait]
impl MarketDataProvider for NodeMarketData {
    async fn snapshot(&self, tradable_denoms: &[String]) -> Result<MarketSnapshot, AppError> {
        let tradable: HashSet<&str> = tradable_denoms.iter().map(String::as_str).collect();

        let tokens = self.fetch_tokens(&tradable).await?;
        let aprs = self.fetch_pool_aprs().await?;
        let volume = match self.volume.weekly_volume_by_pool().await {
            Ok(map) => map,
            Err(e) => {
                // Volume only shapes the reward score; a dead feed should
                // not stall rebalancing.
                tracing::warn!(error = %e, "weekly volume unavailable, scoring on APR only");
                HashMap::new()
            }
        };

        let raw_pools = self.fetch_pools_paginated().await?;
        let now = Utc::now();
        let mut pools = Vec::with_capacity(raw_pools.len());
        for (raw, extra) in raw_pools {
            if let Some(pool) = Self::assemble_pool(raw, extra, &aprs, &volume, &tokens, now)? {
                pools.push(pool);
            }
        }
        if pools.is_empty() {
            return Err(AppError::DataMissing("no scoreable pools".into()));
        }

        tracing::info!(pools = pools.len(), tokens = tokens.len(), "market snapshot complete");
        Ok(MarketSnapshot { tokens, pools })
    }
}
