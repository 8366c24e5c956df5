// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::retry::retry_async;
use crate::domain::constants::REQUIRED_PRICE_SAMPLES;
use crate::domain::error::AppError;
use crate::domain::token::PricePoint;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: usize = 3;
/// Candle history barely moves within a cycle; one fetch per token per
/// cycle is plenty.
const CACHE_TTL: Duration = Duration::from_secs(540);

/// Source of exactly `REQUIRED_PRICE_SAMPLES` hourly closes per symbol.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn hourly_closes(&self, symbol: &str) -> Result<Vec<PricePoint>, AppError>;
}

#[derive(Deserialize, Debug, Clone)]
struct CandleRaw {
    time: i64,
    close: f64,
    high: f64,
    low: f64,
    open: f64,
    #[serde(rename = "volumefrom")]
    volume_from: f64,
    #[serde(rename = "volumeto")]
    volume_to: f64,
}

#[derive(Deserialize, Debug)]
struct CandleData {
    #[serde(rename = "Data")]
    data: Vec<CandleRaw>,
}

#[derive(Deserialize, Debug)]
struct CandleResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "HasWarning", default)]
    has_warning: bool,
    #[serde(rename = "Data")]
    data: CandleData,
}

/// Hourly candle client with per-candle validation. Volatility feeds
/// allocation decisions, so a malformed candle fails the whole fetch
/// rather than being patched over.
pub struct CandleApi {
    client: Client,
    base_url: String,
    api_key: String,
    cache: Arc<DashMap<String, (Vec<PricePoint>, Instant)>>,
}

impl CandleApi {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        if api_key.is_empty() {
            return Err(AppError::Config("price API key is required".into()));
        }
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache: Arc::new(DashMap::new()),
        })
    }

    async fn fetch(&self, symbol: &str) -> Result<Vec<PricePoint>, AppError> {
        let url = format!(
            "{}?fsym={}&tsym=USD&limit={}&api_key={}",
            self.base_url, symbol, REQUIRED_PRICE_SAMPLES, self.api_key
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ApiCall {
                provider: "candle API".into(),
                status: status.as_u16(),
            });
        }
        let body: CandleResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rpc(format!("candle API: invalid JSON: {e}")))?;

        if body.response != "Success" {
            return Err(AppError::Rpc(format!(
                "candle API error for {symbol}: {} - {}",
                body.response, body.message
            )));
        }
        if body.has_warning {
            tracing::warn!(symbol, message = %body.message, "candle API returned a warning");
        }

        validate_candles(&body.data.data, symbol)
    }
}

#[async_trait]
impl PriceHistoryProvider for CandleApi {
    async fn hourly_closes(&self, symbol: &str) -> Result<Vec<PricePoint>, AppError> {
        let normalized = symbol.trim().to_uppercase();

        if let Some(entry) = self.cache.get(&normalized) {
            let (series, fetched_at) = entry.value();
            if fetched_at.elapsed() < CACHE_TTL {
                return Ok(series.clone());
            }
        }

        let series = retry_async(
            |attempt| {
                let symbol = normalized.clone();
                async move {
                    if attempt > 1 {
                        tracing::warn!(symbol = %symbol, attempt, "retrying candle fetch");
                    }
                    self.fetch(&symbol).await
                }
            },
            MAX_ATTEMPTS,
            Duration::from_secs(1),
            Duration::from_secs(8),
        )
        .await?;

        self.cache
            .insert(normalized, (series.clone(), Instant::now()));
        Ok(series)
    }
}

/// Validate and convert raw candles into price points, enforcing the
/// sample count and per-candle sanity bounds.
fn validate_candles(candles: &[CandleRaw], symbol: &str) -> Result<Vec<PricePoint>, AppError> {
    if candles.len() < REQUIRED_PRICE_SAMPLES {
        return Err(AppError::DataMissing(format!(
            "{symbol}: received {} hourly candles, need {REQUIRED_PRICE_SAMPLES}",
            candles.len()
        )));
    }

    let mut points = Vec::with_capacity(candles.len());
    for (index, candle) in candles.iter().enumerate() {
        validate_candle(candle, symbol, index)?;
        let timestamp = Utc
            .timestamp_opt(candle.time, 0)
            .single()
            .ok_or_else(|| {
                AppError::Rpc(format!("{symbol}: candle {index} has bad timestamp"))
            })?;
        points.push(PricePoint {
            timestamp,
            price: candle.close,
        });
    }

    validate_time_sequence(&points, symbol)?;

    // Keep exactly the most recent window.
    if points.len() > REQUIRED_PRICE_SAMPLES {
        points.drain(..points.len() - REQUIRED_PRICE_SAMPLES);
    }

    tracing::info!(
        symbol,
        samples = points.len(),
        oldest = %points[0].timestamp,
        newest = %points[points.len() - 1].timestamp,
        "price history validated"
    );
    Ok(points)
}

fn validate_candle(candle: &CandleRaw, symbol: &str, index: usize) -> Result<(), AppError> {
    if candle.time <= 0 {
        return Err(AppError::Rpc(format!(
            "{symbol}: candle {index} has timestamp {}",
            candle.time
        )));
    }
    for (value, name) in [
        (candle.close, "close"),
        (candle.high, "high"),
        (candle.low, "low"),
        (candle.open, "open"),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(AppError::Rpc(format!(
                "{symbol}: candle {index} {name} is {value}"
            )));
        }
    }
    if candle.high < candle.low {
        return Err(AppError::Rpc(format!(
            "{symbol}: candle {index} high {} below low {}",
            candle.high, candle.low
        )));
    }
    if candle.close < candle.low || candle.close > candle.high {
        return Err(AppError::Rpc(format!(
            "{symbol}: candle {index} close {} outside [{}, {}]",
            candle.close, candle.low, candle.high
        )));
    }
    // Open belongs to the previous instant and may sit outside high/low,
    // but an open far from the traded range is data corruption.
    let mid = (candle.high + candle.low) / 2.0;
    let tolerance = mid * 0.5;
    if candle.open < mid - tolerance || candle.open > mid + tolerance {
        return Err(AppError::Rpc(format!(
            "{symbol}: candle {index} open {} unreasonably far from range [{}, {}]",
            candle.open, candle.low, candle.high
        )));
    }
    for (value, name) in [
        (candle.volume_from, "volumefrom"),
        (candle.volume_to, "volumeto"),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Rpc(format!(
                "{symbol}: candle {index} {name} is {value}"
            )));
        }
    }
    Ok(())
}

fn validate_time_sequence(points: &[PricePoint], symbol: &str) -> Result<(), AppError> {
    for (index, pair) in points.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(AppError::Rpc(format!(
                "{symbol}: candles out of order at index {}",
                index + 1
            )));
        }
        let gap = pair[1].timestamp - pair[0].timestamp;
        if gap < ChronoDuration::minutes(30) || gap > ChronoDuration::minutes(90) {
            tracing::warn!(
                symbol,
                index = index + 1,
                gap_minutes = gap.num_minutes(),
                "unusual gap between hourly candles"
            );
        }
    }
    Ok(())
}
