// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::domain::pool::PoolId;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: usize = 3;
/// Weekly volume above this is assumed to be a data error, not a market.
const MAX_PLAUSIBLE_VOLUME_USD: f64 = 1e12;

#[derive(Deserialize, Debug, Clone)]
pub struct WeeklyVolumeEntry {
    pub pool_id: String,
    pub denom_a: String,
    pub denom_b: String,
    pub volume_a_usd: f64,
    pub volume_b_usd: f64,
    /// RFC3339 date of the week bucket.
    pub date: String,
}

/// Fetch per-pool weekly volume and reduce it to one USD figure per pool,
/// using the most recent valid entry. Invalid entries are skipped with a
/// warning; an entirely invalid feed is an error.
pub struct VolumeApi {
    client: Client,
    url: String,
}

impl VolumeApi {
    pub fn new(url: &str) -> Result<Self, AppError> {
        if url.is_empty() {
            return Err(AppError::Config("volume API url is empty".into()));
        }
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn weekly_volume_by_pool(&self) -> Result<HashMap<PoolId, f64>, AppError> {
        let entries = retry_async(
            |attempt| async move {
                if attempt > 1 {
                    tracing::warn!(attempt, "retrying weekly volume fetch");
                }
                self.fetch().await
            },
            MAX_ATTEMPTS,
            Duration::from_secs(1),
            Duration::from_secs(8),
        )
        .await?;

        reduce_entries(&entries, Utc::now())
    }

    async fn fetch(&self) -> Result<Vec<WeeklyVolumeEntry>, AppError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ApiCall {
                provider: "volume API".into(),
                status: status.as_u16(),
            });
        }
        response
            .json::<Vec<WeeklyVolumeEntry>>()
            .await
            .map_err(|e| AppError::Rpc(format!("volume API: invalid JSON: {e}")))
    }
}

fn validate_entry(entry: &WeeklyVolumeEntry, now: DateTime<Utc>) -> Result<(PoolId, DateTime<Utc>), AppError> {
    let pool_id: PoolId = entry
        .pool_id
        .trim()
        .parse()
        .map_err(|_| AppError::Rpc(format!("invalid pool id '{}'", entry.pool_id)))?;
    if pool_id == 0 {
        return Err(AppError::Rpc("pool id cannot be zero".into()));
    }
    if entry.denom_a.is_empty() || entry.denom_b.is_empty() {
        return Err(AppError::Rpc(format!("pool {pool_id}: empty denom")));
    }
    if entry.denom_a == entry.denom_b {
        return Err(AppError::Rpc(format!(
            "pool {pool_id}: identical denoms {}",
            entry.denom_a
        )));
    }

    let date = DateTime::parse_from_rfc3339(&entry.date)
        .map_err(|e| AppError::Rpc(format!("pool {pool_id}: bad date '{}': {e}", entry.date)))?
        .with_timezone(&Utc);
    if date > now + ChronoDuration::hours(24) {
        return Err(AppError::Rpc(format!(
            "pool {pool_id}: date {date} is in the future"
        )));
    }
    if date < now - ChronoDuration::days(365) {
        return Err(AppError::Rpc(format!(
            "pool {pool_id}: date {date} is older than a year"
        )));
    }

    for (value, name) in [
        (entry.volume_a_usd, "volume_a_usd"),
        (entry.volume_b_usd, "volume_b_usd"),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Rpc(format!("pool {pool_id}: {name} is {value}")));
        }
        if value > MAX_PLAUSIBLE_VOLUME_USD {
            return Err(AppError::Rpc(format!(
                "pool {pool_id}: {name} {value} is implausibly large"
            )));
        }
    }
    if entry.volume_a_usd == 0.0 && entry.volume_b_usd == 0.0 {
        return Err(AppError::Rpc(format!(
            "pool {pool_id}: both volumes are zero"
        )));
    }

    Ok((pool_id, date))
}

/// Keep the newest valid entry per pool and sum both legs into one USD
/// figure.
fn reduce_entries(
    entries: &[WeeklyVolumeEntry],
    now: DateTime<Utc>,
) -> Result<HashMap<PoolId, f64>, AppError> {
    let mut newest: HashMap<PoolId, (DateTime<Utc>, f64)> = HashMap::new();
    let mut skipped = 0usize;

    for entry in entries {
        match validate_entry(entry, now) {
            Ok((pool_id, date)) => {
                let volume = entry.volume_a_usd + entry.volume_b_usd;
                match newest.get(&pool_id) {
                    Some((existing, _)) if *existing >= date => {}
                    _ => {
                        newest.insert(pool_id, (date, volume));
                    }
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(error = %e, "skipping invalid volume entry");
            }
        }
    }

    if newest.is_empty() {
        return Err(AppError::DataMissing(
            "no valid weekly volume entries found".into(),
        ));
    }
    if skipped > 0 {
        tracing::warn!(skipped, kept = newest.len(), "volume feed had invalid entries");
    }

    Ok(newest
        .into_iter()
        .map(|(pool_id, (_, volume))| (pool_id, volume))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pool_id: &str, date: &str, volume_a: f64, volume_b: f64) -> WeeklyVolumeEntry {
        WeeklyVolumeEntry {
            pool_id: pool_id.into(),
            denom_a: "uatom".into(),
            denom_b: "uusdc".into(),
            volume_a_usd: volume_a,
            volume_b_usd: volume_b,
            date: date.into(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn sums_both_legs() {
        let entries = [entry("3", "2026-07-28T00:00:00Z", 1000.0, 250.0)];
        let map = reduce_entries(&entries, now()).unwrap();
        assert_eq!(map[&3], 1250.0);
    }

    #[test]
    fn newest_entry_wins() {
        let entries = [
            entry("3", "2026-07-20T00:00:00Z", 100.0, 100.0),
            entry("3", "2026-07-28T00:00:00Z", 900.0, 100.0),
            entry("3", "2026-07-10T00:00:00Z", 1.0, 1.0),
        ];
        let map = reduce_entries(&entries, now()).unwrap();
        assert_eq!(map[&3], 1000.0);
    }

    #[test]
    fn invalid_entries_are_skipped_not_fatal() {
        let entries = [
            entry("0", "2026-07-28T00:00:00Z", 5.0, 5.0), // zero pool id
            entry("4", "2026-07-28T00:00:00Z", 5.0, 5.0),
        ];
        let map = reduce_entries(&entries, now()).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&4));
    }

    #[test]
    fn entirely_invalid_feed_is_an_error() {
        let entries = [
            entry("1", "2026-07-28T00:00:00Z", 0.0, 0.0),       // both zero
            entry("2", "2027-09-01T00:00:00Z", 5.0, 5.0),       // future
            entry("3", "2024-01-01T00:00:00Z", 5.0, 5.0),       // too old
            entry("4", "2026-07-28T00:00:00Z", 5.0, 2e12),      // implausible
        ];
        assert!(matches!(
            reduce_entries(&entries, now()),
            Err(AppError::DataMissing(_))
        ));
    }

    #[test]
    fn identical_denoms_rejected() {
        let mut bad = entry("9", "2026-07-28T00:00:00Z", 5.0, 5.0);
        bad.denom_b = bad.denom_a.clone();
        assert!(validate_entry(&bad, now()).is_err());
    }

    #[test]
    fn slightly_future_date_within_tolerance() {
        let entries = [entry("6", "2026-08-01T12:00:00Z", 10.0, 0.0)];
        let map = reduce_entries(&entries, now()).unwrap();
        assert_eq!(map[&6], 10.0);
    }
}
