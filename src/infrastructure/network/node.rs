// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// State reads must be fast; a node that cannot answer in 10 s is treated
/// as down and the cycle aborts.
const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Simulations and broadcasts run pool math server-side and get longer.
const SLOW_TIMEOUT: Duration = Duration::from_secs(20);

/// Thin JSON query client for the chain node. All higher-level fetchers
/// and the simulator go through this so timeouts live in one place.
#[derive(Clone)]
pub struct NodeClient {
    read_client: Client,
    slow_client: Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        if base_url.is_empty() {
            return Err(AppError::Config("node RPC url is empty".into()));
        }
        let read_client = Client::builder()
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;
        let slow_client = Client::builder()
            .timeout(SLOW_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;
        Ok(Self {
            read_client,
            slow_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a state-read endpoint with the fast timeout.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.request(&self.read_client, path, query).await
    }

    /// GET a simulation endpoint with the slow timeout.
    pub async fn get_slow<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.request(&self.slow_client, path, query).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        client: &Client,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Rpc(format!("GET {url}: {e}")))?;
        Self::decode(response, &url).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Rpc(format!(
                "{url} returned {status}: {}",
                body.chars().take(256).collect::<String>()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Rpc(format!("{url}: invalid JSON: {e}")))
    }
}

/// Parse a decimal string field from a node response into f64, rejecting
/// non-finite results. Chain decimals arrive as strings to avoid float
/// wire encodings.
pub fn parse_decimal_field(raw: &str, field: &str) -> Result<f64, AppError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Rpc(format!("field {field}: cannot parse '{raw}'")))?;
    if !value.is_finite() {
        return Err(AppError::Rpc(format!("field {field}: non-finite '{raw}'")));
    }
    Ok(value)
}

/// Parse a fixed-point integer string field.
pub fn parse_int_field(raw: &str, field: &str) -> Result<num_bigint::BigInt, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Rpc(format!("field {field}: cannot parse integer '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url() {
        assert!(NodeClient::new("").is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let client = NodeClient::new("http://localhost:1317/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:1317");
    }

    #[test]
    fn parses_decimal_fields() {
        assert_eq!(parse_decimal_field("0.0312", "slippage").unwrap(), 0.0312);
        assert!(parse_decimal_field("not-a-number", "slippage").is_err());
        assert!(parse_decimal_field("inf", "slippage").is_err());
    }

    #[test]
    fn parses_int_fields() {
        use num_bigint::BigInt;
        assert_eq!(
            parse_int_field("123456789", "amount").unwrap(),
            BigInt::from(123_456_789u64)
        );
        assert!(parse_int_field("12.5", "amount").is_err());
    }
}
