// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::convert::amount_to_f64;
use crate::common::retry::retry_async;
use crate::domain::error::AppError;
use crate::domain::position::{Position, SubAction, TokenPosition, TransactionResult};
use crate::infrastructure::network::node::{parse_decimal_field, parse_int_field, NodeClient};
use crate::services::vault::msgs::{build_vault_messages, VaultMsg};
use crate::services::vault::VaultExecutor;
use async_trait::async_trait;
use num_bigint::Sign;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Inclusion polling: base 2 s doubling to 30 s, up to 30 attempts
/// (several minutes of block time before the cycle gives up).
const INCLUSION_ATTEMPTS: usize = 30;
const INCLUSION_BASE_DELAY: Duration = Duration::from_secs(2);
const INCLUSION_MAX_DELAY: Duration = Duration::from_secs(30);

/// Gas and fee reporting knobs. The chain enforces the real limit; these
/// only shape the fee estimate and the USD figure in snapshots.
#[derive(Clone, Debug)]
pub struct GasConfig {
    pub default_gas_limit: u64,
    pub gas_adjustment: f64,
    /// Fee denom units charged per unit of gas.
    pub price_per_gas: f64,
    pub fee_denom_precision: u32,
    pub fee_denom_usd_price: f64,
}

impl GasConfig {
    fn fee_usd(&self, gas_wanted: u64) -> f64 {
        let fee_units = gas_wanted as f64 * self.price_per_gas;
        fee_units / 10f64.powi(self.fee_denom_precision as i32) * self.fee_denom_usd_price
    }
}

#[derive(Clone, Debug)]
pub struct BroadcastOutcome {
    pub tx_hash: String,
    pub gas_used: i64,
    pub gas_wanted: i64,
}

/// The opaque signing boundary. Implementations own keyring access,
/// transaction encoding, and fee handling; the vault only hands them
/// fully-formed action messages.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Estimate gas for the batch. Failures are survivable; the caller
    /// falls back to the configured default.
    async fn simulate_gas(&self, msgs: &[VaultMsg]) -> Result<u64, AppError>;

    /// Sign and broadcast, returning the accepted tx hash.
    async fn broadcast(&self, msgs: &[VaultMsg], gas_limit: u64) -> Result<String, AppError>;
}

#[derive(Serialize)]
struct SignerRequest<'a> {
    chain_id: &'a str,
    key_name: &'a str,
    gas_limit: u64,
    msgs: &'a [VaultMsg],
}

#[derive(Deserialize)]
struct SignerBroadcastResponse {
    tx_hash: String,
}

#[derive(Deserialize)]
struct SignerSimulateResponse {
    gas_used: u64,
}

/// Broadcaster backed by the keyring sidecar, which holds the signing key
/// and submits to the node. The daemon itself never touches key material.
pub struct SignerSidecar {
    http: Client,
    base_url: String,
    chain_id: String,
    key_name: String,
}

impl SignerSidecar {
    pub fn new(base_url: &str, chain_id: &str, key_name: &str) -> Result<Self, AppError> {
        if base_url.is_empty() {
            return Err(AppError::Config("signer url is empty".into()));
        }
        if chain_id.is_empty() || key_name.is_empty() {
            return Err(AppError::Config("chain id and key name are required".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_id: chain_id.to_string(),
            key_name: key_name.to_string(),
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &SignerRequest<'_>,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Rpc(format!("signer {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Rpc(format!(
                "signer {url} returned {status}: {}",
                body.chars().take(256).collect::<String>()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Rpc(format!("signer {url}: invalid JSON: {e}")))
    }
}

#[async_trait]
impl TxBroadcaster for SignerSidecar {
    async fn simulate_gas(&self, msgs: &[VaultMsg]) -> Result<u64, AppError> {
        let request = SignerRequest {
            chain_id: &self.chain_id,
            key_name: &self.key_name,
            gas_limit: 0,
            msgs,
        };
        let response: SignerSimulateResponse = self.post("/tx/simulate", &request).await?;
        Ok(response.gas_used)
    }

    async fn broadcast(&self, msgs: &[VaultMsg], gas_limit: u64) -> Result<String, AppError> {
        let request = SignerRequest {
            chain_id: &self.chain_id,
            key_name: &self.key_name,
            gas_limit,
            msgs,
        };
        let response: SignerBroadcastResponse = self.post("/tx/broadcast", &request).await?;
        if response.tx_hash.is_empty() {
            return Err(AppError::Rpc("signer returned empty tx hash".into()));
        }
        Ok(response.tx_hash)
    }
}

/// Rehearsal broadcaster for `--dry-run`: logs what would be sent and
/// fabricates a result so the rest of the cycle can be observed.
pub struct DryRunBroadcaster;

#[async_trait]
impl TxBroadcaster for DryRunBroadcaster {
    async fn simulate_gas(&self, msgs: &[VaultMsg]) -> Result<u64, AppError> {
        Ok(msgs.len() as u64 * 250_000)
    }

    async fn broadcast(&self, msgs: &[VaultMsg], gas_limit: u64) -> Result<String, AppError> {
        tracing::info!(
            msgs = msgs.len(),
            gas_limit,
            payload = %serde_json::to_string(msgs).unwrap_or_default(),
            "dry run: transaction not broadcast"
        );
        Ok("DRYRUN".into())
    }
}

// --- Node wire DTOs for vault reads ---

#[derive(Deserialize)]
struct VaultBalanceRaw {
    denom: String,
    symbol: String,
    amount: String,
    usd_value: String,
}

#[derive(Deserialize)]
struct VaultBalancesResponse {
    balances: Vec<VaultBalanceRaw>,
}

#[derive(Deserialize)]
struct VaultPositionRaw {
    pool_id: String,
    lp_shares: String,
    age_days: i64,
    usd_value: String,
}

#[derive(Deserialize)]
struct VaultPositionsResponse {
    positions: Vec<VaultPositionRaw>,
}

#[derive(Deserialize)]
struct VaultValueResponse {
    total_usd_value: String,
}

#[derive(Deserialize)]
struct TradableDenomsResponse {
    denoms: Vec<String>,
}

#[derive(Deserialize)]
struct TxLookupResponse {
    height: i64,
    code: u32,
    #[serde(default)]
    raw_log: String,
    gas_used: String,
    gas_wanted: String,
}

/// Production vault executor: reads vault module state from the node and
/// executes plans through a `TxBroadcaster`.
pub struct LiveVault {
    vault_id: u64,
    node: NodeClient,
    broadcaster: Arc<dyn TxBroadcaster>,
    usdc_denom: String,
    usdc_precision: u32,
    gas: GasConfig,
}

impl LiveVault {
    pub fn new(
        vault_id: u64,
        node: NodeClient,
        broadcaster: Arc<dyn TxBroadcaster>,
        usdc_denom: &str,
        usdc_precision: u32,
        gas: GasConfig,
    ) -> Result<Self, AppError> {
        if vault_id == 0 {
            return Err(AppError::Config("vault id cannot be zero".into()));
        }
        if usdc_denom.is_empty() {
            return Err(AppError::Config("USDC denom is required".into()));
        }
        Ok(Self {
            vault_id,
            node,
            broadcaster,
            usdc_denom: usdc_denom.to_string(),
            usdc_precision,
            gas,
        })
    }

    async fn balances(&self) -> Result<Vec<VaultBalanceRaw>, AppError> {
        let response: VaultBalancesResponse = self
            .node
            .get(&format!("/elys/vaults/{}/balances", self.vault_id), &[])
            .await?;
        Ok(response.balances)
    }

    /// Wait for the broadcast transaction to land in a block, with
    /// exponential backoff. A transaction that executes with a non-zero
    /// code failed on-chain (min-out protection firing shows up here).
    async fn await_inclusion(&self, tx_hash: &str) -> Result<TxLookupResponse, AppError> {
        let node = self.node.clone();
        let hash = tx_hash.to_string();
        let lookup = retry_async(
            move |attempt| {
                let node = node.clone();
                let hash = hash.clone();
                async move {
                    if attempt > 1 {
                        tracing::debug!(tx_hash = %hash, attempt, "polling for tx inclusion");
                    }
                    node.get::<TxLookupResponse>(&format!("/cosmos/tx/v1beta1/txs/{hash}"), &[])
                        .await
                }
            },
            INCLUSION_ATTEMPTS,
            INCLUSION_BASE_DELAY,
            INCLUSION_MAX_DELAY,
        )
        .await
        .map_err(|e| AppError::Rpc(format!("tx {tx_hash} not included: {e}")))?;
        Ok(lookup)
    }
}

#[async_trait]
impl VaultExecutor for LiveVault {
    async fn liquid_usdc(&self) -> Result<f64, AppError> {
        for balance in self.balances().await? {
            if balance.denom == self.usdc_denom {
                let amount = parse_int_field(&balance.amount, "usdc balance")?;
                return amount_to_f64(&amount, self.usdc_precision);
            }
        }
        Ok(0.0)
    }

    async fn pool_positions(&self) -> Result<Vec<Position>, AppError> {
        let response: VaultPositionsResponse = self
            .node
            .get(&format!("/elys/vaults/{}/positions", self.vault_id), &[])
            .await?;

        let mut positions = Vec::with_capacity(response.positions.len());
        for raw in response.positions {
            let pool_id = raw
                .pool_id
                .parse()
                .map_err(|_| AppError::Rpc(format!("bad pool id '{}'", raw.pool_id)))?;
            let lp_shares = parse_int_field(&raw.lp_shares, "lp_shares")?;
            if lp_shares.sign() != Sign::Plus {
                // Zero-share rows are stale index entries, not positions.
                continue;
            }
            positions.push(Position {
                pool_id,
                lp_shares,
                age_days: raw.age_days.max(0),
                usd_value: parse_decimal_field(&raw.usd_value, "position usd_value")?,
            });
        }
        Ok(positions)
    }

    async fn non_pool_positions(&self) -> Result<Vec<TokenPosition>, AppError> {
        let mut out = Vec::new();
        for balance in self.balances().await? {
            if balance.denom == self.usdc_denom {
                continue;
            }
            let amount = parse_int_field(&balance.amount, "balance")?;
            if amount.sign() != Sign::Plus {
                continue;
            }
            out.push(TokenPosition {
                denom: balance.denom,
                symbol: balance.symbol,
                amount,
                usd_value: parse_decimal_field(&balance.usd_value, "balance usd_value")?,
            });
        }
        Ok(out)
    }

    async fn total_vault_value_usd(&self) -> Result<f64, AppError> {
        let response: VaultValueResponse = self
            .node
            .get(&format!("/elys/vaults/{}/value", self.vault_id), &[])
            .await?;
        let value = parse_decimal_field(&response.total_usd_value, "total_usd_value")?;
        if value < 0.0 {
            return Err(AppError::Rpc(format!("vault value is negative: {value}")));
        }
        Ok(value)
    }

    async fn tradable_denoms(&self) -> Result<Vec<String>, AppError> {
        let response: TradableDenomsResponse = self
            .node
            .get(
                &format!("/elys/vaults/{}/tradable_denoms", self.vault_id),
                &[],
            )
            .await?;
        if response.denoms.is_empty() {
            return Err(AppError::DataMissing(
                "vault has no tradable denoms configured".into(),
            ));
        }
        Ok(response.denoms)
    }

    async fn execute_action_plan(
        &self,
        actions: &[SubAction],
    ) -> Result<TransactionResult, AppError> {
        if actions.is_empty() {
            return Err(AppError::Config("empty action plan".into()));
        }

        let msgs = build_vault_messages(self.vault_id, actions)?;

        // Gas estimation is best-effort: the chain enforces both the
        // limit and every min-out, so a failed estimate only risks an
        // overpriced fee, not a bad fill.
        let gas_limit = match self.broadcaster.simulate_gas(&msgs).await {
            Ok(simulated) => {
                let adjusted = (simulated as f64 * self.gas.gas_adjustment) as u64;
                adjusted.max(1)
            }
            Err(e) => {
                tracing::warn!(error = %e, default = self.gas.default_gas_limit, "gas simulation failed, using default limit");
                self.gas.default_gas_limit
            }
        };

        let tx_hash = self.broadcaster.broadcast(&msgs, gas_limit).await?;
        tracing::info!(tx_hash = %tx_hash, msgs = msgs.len(), gas_limit, "action plan broadcast");

        if tx_hash == "DRYRUN" {
            return Ok(TransactionResult {
                tx_hash,
                gas_used: 0,
                gas_wanted: gas_limit as i64,
                gas_fee_usd: 0.0,
                success: true,
                error: None,
            });
        }

        let lookup = self.await_inclusion(&tx_hash).await?;
        let gas_used: i64 = lookup.gas_used.parse().unwrap_or(0);
        let gas_wanted: i64 = lookup.gas_wanted.parse().unwrap_or(gas_limit as i64);
        let success = lookup.code == 0;
        let result = TransactionResult {
            tx_hash: tx_hash.clone(),
            gas_used,
            gas_wanted,
            gas_fee_usd: self.gas.fee_usd(gas_wanted.max(0) as u64),
            success,
            error: if success { None } else { Some(lookup.raw_log.clone()) },
        };
        if !success {
            tracing::error!(tx_hash = %tx_hash, code = lookup.code, log = %lookup.raw_log, "transaction failed on-chain");
            return Err(AppError::Rpc(format!(
                "tx {tx_hash} failed on-chain (code {}): {}",
                lookup.code, lookup.raw_log
            )));
        }
        tracing::info!(tx_hash = %tx_hash, height = lookup.height, gas_used, "transaction included");
        Ok(result)
    }
}
