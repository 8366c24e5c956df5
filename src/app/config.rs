// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::constants::DEFAULT_CYCLE_INTERVAL_SECS;
use crate::domain::error::AppError;
use config::{Config, Environment};
use serde::Deserialize;

/// Process configuration, loaded from environment variables (plus a
/// `.env` file when present). Every identity, endpoint, and keyring
/// variable is required; defaults exist only for tuning knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    /// Safety switch. The process refuses to run unless this is exactly
    /// "live".
    pub avm_mode: String,

    // Identity
    pub avm_vault_id: u64,
    pub chain_id: String,

    // Keyring (owned by the signer sidecar; the key name selects which
    // key signs vault actions)
    pub keyring_backend: String,
    pub keyring_dir: String,
    pub keyring_key_name: String,

    // Endpoints
    pub node_rpc: String,
    pub signer_url: String,
    pub volume_api_url: String,
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    pub price_api_key: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    // Gas & fees
    pub gas_default_limit: u64,
    pub gas_adjustment: f64,
    pub gas_price_amount: f64,
    pub gas_price_denom: String,
    #[serde(default = "default_fee_precision")]
    pub gas_fee_denom_precision: u32,
    pub gas_fee_denom_usd_price: f64,

    // Vault settlement asset
    pub usdc_denom: String,
    #[serde(default = "default_usdc_precision")]
    pub usdc_precision: u32,

    // Cadence & logging
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_price_api_url() -> String {
    "https://min-api.cryptocompare.com/data/v2/histohour".to_string()
}
fn default_database_url() -> String {
    "sqlite://avm.db?mode=rwc".to_string()
}
fn default_cycle_interval() -> u64 {
    DEFAULT_CYCLE_INTERVAL_SECS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_usdc_precision() -> u32 {
    6
}
fn default_fee_precision() -> u32 {
    6
}

impl GlobalSettings {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let settings: GlobalSettings = Config::builder()
            .add_source(Environment::default())
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.avm_vault_id == 0 {
            return Err(AppError::Config("AVM_VAULT_ID must be positive".into()));
        }
        for (value, name) in [
            (&self.chain_id, "CHAIN_ID"),
            (&self.keyring_backend, "KEYRING_BACKEND"),
            (&self.keyring_dir, "KEYRING_DIR"),
            (&self.keyring_key_name, "KEYRING_KEY_NAME"),
            (&self.node_rpc, "NODE_RPC"),
            (&self.signer_url, "SIGNER_URL"),
            (&self.volume_api_url, "VOLUME_API_URL"),
            (&self.price_api_key, "PRICE_API_KEY"),
            (&self.usdc_denom, "USDC_DENOM"),
            (&self.gas_price_denom, "GAS_PRICE_DENOM"),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{name} is required but empty")));
            }
        }
        if self.gas_default_limit == 0 {
            return Err(AppError::Config("GAS_DEFAULT_LIMIT must be positive".into()));
        }
        if !self.gas_adjustment.is_finite() || self.gas_adjustment < 1.0 {
            return Err(AppError::Config(
                "GAS_ADJUSTMENT must be at least 1.0".into(),
            ));
        }
        if !self.gas_price_amount.is_finite() || self.gas_price_amount < 0.0 {
            return Err(AppError::Config(
                "GAS_PRICE_AMOUNT must be non-negative".into(),
            ));
        }
        if !self.gas_fee_denom_usd_price.is_finite() || self.gas_fee_denom_usd_price < 0.0 {
            return Err(AppError::Config(
                "GAS_FEE_DENOM_USD_PRICE must be non-negative".into(),
            ));
        }
        if self.usdc_precision > 18 || self.gas_fee_denom_precision > 18 {
            return Err(AppError::Config("precision cannot exceed 18".into()));
        }
        if self.cycle_interval_secs == 0 {
            return Err(AppError::Config(
                "CYCLE_INTERVAL_SECS must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The live-mode gate. Anything except exactly "live" halts startup.
    pub fn ensure_live_mode(&self) -> Result<(), AppError> {
        if self.avm_mode != "live" {
            return Err(AppError::Config(format!(
                "AVM_MODE is '{}', not 'live'. Halting to prevent accidental execution.",
                self.avm_mode
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GlobalSettings {
        GlobalSettings {
            avm_mode: "live".into(),
            avm_vault_id: 3,
            chain_id: "elys-1".into(),
            keyring_backend: "file".into(),
            keyring_dir: "/var/keyring".into(),
            keyring_key_name: "avm".into(),
            node_rpc: "http://localhost:1317".into(),
            signer_url: "http://localhost:9191".into(),
            volume_api_url: "https://volume.example.test/weekly".into(),
            price_api_url: default_price_api_url(),
            price_api_key: "key".into(),
            database_url: default_database_url(),
            gas_default_limit: 600_000,
            gas_adjustment: 1.3,
            gas_price_amount: 0.02,
            gas_price_denom: "uelys".into(),
            gas_fee_denom_precision: 6,
            gas_fee_denom_usd_price: 0.4,
            usdc_denom: "ibc/USDC".into(),
            usdc_precision: 6,
            cycle_interval_secs: 600,
            log_level: "info".into(),
            log_json: false,
        }
    }

    #[test]
    fn valid_settings_pass() {
        settings().validate().unwrap();
        settings().ensure_live_mode().unwrap();
    }

    #[test]
    fn non_live_mode_is_rejected() {
        let mut s = settings();
        s.avm_mode = "test".into();
        assert!(s.ensure_live_mode().is_err());
        s.avm_mode = "LIVE".into();
        assert!(s.ensure_live_mode().is_err());
    }

    #[test]
    fn zero_vault_id_is_rejected() {
        let mut s = settings();
        s.avm_vault_id = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn empty_required_field_is_rejected() {
        let mut s = settings();
        s.price_api_key = String::new();
        assert!(s.validate().is_err());
    }

    #[test]
    fn low_gas_adjustment_is_rejected() {
        let mut s = settings();
        s.gas_adjustment = 0.8;
        assert!(s.validate().is_err());
    }
}
