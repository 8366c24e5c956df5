// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use clap::Parser;
use oxidity_vault::app::config::GlobalSettings;
use oxidity_vault::app::logging::setup_logging;
use oxidity_vault::domain::constants::{
    DEFAULT_SCORING_CONFIG_NAME, DEFAULT_SCORING_CONFIG_VERSION,
};
use oxidity_vault::domain::error::AppError;
use oxidity_vault::domain::params::ScoringParameters;
use oxidity_vault::infrastructure::data::db::Database;
use oxidity_vault::infrastructure::network::node::NodeClient;
use oxidity_vault::infrastructure::network::pools::NodeMarketData;
use oxidity_vault::infrastructure::network::price_history::CandleApi;
use oxidity_vault::infrastructure::network::simulator::NodeSimulator;
use oxidity_vault::infrastructure::network::volume::VolumeApi;
use oxidity_vault::services::engine::Engine;
use oxidity_vault::services::vault::live::{
    DryRunBroadcaster, GasConfig, LiveVault, SignerSidecar, TxBroadcaster,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Oxidity Vault — autonomous vault manager")]
struct Cli {
    /// Plan and log everything, broadcast nothing
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Cycle interval in seconds (overrides CYCLE_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load()?;
    setup_logging(&settings.log_level, settings.log_json);

    // The safety switch holds even for dry runs: an operator should
    // never discover missing configuration only when flipping to live.
    settings.ensure_live_mode()?;
    if cli.dry_run {
        tracing::warn!("dry-run mode: plans will be generated but nothing broadcast");
    } else {
        tracing::warn!("LIVE mode: real transactions will be broadcast");
    }

    let store = Database::new(&settings.database_url).await?;

    // Scoring parameters: active row, or seed and activate the defaults.
    let params = match store
        .load_active_scoring_parameters(DEFAULT_SCORING_CONFIG_NAME)
        .await
    {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "no active scoring parameters, seeding defaults");
            let defaults = ScoringParameters::default_strategy();
            store
                .save_scoring_parameters(
                    &defaults,
                    DEFAULT_SCORING_CONFIG_NAME,
                    DEFAULT_SCORING_CONFIG_VERSION,
                    true,
                )
                .await?;
            defaults
        }
    };
    tracing::info!(config = DEFAULT_SCORING_CONFIG_NAME, "scoring parameters loaded");

    let history = store.performance_metrics().await?;
    if history.total_cycles > 0 {
        tracing::info!(
            cycles = history.total_cycles,
            total_return_usd = history.total_return_usd,
            avg_efficiency = history.avg_allocation_efficiency_pct,
            "lifetime performance"
        );
    }

    let node = NodeClient::new(&settings.node_rpc)?;
    let candles = Arc::new(CandleApi::new(
        &settings.price_api_url,
        &settings.price_api_key,
    )?);
    let volume = VolumeApi::new(&settings.volume_api_url)?;
    let market = Arc::new(NodeMarketData::new(node.clone(), candles, volume));
    let simulator = Arc::new(NodeSimulator::new(node.clone()));

    let broadcaster: Arc<dyn TxBroadcaster> = if cli.dry_run {
        Arc::new(DryRunBroadcaster)
    } else {
        Arc::new(SignerSidecar::new(
            &settings.signer_url,
            &settings.chain_id,
            &settings.keyring_key_name,
        )?)
    };
    let vault = Arc::new(LiveVault::new(
        settings.avm_vault_id,
        node.clone(),
        broadcaster,
        &settings.usdc_denom,
        settings.usdc_precision,
        GasConfig {
            default_gas_limit: settings.gas_default_limit,
            gas_adjustment: settings.gas_adjustment,
            price_per_gas: settings.gas_price_amount,
            fee_denom_precision: settings.gas_fee_denom_precision,
            fee_denom_usd_price: settings.gas_fee_denom_usd_price,
        },
    )?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, finishing current step");
            shutdown.cancel();
        }
    });

    let interval = Duration::from_secs(
        cli.interval_secs.unwrap_or(settings.cycle_interval_secs),
    );
    let engine = Engine::new(
        market,
        vault,
        simulator,
        store,
        params,
        interval,
        cancel,
    )?;

    tracing::info!(vault_id = settings.avm_vault_id, "AVM starting");
    engine.run().await;
    tracing::info!("AVM stopped");
    Ok(())
}
