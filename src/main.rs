//! # pump-trader
//!
//! Trading agent for pump.fun bonding-curve tokens on Solana.
//!
//! ## Architecture
//! - `agent`: discovery feed, dedup filter, feature pipeline, decision gate,
//!   execution engine and the trade loop tying them together
//! - `onchain_instance`: bonding-curve decoding, instruction building, RPC
//! - `services`: the persisted purchase ledger
//! - `server` / `routes` / `auth`: token-guarded control API
//! - `config`: self-initialising JSON config with environment overrides
//!
//! ## Running
//! ```bash
//! cargo run
//! ```
//!
//! The first run writes `config.json` with a fresh wallet and control token.
//! Trading starts in paper mode; set `trading.mode` to `live` to submit
//! transactions.

mod server;
mod routes;
mod auth;
mod services;
mod onchain_instance;
mod agent;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agent::classifier::{Classifier, OnnxClassifier};
use crate::agent::data_fetcher::DataFetcher;
use crate::agent::executor::{ExecutionSettings, TradeExecutor};
use crate::agent::observer::DiscoveryFeed;
use crate::agent::planner::TradingSession;
use crate::agent::trading_agent::refresh_trending_word;
use crate::agent::TradingAgent;
use crate::config::{Config, LoggingConfig};
use crate::onchain_instance::rpc::RateLimitedRpc;
use crate::server::AppState;
use crate::services::PurchaseLedger;

const DEDUP_PURGE_INTERVAL: Duration = Duration::from_secs(30);

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .compact(),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load().context("failed to load config")?;
    init_tracing(&config.logging);
    config.validate()?;

    tracing::info!("Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("Mode: {:?}, RPC: {}", config.trading.mode, config.rpc.endpoint);

    let keypair = config.trader_keypair()?;
    let rpc = Arc::new(RateLimitedRpc::new(
        config.rpc.endpoint.clone(),
        config.rpc.max_requests,
        Duration::from_secs(config.rpc.window_secs),
    )?);
    let fetcher = Arc::new(DataFetcher::new(config.collectors.clone())?);
    let ledger = PurchaseLedger::load(&config.storage.ledger_path)?;

    let executor = Arc::new(TradeExecutor::new(
        keypair,
        rpc,
        fetcher.clone(),
        ledger,
        ExecutionSettings {
            compute_unit_price: config.trading.compute_unit_price,
            compute_unit_limit: config.trading.compute_unit_limit,
        },
    ));
    tracing::info!("Trading wallet {}", executor.wallet());

    if config.storage.reconcile_ledger {
        match executor.reconcile().await {
            Ok(changed) => tracing::info!("Ledger reconciled, {} entries changed", changed),
            Err(e) => tracing::warn!("Ledger reconciliation failed: {}", e),
        }
    }

    let session = Arc::new(TradingSession::new());
    let classifier: Arc<dyn Classifier> = Arc::from(OnnxClassifier::load_or_reject(&config.storage.model_path));
    let agent = Arc::new(TradingAgent::new(
        config.trading.clone(),
        Duration::from_secs(config.discovery.dedup_window_secs),
        session.clone(),
        fetcher.clone(),
        classifier,
        executor.clone(),
    ));
    agent.start().await.context("failed to read starting balance")?;

    let (feed, events) = DiscoveryFeed::new(
        config.discovery.websocket_url.clone(),
        config.discovery.mint_suffix.clone(),
    );
    tokio::spawn(async move { feed.run().await });
    tokio::spawn(agent.clone().run(events));
    tokio::spawn(agent.clone().purge_seen(DEDUP_PURGE_INTERVAL));
    tokio::spawn(refresh_trending_word(
        fetcher,
        session,
        Duration::from_secs(config.discovery.trending_refresh_secs.max(1)),
    ));

    let state = AppState {
        executor,
        agent,
        default_slippage: config.trading.slippage,
    };
    server::serve(&config.server, state).await
}
