use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::onchain_instance::bonding_curve::DecodeError;

/// A pump.fun token as seen by the agent.
///
/// Everything except `associated_bonding_curve` is fixed at discovery time;
/// that field is filled in from metadata (or derived) the first time a trade
/// needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Option<Pubkey>,
    pub market_cap_sol: f64,
}

impl Coin {
    pub fn new(mint: Pubkey, bonding_curve: Pubkey, market_cap_sol: f64) -> Self {
        Self {
            mint,
            bonding_curve,
            associated_bonding_curve: None,
            market_cap_sol,
        }
    }

    /// Ledger key for this coin.
    pub fn key(&self) -> String {
        self.mint.to_string()
    }
}

/// Raw notification from the discovery feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTokenEvent {
    #[serde(default)]
    pub mint: String,
    #[serde(rename = "bondingCurveKey", default)]
    pub bonding_curve_key: String,
    #[serde(rename = "marketCapSol", default)]
    pub market_cap_sol: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub owner: String,
    pub text: String,
}

/// Token metadata as far as the feature vector cares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoinMetadata {
    pub name: String,
    pub symbol: String,
    pub has_twitter: bool,
    pub has_website: bool,
    pub has_telegram: bool,
    pub is_new: bool,
    pub associated_bonding_curve: Option<Pubkey>,
}

/// Market statistics, already normalised into `[0, 1]` by the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketStats {
    pub holders: f64,
    pub volume: f64,
    pub last_buy: f64,
    pub last_sell: f64,
    pub recent_buys: f64,
    pub recent_sells: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub snipers: f64,
    pub raydium_progress: f64,
    /// Fresher market cap reported by the API, if any.
    pub market_cap_sol: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub mint: String,
    pub signature: String,
    pub price: f64,
    pub token_amount: f64,
    pub lamport_bound: u64,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Bonding curve error: {0}")]
    Decode(#[from] DecodeError),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not holding token {0}")]
    NotHolding(String),

    #[error("Insufficient balance: requested {requested} SOL, available {available} SOL")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("Ledger persistence failed: {0}")]
    Persistence(String),

    #[error("Sell-all incomplete: {sold} sold, {} failed", failures.len())]
    SellAllIncomplete {
        sold: usize,
        failures: Vec<(String, String)>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery feed error: {0}")]
    Feed(String),
}

impl From<solana_client::client_error::ClientError> for AgentError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        AgentError::Rpc(err.to_string())
    }
}
