//! Configuration module for the bootstrap file and environment overrides
//!
//! The config lives in a JSON file (`$PUMP_TRADER_CONFIG`, default
//! `config.json`). On first run the file does not exist: a fresh wallet and
//! control token are generated, written out, and used.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::{Keypair, Signer};

pub const CONFIG_PATH_ENV: &str = "PUMP_TRADER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";
const MAINNET_RPC: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base58 secret key of the trading wallet
    pub trader_private_key: String,
    pub trader_public_key: String,

    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// Track a virtual SOL balance, never submit transactions
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradeMode,
    /// Percent of the balance committed per trade
    pub balance_risk: f64,
    /// Percent drop from entry that exits a position early
    pub trade_stop_loss: f64,
    /// Percent drop from the starting balance that halts trading
    pub total_stop_loss: f64,
    /// Fraction, e.g. 0.04 for 4%
    pub slippage: f64,
    pub hold_duration_secs: u64,
    pub price_poll_interval_ms: u64,
    /// Starting virtual balance in paper mode
    pub paper_balance_sol: f64,
    pub compute_unit_price: u64,
    pub compute_unit_limit: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradeMode::Paper,
            balance_risk: 4.0,
            trade_stop_loss: 20.0,
            total_stop_loss: 10.0,
            slippage: 0.04,
            hold_duration_secs: 3,
            price_poll_interval_ms: 500,
            paper_balance_sol: 1.0,
            compute_unit_price: 250_000,
            compute_unit_limit: 100_000,
        }
    }
}

impl TradingConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_duration_secs)
    }

    pub fn price_poll_interval(&self) -> Duration {
        Duration::from_millis(self.price_poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub endpoint: String,
    /// Requests allowed per window
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: MAINNET_RPC.to_string(),
            max_requests: 35,
            window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub websocket_url: String,
    pub dedup_window_secs: u64,
    /// Only mints ending with this suffix are considered
    pub mint_suffix: Option<String>,
    pub trending_refresh_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            websocket_url: "wss://pumpportal.fun/api/data".to_string(),
            dedup_window_secs: 60,
            mint_suffix: Some("pump".to_string()),
            trending_refresh_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub pump_frontend_v2: String,
    pub pump_frontend_v3: String,
    pub pump_advanced: String,
    pub dexscreener: String,
    pub rugcheck: String,
    pub timeout_secs: u64,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            pump_frontend_v2: "https://frontend-api-v2.pump.fun".to_string(),
            pump_frontend_v3: "https://frontend-api-v3.pump.fun".to_string(),
            pump_advanced: "https://advanced-api-v2.pump.fun".to_string(),
            dexscreener: "https://api.dexscreener.com".to_string(),
            rugcheck: "https://api.rugcheck.xyz".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: PathBuf,
    pub model_path: PathBuf,
    /// Compare ledger holdings with on-chain token accounts at startup
    pub reconcile_ledger: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("history.json"),
            model_path: PathBuf::from("indicator.onnx"),
            reconcile_ledger: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required by every `/api` route
    pub control_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            control_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from `$PUMP_TRADER_CONFIG` (or `config.json`), creating it with
    /// generated defaults when missing, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_or_create(Path::new(&path))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::generate();
            config.save(path)?;
            tracing::info!("Created default config at {} for wallet {}", path.display(), config.trader_public_key);
            return Ok(config);
        }

        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // older files may predate the control token
        if config.server.control_token.is_empty() {
            config.server.control_token = generate_token();
            config.save(path)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Fresh config with a new wallet.
    pub fn generate() -> Self {
        let wallet = Keypair::new();
        Self {
            trader_private_key: wallet.to_base58_string(),
            trader_public_key: wallet.pubkey().to_string(),
            trading: TradingConfig::default(),
            rpc: RpcConfig::default(),
            discovery: DiscoveryConfig::default(),
            collectors: CollectorsConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig {
                control_token: generate_token(),
                ..ServerConfig::default()
            },
            logging: LoggingConfig::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, data)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var("RPC_ENDPOINT") {
            self.rpc.endpoint = endpoint;
        }
        if let Ok(host) = env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;
        if !(0.0..=100.0).contains(&t.balance_risk) {
            return Err(anyhow!("trading.balance_risk must be within 0-100, got {}", t.balance_risk));
        }
        if !(0.0..1.0).contains(&t.slippage) {
            return Err(anyhow!("trading.slippage must be within [0, 1), got {}", t.slippage));
        }
        if !(0.0..=100.0).contains(&t.trade_stop_loss) || !(0.0..=100.0).contains(&t.total_stop_loss) {
            return Err(anyhow!("stop losses must be percentages within 0-100"));
        }
        if self.rpc.max_requests == 0 || self.rpc.window_secs == 0 {
            return Err(anyhow!("rpc.max_requests and rpc.window_secs must be > 0"));
        }
        self.trader_keypair()?;
        Ok(())
    }

    /// Decode the configured wallet.
    pub fn trader_keypair(&self) -> Result<Keypair> {
        let bytes = bs58::decode(&self.trader_private_key)
            .into_vec()
            .context("Failed to decode private key")?;
        let keypair = Keypair::try_from(&bytes[..])
            .map_err(|e| anyhow!("Failed to create keypair from bytes: {}", e))?;

        if !self.trader_public_key.is_empty() && keypair.pubkey().to_string() != self.trader_public_key {
            return Err(anyhow!("traderPublicKey does not match the private key"));
        }
        Ok(keypair)
    }
}

fn generate_token() -> String {
    let bytes: [u8; 24] = rand::thread_rng().r#gen();
    bs58::encode(bytes).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        env::temp_dir().join(format!("pump-trader-config-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn first_run_writes_defaults() {
        let path = temp_path();
        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert!(!created.server.control_token.is_empty());
        assert_eq!(created.trading.slippage, 0.04);
        assert_eq!(created.trading.balance_risk, 4.0);

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.trader_private_key, created.trader_private_key);
        assert_eq!(reloaded.server.control_token, created.server.control_token);
        assert_eq!(
            reloaded.trader_keypair().unwrap().pubkey(),
            created.trader_keypair().unwrap().pubkey()
        );
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn partial_file_gets_section_defaults() {
        let path = temp_path();
        let wallet = Keypair::new();
        let json = serde_json::json!({
            "trader_private_key": wallet.to_base58_string(),
            "trader_public_key": wallet.pubkey().to_string(),
            "trading": { "mode": "live", "slippage": 0.1 }
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config.trading.mode, TradeMode::Live);
        assert_eq!(config.trading.slippage, 0.1);
        assert_eq!(config.trading.hold_duration_secs, 3);
        assert_eq!(config.rpc.max_requests, 35);
        assert!(!config.server.control_token.is_empty());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let mut config = Config::generate();
        config.trader_public_key = Keypair::new().pubkey().to_string();
        assert!(config.trader_keypair().is_err());
    }

    #[test]
    fn out_of_range_slippage_is_rejected() {
        let mut config = Config::generate();
        config.trading.slippage = 1.0;
        assert!(config.validate().is_err());
    }
}
