use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::agent::indicators::{self, capped_ratio};
use crate::agent::types::{AgentError, Candle, CoinMetadata, Comment, MarketStats};
use crate::config::CollectorsConfig;

pub const MAX_SOL: f64 = 100_000.0;
pub const MINI_MAX_SOL: f64 = 1_000.0;
pub const MAX_MS: f64 = 10_000.0;
pub const MAX_TX: f64 = 10_000.0;

const MIN_RUG_SCORE: f64 = 1.0;
const MAX_RUG_SCORE: f64 = 10_000.0;
const NEW_COIN_AGE_MS: i64 = 10 * 60 * 1000;
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Per-coin market signals. Every method returns a neutral default instead of
/// an error; the pipeline never sees collector failures.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn metadata(&self, mint: &Pubkey) -> CoinMetadata;

    /// Heikin-ashi candles, always [`indicators::CANDLE_COUNT`] of them.
    async fn candles(&self, mint: &Pubkey) -> Vec<Candle>;

    async fn comments(&self, mint: &Pubkey) -> Vec<Comment>;

    async fn trade_count(&self, mint: &Pubkey) -> u64;

    async fn market_stats(&self, mint: &Pubkey) -> MarketStats;

    async fn is_dex_paid(&self, mint: &Pubkey) -> bool;

    /// Rug-risk score mapped into `[0, 1]`.
    async fn rug_chance(&self, mint: &Pubkey) -> f64;

    /// Market cap as a fraction of the current king of the hill.
    async fn koth_progress(&self, market_cap_sol: f64) -> f64;
}

/// Lookup of the associated bonding curve account for a mint.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn associated_bonding_curve(&self, mint: &Pubkey) -> Option<Pubkey>;
}

/// HTTP collectors for pump.fun and third-party market APIs
pub struct DataFetcher {
    client: Client,
    endpoints: CollectorsConfig,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    #[serde(default)]
    open: f64,
    #[serde(default)]
    high: f64,
    #[serde(default)]
    low: f64,
    #[serde(default)]
    close: f64,
}

#[derive(Debug, Deserialize)]
struct RepliesPage {
    #[serde(default)]
    replies: Vec<Value>,
}

impl DataFetcher {
    pub fn new(endpoints: CollectorsConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoints.timeout_secs))
            .build()
            .map_err(|e| AgentError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoints })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, AgentError> {
        let agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, agent)
            .send()
            .await?
            .error_for_status()?;
        Ok(response)
    }

    async fn get_json(&self, url: &str) -> Result<Value, AgentError> {
        Ok(self.get(url).await?.json::<Value>().await?)
    }

    async fn fetch_metadata(&self, mint: &Pubkey) -> Result<CoinMetadata, AgentError> {
        let url = format!("{}/coins/{}?sync=false", self.endpoints.pump_frontend_v2, mint);
        let body = self.get_json(&url).await?;
        Ok(parse_metadata(&body, Utc::now().timestamp_millis()))
    }

    async fn fetch_candles(&self, mint: &Pubkey) -> Result<Vec<Candle>, AgentError> {
        let url = format!(
            "{}/candlesticks/{}?offset=0&limit={}&timeframe=1",
            self.endpoints.pump_frontend_v3,
            mint,
            indicators::CANDLE_COUNT
        );
        let raw: Vec<RawCandle> = self.get(&url).await?.json().await?;
        let raw: Vec<Candle> = raw
            .into_iter()
            .map(|c| Candle { open: c.open, high: c.high, low: c.low, close: c.close })
            .collect();
        Ok(indicators::heikin_ashi(&raw))
    }

    async fn fetch_comments(&self, mint: &Pubkey) -> Result<Vec<Comment>, AgentError> {
        let url = format!(
            "{}/replies/{}?limit=500&offset=0&user=string&reverseOrder=false",
            self.endpoints.pump_frontend_v2, mint
        );
        let page: RepliesPage = self.get(&url).await?.json().await?;
        Ok(page.replies.iter().filter_map(parse_comment).collect())
    }

    async fn fetch_trade_count(&self, mint: &Pubkey) -> Result<u64, AgentError> {
        let url = format!("{}/trades/count/{}?minimumSize=0", self.endpoints.pump_frontend_v2, mint);
        let body = self.get(&url).await?.text().await?;
        body.trim()
            .parse::<u64>()
            .map_err(|e| AgentError::Validation(format!("trade count {:?}: {}", body, e)))
    }

    async fn fetch_market_stats(&self, mint: &Pubkey) -> Result<MarketStats, AgentError> {
        let url = format!("{}/coins/metadata-and-trades/{}", self.endpoints.pump_advanced, mint);
        let body = self.get_json(&url).await?;
        parse_market_stats(&body, &mint.to_string(), Utc::now().timestamp_millis())
            .ok_or_else(|| AgentError::Validation("market info without coin section".to_string()))
    }

    async fn fetch_dex_paid(&self, mint: &Pubkey) -> Result<bool, AgentError> {
        let url = format!("{}/orders/v1/solana/{}", self.endpoints.dexscreener, mint);
        let orders: Vec<Value> = self.get(&url).await?.json().await?;
        Ok(!orders.is_empty())
    }

    async fn fetch_rug_chance(&self, mint: &Pubkey) -> Result<f64, AgentError> {
        let url = format!("{}/v1/tokens/{}/report/summary", self.endpoints.rugcheck, mint);
        let body = self.get_json(&url).await?;
        let score = body
            .get("score")
            .and_then(number)
            .ok_or_else(|| AgentError::Validation("rug report without score".to_string()))?;
        Ok(rug_score_to_unit(score))
    }

    async fn fetch_koth_progress(&self, market_cap_sol: f64) -> Result<f64, AgentError> {
        let url = format!("{}/coins/king-of-the-hill?includeNsfw=true", self.endpoints.pump_frontend_v2);
        let body = self.get_json(&url).await?;
        let koth = body
            .get("market_cap")
            .and_then(number)
            .ok_or_else(|| AgentError::Validation("king of the hill without market cap".to_string()))?;
        Ok(koth_ratio(market_cap_sol, koth))
    }

    /// Current trending meta word, lowercase; empty when none is published.
    pub async fn trending_word(&self) -> Result<String, AgentError> {
        let url = format!("{}/metas/current", self.endpoints.pump_frontend_v3);
        let metas: Vec<Value> = self.get(&url).await?.json().await?;
        Ok(metas
            .first()
            .and_then(|m| m.get("word"))
            .and_then(Value::as_str)
            .map(|w| w.trim().to_lowercase())
            .unwrap_or_default())
    }
}

fn or_default<T: Default>(collector: &str, mint: &Pubkey, result: Result<T, AgentError>) -> T {
    result.unwrap_or_else(|e| {
        debug!("{} collector fell back to default for {}: {}", collector, mint, e);
        T::default()
    })
}

#[async_trait]
impl SignalSource for DataFetcher {
    async fn metadata(&self, mint: &Pubkey) -> CoinMetadata {
        or_default("metadata", mint, self.fetch_metadata(mint).await)
    }

    async fn candles(&self, mint: &Pubkey) -> Vec<Candle> {
        self.fetch_candles(mint).await.unwrap_or_else(|e| {
            debug!("candles collector fell back to default for {}: {}", mint, e);
            indicators::heikin_ashi(&[])
        })
    }

    async fn comments(&self, mint: &Pubkey) -> Vec<Comment> {
        or_default("comments", mint, self.fetch_comments(mint).await)
    }

    async fn trade_count(&self, mint: &Pubkey) -> u64 {
        or_default("trade count", mint, self.fetch_trade_count(mint).await)
    }

    async fn market_stats(&self, mint: &Pubkey) -> MarketStats {
        or_default("market stats", mint, self.fetch_market_stats(mint).await)
    }

    async fn is_dex_paid(&self, mint: &Pubkey) -> bool {
        or_default("dex paid", mint, self.fetch_dex_paid(mint).await)
    }

    async fn rug_chance(&self, mint: &Pubkey) -> f64 {
        or_default("rug chance", mint, self.fetch_rug_chance(mint).await)
    }

    async fn koth_progress(&self, market_cap_sol: f64) -> f64 {
        self.fetch_koth_progress(market_cap_sol).await.unwrap_or_else(|e| {
            debug!("koth collector fell back to default: {}", e);
            0.0
        })
    }
}

#[async_trait]
impl MetadataSource for DataFetcher {
    async fn associated_bonding_curve(&self, mint: &Pubkey) -> Option<Pubkey> {
        self.fetch_metadata(mint)
            .await
            .ok()
            .and_then(|m| m.associated_bonding_curve)
    }
}

// API numbers arrive either as JSON numbers or as decimal strings. "NaN" and
// "inf" strings count as missing.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn parse_metadata(body: &Value, now_ms: i64) -> CoinMetadata {
    let text = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let created = body.get("created_timestamp").and_then(number).map(|t| t as i64);

    CoinMetadata {
        name: text("name"),
        symbol: text("symbol"),
        has_twitter: present(body.get("twitter")),
        has_website: present(body.get("website")),
        has_telegram: present(body.get("telegram")),
        is_new: created.is_some_and(|t| now_ms - t < NEW_COIN_AGE_MS),
        associated_bonding_curve: body
            .get("associated_bonding_curve")
            .and_then(Value::as_str)
            .and_then(|s| Pubkey::from_str(s).ok()),
    }
}

fn parse_comment(reply: &Value) -> Option<Comment> {
    let id = match reply.get("id")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    Some(Comment {
        id,
        owner: reply.get("user")?.as_str()?.to_string(),
        text: reply.get("text")?.as_str()?.to_string(),
    })
}

/// Normalise the advanced-API market payload. `None` when the coin section is
/// missing or empty.
fn parse_market_stats(body: &Value, mint: &str, now_ms: i64) -> Option<MarketStats> {
    let coin = body.get("coin")?.as_object().filter(|c| !c.is_empty())?;
    let field = |key: &str| coin.get(key).and_then(number).unwrap_or(0.0);

    let market_cap = field("marketcap");
    let mut stats = MarketStats {
        holders: capped_ratio(field("num_holders"), MAX_TX),
        volume: capped_ratio(field("volume"), MAX_SOL),
        snipers: capped_ratio(field("sniper_count"), MAX_TX),
        raydium_progress: (field("progress") / 100.0).clamp(0.0, 1.0),
        market_cap_sol: (market_cap != 0.0).then_some(market_cap),
        ..MarketStats::default()
    };

    let Some(trades) = body
        .get("trades")
        .and_then(|t| t.get(mint))
        .and_then(Value::as_array)
    else {
        return Some(stats);
    };

    let (mut buy_lamports, mut sell_lamports) = (0.0, 0.0);
    let (mut buys, mut sells) = (0.0, 0.0);
    let (mut last_buy, mut last_sell) = (0i64, 0i64);
    for trade in trades {
        let amount = trade.get("sol_amount").and_then(number).unwrap_or(0.0);
        let timestamp = trade.get("timestamp").and_then(number).unwrap_or(0.0) as i64;
        if trade.get("is_buy").and_then(Value::as_bool).unwrap_or(false) {
            buys += 1.0;
            buy_lamports += amount;
            last_buy = last_buy.max(timestamp);
        } else {
            sells += 1.0;
            sell_lamports += amount;
            last_sell = last_sell.max(timestamp);
        }
    }

    // no trade on a side reads as maximally stale
    let staleness = |last: i64| capped_ratio((now_ms - last).max(0) as f64, MAX_MS);

    stats.buy_volume = capped_ratio(buy_lamports / LAMPORTS_PER_SOL, MINI_MAX_SOL);
    stats.sell_volume = capped_ratio(sell_lamports / LAMPORTS_PER_SOL, MINI_MAX_SOL);
    stats.recent_buys = capped_ratio(buys, MAX_TX);
    stats.recent_sells = capped_ratio(sells, MAX_TX);
    stats.last_buy = staleness(last_buy);
    stats.last_sell = staleness(last_sell);
    Some(stats)
}

fn rug_score_to_unit(score: f64) -> f64 {
    (score.clamp(MIN_RUG_SCORE, MAX_RUG_SCORE) - MIN_RUG_SCORE) / (MAX_RUG_SCORE - MIN_RUG_SCORE)
}

fn koth_ratio(market_cap_sol: f64, koth_market_cap: f64) -> f64 {
    if koth_market_cap <= 0.0 {
        return 0.0;
    }
    (market_cap_sol / koth_market_cap).clamp(0.0, 1.0)
}
