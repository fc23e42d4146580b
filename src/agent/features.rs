//! Feature aggregation
//!
//! Turns one discovered coin into the fixed-length vector the classifier
//! consumes. Collectors run concurrently in a first wave; indicators derived
//! from their output run in a second wave. Both waves are joined before the
//! vector is assembled, so a partial vector never escapes.

use std::sync::Arc;

use crate::agent::data_fetcher::{MAX_SOL, MAX_TX, SignalSource};
use crate::agent::indicators::{self, capped_ratio};
use crate::agent::planner::TradingSession;
use crate::agent::types::{Coin, CoinMetadata};

pub const FEATURE_LEN: usize = 45;

/// Tensor shape the classifier expects for one vector.
pub const FEATURE_SHAPE: [usize; 4] = [1, 15, 3, 1];

const UNIT: (f64, f64) = (0.0, 1.0);
const SIGNED: (f64, f64) = (-1.0, 1.0);

/// Allowed range per index; only the three close returns may go negative.
const fn feature_bounds() -> [(f64, f64); FEATURE_LEN] {
    let mut bounds = [UNIT; FEATURE_LEN];
    bounds[27] = SIGNED;
    bounds[28] = SIGNED;
    bounds[29] = SIGNED;
    bounds
}

pub const FEATURE_BOUNDS: [(f64, f64); FEATURE_LEN] = feature_bounds();

/// Index of comment positivity, the one feature whose neutral value is not 0.
pub const POSITIVITY_INDEX: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector([f64; FEATURE_LEN]);

impl FeatureVector {
    /// Zero non-finite values and clamp every element into its range.
    pub fn from_raw(mut raw: [f64; FEATURE_LEN]) -> Self {
        for (value, (lo, hi)) in raw.iter_mut().zip(FEATURE_BOUNDS) {
            *value = if value.is_finite() { value.clamp(lo, hi) } else { 0.0 };
        }
        Self(raw)
    }

    /// Vector produced when every collector fell back to its default.
    pub fn neutral() -> Self {
        let mut raw = [0.0; FEATURE_LEN];
        raw[POSITIVITY_INDEX] = 0.5;
        Self(raw)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|v| *v as f32).collect()
    }
}

/// Result of aggregating one coin.
#[derive(Debug, Clone)]
pub struct CompiledFeatures {
    pub features: FeatureVector,
    pub metadata: CoinMetadata,
    /// Latest market cap, from the market stats when they had one.
    pub market_cap_sol: f64,
}

pub struct FeaturePipeline {
    source: Arc<dyn SignalSource>,
    session: Arc<TradingSession>,
}

impl FeaturePipeline {
    pub fn new(source: Arc<dyn SignalSource>, session: Arc<TradingSession>) -> Self {
        Self { source, session }
    }

    pub async fn compile(&self, coin: &Coin) -> CompiledFeatures {
        let mint = &coin.mint;
        let source = &*self.source;

        let (metadata, candles, comments, trade_count, market, dex_paid, rug_chance, koth) = tokio::join!(
            source.metadata(mint),
            source.candles(mint),
            source.comments(mint),
            source.trade_count(mint),
            source.market_stats(mint),
            source.is_dex_paid(mint),
            source.rug_chance(mint),
            source.koth_progress(coin.market_cap_sol),
        );

        let trending_word = self.session.trending_word();
        let (rsi, mar, sd, volatility, fib, ema, changes, positivity, meme_trending) = tokio::join!(
            async { indicators::rsi(&candles) },
            async { indicators::mar(&candles) },
            async { indicators::std_dev(&candles) },
            async { indicators::volatility(&candles) },
            async { indicators::fib_signal(&candles, indicators::rsi(&candles)) },
            async { indicators::ema(&candles) },
            async { indicators::pct_changes(&candles) },
            async { indicators::comment_positivity(&comments) },
            async { indicators::is_meme_trending(&metadata.name, &trending_word) },
        );

        let market_cap_sol = market.market_cap_sol.unwrap_or(coin.market_cap_sol);
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let ema_at = |i: usize| ema.get(i).copied().unwrap_or(0.0);

        let mut raw = [0.0; FEATURE_LEN];
        let head = [
            flag(dex_paid),
            rug_chance,
            market.raydium_progress,
            koth,
            capped_ratio(comments.len() as f64, MAX_TX),
            positivity,
            flag(metadata.has_twitter),
            flag(metadata.has_website),
            flag(metadata.has_telegram),
            rsi,
            mar,
            sd,
            flag(meme_trending),
            flag(fib),
            flag(metadata.is_new),
            volatility,
            capped_ratio(trade_count as f64, MAX_TX),
            market.buy_volume,
            market.last_buy,
            market.last_sell,
            market.recent_buys,
            market.recent_sells,
            market.snipers,
            market.holders,
            market.volume,
            capped_ratio(market_cap_sol, MAX_SOL),
            market.sell_volume,
            changes[0],
            changes[1],
            changes[2],
            ema_at(0),
            ema_at(1),
            ema_at(2),
        ];
        raw[..head.len()].copy_from_slice(&head);

        // per candle: close, high, low, high
        for (i, candle) in candles.iter().take(indicators::CANDLE_COUNT).enumerate() {
            let at = head.len() + i * 4;
            raw[at..at + 4].copy_from_slice(&[candle.close, candle.high, candle.low, candle.high]);
        }

        CompiledFeatures {
            features: FeatureVector::from_raw(raw),
            metadata,
            market_cap_sol,
        }
    }
}
