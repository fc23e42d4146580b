//! Candle indicators and text scoring used by the feature pipeline.
//!
//! All functions are pure and tolerate short or degenerate input; anything
//! that divides by zero yields NaN/inf and is zeroed when the vector is
//! assembled.

use crate::agent::types::{Candle, Comment};

/// Number of candles the pipeline works with.
pub const CANDLE_COUNT: usize = 3;

const NEGATIVE_MARKERS: [&str; 3] = ["scam", "rug", "rugpull"];
const POSITIVE_MARKERS: [&str; 4] = ["bump", "pump", "bumpbot", "moon"];

const POSITIVE_WORDS: [&str; 12] = [
    "good", "great", "love", "bullish", "send", "gem", "nice", "based", "lfg", "buy", "up", "win",
];
const NEGATIVE_WORDS: [&str; 12] = [
    "bad", "dump", "dead", "bearish", "sell", "trash", "fake", "down", "rekt", "jeet", "honeypot", "lose",
];

/// Linear map of `value` from `[min_in, max_in]` onto `[min_out, max_out]`.
pub fn normalize(value: f64, min_in: f64, max_in: f64, min_out: f64, max_out: f64) -> f64 {
    ((value - min_in) / (max_in - min_in)) * (max_out - min_out) + min_out
}

/// `value / cap`, saturating at 1. Non-finite input reads as 0.
pub fn capped_ratio(value: f64, cap: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.min(cap) / cap).max(0.0)
}

// Zeros right after "0." in the plain decimal rendering.
fn leading_fraction_zeros(n: f64) -> usize {
    let rendered = n.to_string();
    rendered
        .chars()
        .skip(2)
        .take_while(|c| *c == '0')
        .count()
}

/// Scale very small prices up so the classifier sees comparable magnitudes.
pub fn adjust_number(n: f64) -> f64 {
    if n >= 1.0 {
        return n;
    }
    match leading_fraction_zeros(n) {
        z if z > 5 => n * 100_000.0,
        z if z > 3 => n * 100.0,
        _ => n,
    }
}

/// Heikin-ashi transform of raw candles, left-padded with zero candles to
/// [`CANDLE_COUNT`]. Only the most recent `CANDLE_COUNT` raw candles are used.
pub fn heikin_ashi(raw: &[Candle]) -> Vec<Candle> {
    let recent = &raw[raw.len().saturating_sub(CANDLE_COUNT)..];
    let mut out: Vec<Candle> = Vec::with_capacity(CANDLE_COUNT);

    for (i, c) in recent.iter().enumerate() {
        let close = adjust_number((c.open + c.high + c.low + c.close) / 4.0);
        let open = if i == 0 {
            adjust_number(c.open)
        } else {
            let prev = out[i - 1];
            adjust_number((prev.open + prev.close) / 2.0)
        };
        let high = adjust_number(c.high.max(open).max(close));
        let low = adjust_number(c.low.min(open).min(close));
        out.push(Candle { open, high, low, close });
    }

    let mut padded = vec![Candle::default(); CANDLE_COUNT - out.len()];
    padded.extend(out);
    padded
}

fn closes(candles: &[Candle]) -> impl Iterator<Item = f64> + '_ {
    candles.iter().map(|c| c.close)
}

fn returns(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// Relative strength index scaled to `[0, 1]`; 1 when there were gains but no
/// losses, 0 for a series that never moved.
pub fn rsi(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    let (gains, losses) = candles.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1].close - w[0].close;
        if change > 0.0 { (g + change, l) } else { (g, l - change) }
    });
    if gains == 0.0 && losses == 0.0 {
        return 0.0;
    }

    let period = candles.len() as f64;
    let avg_gain = gains / period;
    let avg_loss = losses / period;
    if avg_loss == 0.0 {
        return 1.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)) / 100.0
}

/// Mean return over return deviation, clamped to `[-2, 2]` then mapped to `[0, 1]`.
pub fn mar(candles: &[Candle]) -> f64 {
    let rets = returns(candles);
    if rets.is_empty() {
        return 0.0;
    }
    let n = rets.len() as f64;
    let mean = rets.iter().sum::<f64>() / n;
    let variance = rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let deviation = variance.sqrt();
    if deviation == 0.0 {
        return 0.0;
    }
    normalize((mean / deviation).clamp(-2.0, 2.0), -2.0, 2.0, 0.0, 1.0)
}

/// Population standard deviation of closes, capped at 1.
pub fn std_dev(candles: &[Candle]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    let n = candles.len() as f64;
    let mean = closes(candles).sum::<f64>() / n;
    let variance = closes(candles).map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt().clamp(0.0, 1.0)
}

/// Standard deviation of consecutive close returns, capped at 1.
pub fn volatility(candles: &[Candle]) -> f64 {
    let rets = returns(candles);
    if rets.is_empty() {
        return 0.0;
    }
    let n = rets.len() as f64;
    let mean = rets.iter().sum::<f64>() / n;
    let variance = rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt().clamp(0.0, 1.0)
}

/// Running EMA of closes with period equal to the candle count.
pub fn ema(candles: &[Candle]) -> Vec<f64> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };
    let multiplier = 2.0 / (candles.len() as f64 + 1.0);
    let mut value = first.close;
    closes(candles)
        .map(|close| {
            value += (close - value) * multiplier;
            value
        })
        .collect()
}

pub fn sma(candles: &[Candle]) -> f64 {
    closes(candles).sum::<f64>() / candles.len() as f64
}

/// Highest high and lowest low.
pub fn high_low(candles: &[Candle]) -> (f64, f64) {
    candles.iter().fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), c| {
        (hi.max(c.high), lo.min(c.low))
    })
}

/// Retracement levels 23.6, 38.2, 50, 61.8 and 100 percent.
pub fn fibonacci_levels(high: f64, low: f64) -> [f64; 5] {
    let range = high - low;
    [
        high - range * 0.236,
        high - range * 0.382,
        high - range * 0.5,
        high - range * 0.618,
        low,
    ]
}

/// Buy signal: last close under the first retracement level, oversold, and
/// above the simple moving average.
pub fn fib_signal(candles: &[Candle], rsi: f64) -> bool {
    let Some(last) = candles.last() else {
        return false;
    };
    let (high, low) = high_low(candles);
    let levels = fibonacci_levels(high, low);
    last.close < levels[0] && rsi * 100.0 < 30.0 && last.close > sma(candles)
}

/// Fractional close returns c0->c1, c0->c2, c1->c2.
pub fn pct_changes(candles: &[Candle]) -> [f64; 3] {
    let close = |i: usize| candles.get(i).map(|c| c.close).unwrap_or(0.0);
    let change = |old: f64, new: f64| (new - old) / old;
    [
        change(close(0), close(1)),
        change(close(0), close(2)),
        change(close(1), close(2)),
    ]
}

/// Score comment sentiment in `[0, 1]`, starting neutral at 0.5.
///
/// Any comment with a negative marker short-circuits to 0 and any comment with
/// a positive marker to 1, in comment order. Otherwise each comment moves the
/// score by `0.5 / n` according to a small word lexicon.
pub fn comment_positivity(comments: &[Comment]) -> f64 {
    let mut positivity = 0.5;
    let step = 0.5 / comments.len().max(1) as f64;

    for comment in comments {
        let text = comment.text.to_lowercase();
        if NEGATIVE_MARKERS.iter().any(|w| text.contains(w)) {
            return 0.0;
        }
        if POSITIVE_MARKERS.iter().any(|w| text.contains(w)) {
            return 1.0;
        }

        let (pos, neg) = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .fold((0usize, 0usize), |(p, n), word| {
                if POSITIVE_WORDS.contains(&word) {
                    (p + 1, n)
                } else if NEGATIVE_WORDS.contains(&word) {
                    (p, n + 1)
                } else {
                    (p, n)
                }
            });
        if pos > neg {
            positivity += step;
        } else if neg > pos {
            positivity -= step;
        }
    }

    positivity.clamp(0.0, 1.0)
}

/// Case-insensitive containment of the trending word in the coin name.
pub fn is_meme_trending(name: &str, word: &str) -> bool {
    let word = word.trim();
    !word.is_empty() && name.to_lowercase().contains(&word.to_lowercase())
}
