//! Trade and candle structures: the records flowing through the library.
//!
//! # Timestamp convention
//!
//! All timestamps are **seconds since Unix epoch**. Exchange feeds frequently
//! deliver milliseconds; callers run [`normalize_timestamp`] before handing a
//! trade to the store.

use serde::{Deserialize, Serialize};

use super::enums::Direction;

/// Timestamps above this value are interpreted as milliseconds.
pub const MAX_SECONDS_TIMESTAMP: u64 = 9_999_999_999;

/// Convert a possibly-millisecond timestamp into seconds.
#[inline]
pub fn normalize_timestamp(ts: u64) -> u64 {
    if ts > MAX_SECONDS_TIMESTAMP { ts / 1000 } else { ts }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// A single trade execution.
///
/// Every field carries `#[serde(default)]` so records written before a field
/// existed still decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange / venue identifier.
    #[serde(default)]
    pub market: String,
    /// Traded pair or symbol.
    #[serde(default)]
    pub instrument: String,
    /// Venue-assigned identifier. Not checked for uniqueness by the store.
    #[serde(default)]
    pub trade_id: String,
    #[serde(default)]
    pub direction: Direction,
    /// Execution price.
    #[serde(default)]
    pub amount: f64,
    /// Execution quantity.
    #[serde(default)]
    pub units: f64,
    /// Seconds since epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl Trade {
    /// True if this trade belongs to the given market and instrument.
    #[inline]
    pub fn matches(&self, market: &str, instrument: &str) -> bool {
        self.market == market && self.instrument == instrument
    }

    /// Copy with the internal identifiers blanked, as returned to external
    /// query clients.
    pub fn redacted(&self) -> Self {
        Self {
            market: String::new(),
            instrument: String::new(),
            trade_id: String::new(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade({}:{} {} {:.8}x{:.4} id={} ts={})",
            self.market, self.instrument, self.direction, self.amount, self.units, self.trade_id, self.timestamp
        )
    }
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// OHLCV summary of the trades inside one interval bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, seconds since epoch.
    pub timestamp: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Start a candle from the first trade of a bucket.
    pub fn open_with(bucket: u64, trade: &Trade) -> Self {
        Self {
            timestamp: bucket,
            open: trade.amount,
            high: trade.amount,
            low: trade.amount,
            close: trade.amount,
            volume: trade.units,
        }
    }

    /// Fold another trade from the same bucket into the candle.
    pub fn update(&mut self, trade: &Trade) {
        self.high = self.high.max(trade.amount);
        self.low = self.low.min(trade.amount);
        self.close = trade.amount;
        self.volume += trade.units;
    }
}
