//! # models::quote
//!
//! Defines [`Quote`], the market pulse the price engine emits for every
//! subscribed instrument on every tick, and [`PricePoint`], the compact trail
//! kept for charting.
//!
//! A `Quote` is derived from a single scalar price; bid/ask sit symmetrically
//! around it.  Once emitted it is never mutated — the next tick supersedes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::round_to;

/// A single simulated quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument symbol, e.g. `"AAPL"`.
    pub symbol: String,

    /// Last traded price, rounded to cents.
    pub price: f64,

    pub bid: f64,
    pub ask: f64,

    /// `ask − bid`, 4 decimals.
    pub spread: f64,

    /// High / Low ของ session นับตั้งแต่มีผู้ subscribe ครั้งแรก
    pub high: f64,
    pub low: f64,

    /// ราคาเปิด session (seed price)
    pub open: f64,

    /// `price − open`.
    pub change: f64,

    /// `change ÷ open × 100`, 4 decimals.
    pub change_percent: f64,

    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Builds the display quote for `price` given the running session stats.
    pub fn derive(
        symbol: &str,
        price: f64,
        open: f64,
        high: f64,
        low: f64,
        spread_fraction: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let spread = price * spread_fraction;
        let change = price - open;
        let change_percent = if open > 0.0 { change / open * 100.0 } else { 0.0 };

        Self {
            symbol: symbol.to_string(),
            price: round_to(price, 2),
            bid: round_to(price - spread / 2.0, 2),
            ask: round_to(price + spread / 2.0, 2),
            spread: round_to(spread, 4),
            high: round_to(high, 2),
            low: round_to(low, 2),
            open: round_to(open, 2),
            change: round_to(change, 2),
            change_percent: round_to(change_percent, 4),
            timestamp,
        }
    }

    /// Mid-point of bid/ask.
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    #[inline]
    pub fn to_point(&self) -> PricePoint {
        PricePoint { price: self.price, timestamp: self.timestamp }
    }
}

/// One entry of an instrument's rolling price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}
