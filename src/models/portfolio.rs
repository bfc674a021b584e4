//! # models::portfolio
//!
//! The cash/position ledger the [`crate::engine::TradeLedger`] owns, plus the
//! derived valuation records handed to the UI.
//!
//! ## Why cents everywhere?
//! `Portfolio` stores every amount as [`Cents`].  Only [`PortfolioMetrics`]
//! converts to dollars, because it is a display record recomputed on demand
//! and never fed back into the ledger.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::MoneyError;
use crate::money::{self, round_to, Cents, MAX_SAFE_INTEGER};

// ─── Position ─────────────────────────────────────────────────────────────────

/// A holding in one instrument.  Only exists while `shares > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: u64,
    /// Weighted-average cost per share, rounded to the cent.
    pub avg_cost: Cents,
    /// ต้นทุนรวมแบบไม่ปัดเศษ: exact `Σ price × qty` of the shares still held.
    /// `avg_cost` is always derived from this, never from the previous
    /// rounded average.
    pub cost_basis: Cents,
}

impl Position {
    pub fn open(symbol: &str, shares: u64, price: Cents) -> Result<Self, MoneyError> {
        Ok(Self {
            symbol: symbol.to_string(),
            shares,
            avg_cost: price,
            cost_basis: price.checked_mul(shares)?,
        })
    }

    /// Position after buying `shares` more at `price`.
    pub fn add(&self, shares: u64, price: Cents) -> Result<Self, MoneyError> {
        let total = self
            .shares
            .checked_add(shares)
            .filter(|s| *s <= MAX_SAFE_INTEGER as u64)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self {
            symbol: self.symbol.clone(),
            shares: total,
            avg_cost: money::weighted_average(self.cost_basis, self.shares, price, shares)?,
            cost_basis: self.cost_basis.checked_add(price.checked_mul(shares)?)?,
        })
    }

    /// Position after selling `shares`; `None` once nothing is left.
    /// The average cost of the remaining shares does not change.
    pub fn reduce(&self, shares: u64) -> Result<Option<Self>, MoneyError> {
        let remaining = self
            .shares
            .checked_sub(shares)
            .ok_or(MoneyError::InvalidAmount(shares as f64))?;
        if remaining == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            symbol: self.symbol.clone(),
            shares: remaining,
            avg_cost: self.avg_cost,
            cost_basis: money::pro_rata(self.cost_basis, remaining, self.shares)?,
        }))
    }
}

// ─── Portfolio ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Cents,
    /// Keyed by symbol; at most one position per instrument.
    pub positions: BTreeMap<String, Position>,
    /// Cumulative realized profit/loss of every sell.
    pub realized_pl: Cents,
    pub initial_cash: Cents,
}

impl Portfolio {
    pub fn with_cash(initial_cash: Cents) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
            realized_pl: Cents::ZERO,
            initial_cash,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Shares held of `symbol` (0 when there is no position).
    pub fn shares(&self, symbol: &str) -> u64 {
        self.positions.get(symbol).map(|p| p.shares).unwrap_or(0)
    }

    /// Values the portfolio against `current_prices` (dollars, keyed by symbol).
    ///
    /// A missing or non-positive current price falls back to the position's
    /// average cost, so an instrument nobody is watching contributes zero
    /// unrealized P&L instead of zero value.
    pub fn metrics(&self, current_prices: &HashMap<String, f64>) -> PortfolioMetrics {
        let mut invested: i128 = 0;
        let mut market_value: i128 = 0;
        let mut positions = Vec::with_capacity(self.positions.len());

        for position in self.positions.values() {
            let current = current_prices
                .get(&position.symbol)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0)
                .and_then(|p| Cents::from_dollars(p).ok())
                .unwrap_or(position.avg_cost);

            let cost = position.avg_cost.as_i64() as i128 * position.shares as i128;
            let value = current.as_i64() as i128 * position.shares as i128;
            invested += cost;
            market_value += value;

            let unrealized = value - cost;
            positions.push(PositionMetrics {
                symbol: position.symbol.clone(),
                shares: position.shares,
                avg_cost: position.avg_cost.to_dollars(),
                current_price: current.to_dollars(),
                market_value: cents_to_dollars(value),
                unrealized_pl: cents_to_dollars(unrealized),
                unrealized_pl_percent: percent(unrealized, cost),
            });
        }

        let cash = self.cash.as_i64() as i128;
        let realized = self.realized_pl.as_i64() as i128;
        let initial = self.initial_cash.as_i64() as i128;
        let unrealized = market_value - invested;
        let total_value = cash + market_value;
        let total_pl = realized + unrealized;

        PortfolioMetrics {
            cash: self.cash.to_dollars(),
            total_value: cents_to_dollars(total_value),
            total_invested: cents_to_dollars(invested),
            unrealized_pl: cents_to_dollars(unrealized),
            realized_pl: self.realized_pl.to_dollars(),
            total_pl: cents_to_dollars(total_pl),
            unrealized_pl_percent: percent(unrealized, invested),
            total_pl_percent: percent(total_pl, initial),
            total_return_percent: percent(total_value - initial, initial),
            position_count: positions.len(),
            positions,
        }
    }
}

fn cents_to_dollars(cents: i128) -> f64 {
    cents as f64 / 100.0
}

fn percent(part: i128, whole: i128) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, 4)
    }
}

// ─── Metrics ──────────────────────────────────────────────────────────────────

/// Per-position valuation (dollars).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub symbol: String,
    pub shares: u64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pl: f64,
    pub unrealized_pl_percent: f64,
}

/// Whole-portfolio valuation (dollars).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub cash: f64,
    /// `cash + Σ shares × current price`.
    pub total_value: f64,
    /// `Σ shares × avg cost`.
    pub total_invested: f64,
    pub unrealized_pl: f64,
    pub realized_pl: f64,
    pub total_pl: f64,
    /// Unrealized P&L relative to invested capital.
    pub unrealized_pl_percent: f64,
    /// Total P&L relative to initial cash.
    pub total_pl_percent: f64,
    /// `(total value − initial cash) ÷ initial cash`.
    pub total_return_percent: f64,
    pub position_count: usize,
    pub positions: Vec<PositionMetrics>,
}
