//! # models::order
//!
//! Defines [`LimitOrder`] — a conditional trade the
//! [`crate::engine::OrderMonitor`] watches and fires at most once.
//!
//! ## Lifecycle
//! ```text
//! pending ──▶ triggered ──▶ filled
//!    │             └──────▶ failed   (ledger rejected the execution)
//!    ├──▶ cancelled                  (user action)
//!    └──▶ failed                     (infeasible at placement)
//! ```
//! `Pending` is the only mutable state.  Every other status is terminal and
//! moves the order into the monitor's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Quote, Side};
use crate::money::Cents;

// ─── OrderStatus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    /// Trigger condition met; execution in flight.
    Triggered,
    Filled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed)
    }
}

// ─── Requests ─────────────────────────────────────────────────────────────────

/// Input to [`crate::engine::OrderMonitor::place_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: Side,
    /// Limit price in dollars.
    pub limit_price: f64,
    pub quantity: u64,
}

impl LimitOrderRequest {
    pub fn buy(symbol: impl Into<String>, quantity: u64, limit_price: f64) -> Self {
        Self { symbol: symbol.into(), side: Side::Buy, limit_price, quantity }
    }

    pub fn sell(symbol: impl Into<String>, quantity: u64, limit_price: f64) -> Self {
        Self { symbol: symbol.into(), side: Side::Sell, limit_price, quantity }
    }
}

/// Partial modification of a pending order.  Every supplied field is
/// validated; one bad field rejects the whole update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<u64>,
}

// ─── LimitOrder ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub limit_price: Cents,
    pub quantity: u64,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,

    // ── ข้อมูลตอน Trigger / Fill (filled in as the order progresses) ──────────
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    /// Market price the ledger actually executed at (not the limit).
    #[serde(default)]
    pub executed_price: Option<Cents>,
    #[serde(default)]
    pub executed_total: Option<Cents>,
    /// Ledger trade created by the fill.
    #[serde(default)]
    pub trade_id: Option<Uuid>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LimitOrder {
    pub fn new(symbol: &str, side: Side, limit_price: Cents, quantity: u64, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            limit_price,
            quantity,
            created_at: at,
            status: OrderStatus::Pending,
            triggered_at: None,
            filled_at: None,
            cancelled_at: None,
            failed_at: None,
            executed_price: None,
            executed_total: None,
            trade_id: None,
            error: None,
        }
    }

    /// BUY fires at or below the limit, SELL at or above.
    #[inline]
    pub fn is_triggered_by(&self, quote: &Quote) -> bool {
        let limit = self.limit_price.to_dollars();
        match self.side {
            Side::Buy => quote.price <= limit,
            Side::Sell => quote.price >= limit,
        }
    }

    /// Reserved value at the limit price (`limit × quantity`).
    pub fn notional(&self) -> Option<Cents> {
        self.limit_price.checked_mul(self.quantity).ok()
    }
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// Aggregate view over active and historical orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total: usize,
    pub pending: usize,
    pub triggered: usize,
    pub filled: usize,
    pub cancelled: usize,
    pub failed: usize,
    /// Instruments the monitor currently holds a quote subscription for.
    pub monitored_symbols: usize,
}

impl OrderStats {
    pub fn count(&mut self, status: OrderStatus) {
        self.total += 1;
        match status {
            OrderStatus::Pending => self.pending += 1,
            OrderStatus::Triggered => self.triggered += 1,
            OrderStatus::Filled => self.filled += 1,
            OrderStatus::Cancelled => self.cancelled += 1,
            OrderStatus::Failed => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(price: f64) -> Quote {
        Quote::derive("AAPL", price, 150.0, price, price, 0.001, Utc::now())
    }

    #[test]
    fn test_trigger_rule() {
        let buy = LimitOrder::new("AAPL", Side::Buy, Cents::from_dollars(145.0).unwrap(), 1, Utc::now());
        assert!(!buy.is_triggered_by(&quote(150.0)));
        assert!(!buy.is_triggered_by(&quote(145.01)));
        assert!(buy.is_triggered_by(&quote(145.0)));
        assert!(buy.is_triggered_by(&quote(120.0)));

        let sell = LimitOrder::new("AAPL", Side::Sell, Cents::from_dollars(160.0).unwrap(), 1, Utc::now());
        assert!(!sell.is_triggered_by(&quote(159.99)));
        assert!(sell.is_triggered_by(&quote(160.0)));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Triggered.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stats_count() {
        let mut stats = OrderStats::default();
        stats.count(OrderStatus::Pending);
        stats.count(OrderStatus::Filled);
        stats.count(OrderStatus::Filled);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.filled, 2);
        assert_eq!(stats.pending, 1);
    }
}
