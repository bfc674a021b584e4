//! # models::trade
//!
//! Defines the request the ledger accepts ([`TradeRequest`]) and the
//! immutable record it appends for every execution ([`Trade`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Cents;

// ─── Side ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ValidationError::InvalidSide(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ─── OrderKind ────────────────────────────────────────────────────────────────

/// How the trade was originated.  Limit orders reach the ledger as `Market`
/// executions at the triggering quote; `Limit` is accepted for callers that
/// want to tag the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    #[default]
    Market,
    Limit,
}

impl FromStr for OrderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderKind::Market),
            "LIMIT" => Ok(OrderKind::Limit),
            other => Err(ValidationError::InvalidOrderKind(other.to_string())),
        }
    }
}

// ─── TradeStatus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Executed,
    /// Passed validation but could not be applied; the portfolio is untouched.
    Failed,
}

// ─── TradeRequest ─────────────────────────────────────────────────────────────

/// Input to [`crate::engine::TradeLedger::execute_trade`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    /// Execution price in dollars.
    pub price: f64,
    #[serde(default)]
    pub kind: OrderKind,
}

impl TradeRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: u64, price: f64) -> Self {
        Self { symbol: symbol.into(), side, quantity, price, kind: OrderKind::Market }
    }

    pub fn buy(symbol: impl Into<String>, quantity: u64, price: f64) -> Self {
        Self::market(symbol, Side::Buy, quantity, price)
    }

    pub fn sell(symbol: impl Into<String>, quantity: u64, price: f64) -> Self {
        Self::market(symbol, Side::Sell, quantity, price)
    }
}

// ─── Trade ────────────────────────────────────────────────────────────────────

/// One completed (or failed) execution — never modified after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: u64,
    /// Price per share.
    pub price: Cents,
    /// `price × quantity`.
    pub total: Cents,
    /// กำไร/ขาดทุนที่ realize จากการขาย; `None` สำหรับ BUY และ trade ที่ failed
    #[serde(default)]
    pub realized_pl: Option<Cents>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: TradeStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn executed(
        symbol: &str,
        side: Side,
        kind: OrderKind,
        quantity: u64,
        price: Cents,
        total: Cents,
        realized_pl: Option<Cents>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            kind,
            quantity,
            price,
            total,
            realized_pl,
            created_at: at,
            executed_at: Some(at),
            status: TradeStatus::Executed,
            error: None,
        }
    }

    pub fn failed(request: &TradeRequest, price: Cents, reason: String, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price,
            total: Cents::ZERO,
            realized_pl: None,
            created_at: at,
            executed_at: None,
            status: TradeStatus::Failed,
            error: Some(reason),
        }
    }

    #[inline]
    pub fn is_executed(&self) -> bool {
        self.status == TradeStatus::Executed
    }
}
