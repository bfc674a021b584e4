//! # error
//!
//! Centralised error types for the simulation core.
//!
//! Every expected failure (bad input, insufficient funds, throttling) is a
//! value in one of these enums and travels back to the immediate caller as
//! `Err(..)`.  Nothing here is used for control-flow panics.  The `Display`
//! text of each variant is the human-readable reason shown to the user and
//! stored on failed orders / trades.

use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;

// ─── MoneyError ───────────────────────────────────────────────────────────────

/// Failures of the integer-cents primitives in [`crate::money`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    /// NaN, infinity, or an amount that makes no sense for the operation.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Result magnitude exceeds the safe-integer bound.
    #[error("Arithmetic overflow")]
    Overflow,
}

// ─── ValidationError ──────────────────────────────────────────────────────────

/// Request-shape problems shared by market trades and limit orders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid symbol '{0}': expected 1-10 uppercase letters, digits or dots")]
    InvalidSymbol(String),

    #[error("Invalid side '{0}': expected BUY or SELL")]
    InvalidSide(String),

    #[error("Invalid order type '{0}': expected MARKET or LIMIT")]
    InvalidOrderKind(String),

    #[error("Invalid quantity {0}: must be a positive whole number of shares")]
    InvalidQuantity(u64),

    #[error("Invalid price {0}: must be between $0.01 and $1,000,000")]
    InvalidPrice(f64),
}

// ─── TradeError ───────────────────────────────────────────────────────────────

/// Why the ledger refused (or failed) a trade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Insufficient cash: need ${required:.2}, have ${available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error("Insufficient shares of {symbol}: requested {requested}, holding {held}")]
    InsufficientShares { symbol: String, requested: u64, held: u64 },

    #[error("Rate limited: retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Another trade is already executing")]
    ExecutionInProgress,

    #[error("Trade arithmetic failed: {0}")]
    Arithmetic(#[from] MoneyError),
}

impl TradeError {
    /// Throttling / reentrancy rejections that succeed on a later retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, TradeError::RateLimited { .. } | TradeError::ExecutionInProgress)
    }
}

// ─── OrderError ───────────────────────────────────────────────────────────────

/// Limit-order monitor failures that are reported to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Order {id} is {status:?} and can no longer be changed")]
    NotPending { id: Uuid, status: OrderStatus },
}

// ─── EngineError ──────────────────────────────────────────────────────────────

/// Price engine lifecycle / injection failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// `start()` was called outside a Tokio runtime.
    #[error("Price ticker needs a running Tokio runtime")]
    NoRuntime,

    #[error("Invalid price {price} for {symbol}")]
    InvalidPrice { symbol: String, price: f64 },
}
