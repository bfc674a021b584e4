//! # engine::ledger
//!
//! **Trade Execution Ledger** — the only component allowed to mutate the
//! [`Portfolio`].
//!
//! ## ลำดับการตรวจสอบ (every `execute_trade`)
//! ```text
//! 1. Symbol format            ┐
//! 2. Side / order kind        │ stateless — typed enums, parsed at the edge
//! 3. Quantity                 │
//! 4. Price bounds → cents     ┘
//! 5. Execution guard          → reject re-entrant / overlapping calls
//! 6. Feasibility              → cash for BUY, shares for SELL
//! 7. Rate limiter             → one success per cooldown window
//! 8. Apply on a copy, swap in → all-or-nothing
//! ```
//! Steps 6–8 run under one lock, so check-then-mutate is indivisible even if
//! the ledger handle is shared across threads.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::LedgerConfig;
use crate::engine::rate_limit::{RateDecision, RateLimitStatus, RateLimiter};
use crate::engine::validate;
use crate::error::{MoneyError, TradeError};
use crate::events::{EngineEvent, EventBus};
use crate::models::{Portfolio, PortfolioMetrics, Position, Side, Trade, TradeRequest};
use crate::money::{self, Cents};

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// ข้อมูลทั้งหมดที่ชั้น persistence ต้องใช้สร้าง ledger กลับขึ้นมา
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub portfolio: Portfolio,
    #[serde(default)]
    pub trades: Vec<Trade>,
}

// ─── Internal State ───────────────────────────────────────────────────────────

struct LedgerState {
    portfolio: Portfolio,
    /// Oldest first.
    trades: VecDeque<Trade>,
}

struct LedgerInner {
    config:    LedgerConfig,
    state:     Mutex<LedgerState>,
    executing: AtomicBool,
    limiter:   RateLimiter,
    clock:     SharedClock,
    events:    EventBus,
}

/// ปล่อย in-progress flag ทุกทางออก (รวมถึง early return ด้วย `?`)
struct ExecutionGuard<'a>(&'a AtomicBool);

impl<'a> ExecutionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// ผลของการ apply trade ลงบน portfolio สำเนา — swap เข้าเมื่อสำเร็จเท่านั้น
struct Applied {
    portfolio:   Portfolio,
    total:       Cents,
    realized_pl: Option<Cents>,
}

// ─── TradeLedger ──────────────────────────────────────────────────────────────

/// Cheap-to-clone handle; clones share the same ledger.
#[derive(Clone)]
pub struct TradeLedger {
    inner: Arc<LedgerInner>,
}

impl TradeLedger {
    pub fn new(config: LedgerConfig, clock: SharedClock, events: EventBus) -> Self {
        let state = LedgerState {
            portfolio: Portfolio::with_cash(config.initial_cash),
            trades:    VecDeque::new(),
        };
        Self {
            inner: Arc::new(LedgerInner {
                limiter: RateLimiter::new(config.rate_limit_ms),
                config,
                state: Mutex::new(state),
                executing: AtomicBool::new(false),
                clock,
                events,
            }),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    // ─── Execution ────────────────────────────────────────────────────────────

    /// Validates and atomically applies a trade.
    ///
    /// On `Err` the portfolio is untouched.  Validation, feasibility and
    /// throttling failures leave no trade record; a failure while applying
    /// (arithmetic overflow) is recorded as a failed trade.
    pub fn execute_trade(&self, request: TradeRequest) -> Result<Trade, TradeError> {
        let result = self.try_execute(&request);
        if let Err(e) = &result {
            warn!(
                symbol   = %request.symbol,
                side     = %request.side,
                quantity = request.quantity,
                price    = request.price,
                reason   = %e,
                "Trade rejected"
            );
        }
        result
    }

    fn try_execute(&self, request: &TradeRequest) -> Result<Trade, TradeError> {
        validate::symbol(&request.symbol)?;
        validate::quantity(request.quantity)?;
        let price = validate::price(request.price)?;

        let _guard = ExecutionGuard::acquire(&self.inner.executing)
            .ok_or(TradeError::ExecutionInProgress)?;

        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        check_feasibility(&state.portfolio, request, price)?;

        if let RateDecision::Blocked { retry_after_ms } = self.inner.limiter.check(now) {
            return Err(TradeError::RateLimited { retry_after_ms });
        }

        match apply_trade(&state.portfolio, request, price) {
            Ok(applied) => {
                let trade = Trade::executed(
                    &request.symbol,
                    request.side,
                    request.kind,
                    request.quantity,
                    price,
                    applied.total,
                    applied.realized_pl,
                    now,
                );
                state.portfolio = applied.portfolio;
                self.push_trade(&mut state, trade.clone());
                self.inner.limiter.record_success(now);
                let cash = state.portfolio.cash;
                drop(state);

                info!(
                    trade_id = %trade.id,
                    symbol   = %trade.symbol,
                    side     = %trade.side,
                    quantity = trade.quantity,
                    price    = %trade.price,
                    total    = %trade.total,
                    cash     = %cash,
                    "Trade executed"
                );
                self.inner.events.publish(EngineEvent::TradeExecuted { trade: Box::new(trade.clone()) });
                Ok(trade)
            }
            Err(e) => {
                let err = TradeError::Arithmetic(e);
                let trade = Trade::failed(request, price, err.to_string(), now);
                self.push_trade(&mut state, trade.clone());
                drop(state);

                error!(trade_id = %trade.id, symbol = %trade.symbol, error = %err, "Trade failed while applying");
                self.inner.events.publish(EngineEvent::TradeFailed { trade: Box::new(trade) });
                Err(err)
            }
        }
    }

    fn push_trade(&self, state: &mut LedgerState, trade: Trade) {
        state.trades.push_back(trade);
        while state.trades.len() > self.inner.config.max_trade_history {
            state.trades.pop_front();
        }
    }

    // ─── Queries (all return copies) ──────────────────────────────────────────

    pub fn portfolio(&self) -> Portfolio {
        self.inner.state.lock().portfolio.clone()
    }

    pub fn cash(&self) -> Cents {
        self.inner.state.lock().portfolio.cash
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.inner.state.lock().portfolio.position(symbol).cloned()
    }

    /// Oldest first.
    pub fn trade_history(&self) -> Vec<Trade> {
        self.inner.state.lock().trades.iter().cloned().collect()
    }

    pub fn trades_for(&self, symbol: &str) -> Vec<Trade> {
        self.inner
            .state
            .lock()
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn portfolio_metrics(&self, current_prices: &HashMap<String, f64>) -> PortfolioMetrics {
        self.inner.state.lock().portfolio.metrics(current_prices)
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.inner.limiter.status(self.inner.clock.now())
    }

    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.inner.state.lock();
        LedgerSnapshot {
            portfolio: state.portfolio.clone(),
            trades:    state.trades.iter().cloned().collect(),
        }
    }

    // ─── Loading / Reset ──────────────────────────────────────────────────────

    /// แทนที่ portfolio ทั้งก้อน ไม่ validate ซ้ำ
    /// (เชื่อว่าชั้น storage ตรวจ shape มาแล้ว)
    pub fn load_portfolio(&self, portfolio: Portfolio) {
        info!(cash = %portfolio.cash, positions = portfolio.positions.len(), "Portfolio loaded");
        self.inner.state.lock().portfolio = portfolio;
    }

    /// Replaces the trade history, keeping only the most recent entries.
    pub fn load_trade_history(&self, trades: Vec<Trade>) {
        let max = self.inner.config.max_trade_history;
        let skip = trades.len().saturating_sub(max);
        let mut state = self.inner.state.lock();
        state.trades = trades.into_iter().skip(skip).collect();
    }

    pub fn load_state(&self, snapshot: LedgerSnapshot) {
        self.load_portfolio(snapshot.portfolio);
        self.load_trade_history(snapshot.trades);
    }

    /// กลับไปเป็นเงินสดเริ่มต้น ไม่มี position และ history (ใช้ใน test)
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.portfolio = Portfolio::with_cash(self.inner.config.initial_cash);
        state.trades.clear();
        self.inner.limiter.reset();
    }
}

// ─── Pure Helpers ─────────────────────────────────────────────────────────────

fn check_feasibility(portfolio: &Portfolio, request: &TradeRequest, price: Cents) -> Result<(), TradeError> {
    match request.side {
        Side::Buy => {
            let cost = price.checked_mul(request.quantity)?;
            if portfolio.cash < cost {
                return Err(TradeError::InsufficientCash {
                    required:  cost.to_dollars(),
                    available: portfolio.cash.to_dollars(),
                });
            }
        }
        Side::Sell => {
            let held = portfolio.shares(&request.symbol);
            if held < request.quantity {
                return Err(TradeError::InsufficientShares {
                    symbol:    request.symbol.clone(),
                    requested: request.quantity,
                    held,
                });
            }
        }
    }
    Ok(())
}

fn apply_trade(portfolio: &Portfolio, request: &TradeRequest, price: Cents) -> Result<Applied, MoneyError> {
    let mut next = portfolio.clone();
    let quantity = request.quantity;
    let total = price.checked_mul(quantity)?;

    let realized_pl = match request.side {
        Side::Buy => {
            next.cash = next.cash.checked_sub(total)?;
            let position = match portfolio.position(&request.symbol) {
                Some(existing) => existing.add(quantity, price)?,
                None => Position::open(&request.symbol, quantity, price)?,
            };
            next.positions.insert(request.symbol.clone(), position);
            None
        }
        Side::Sell => {
            let existing = portfolio
                .position(&request.symbol)
                .ok_or(MoneyError::InvalidAmount(0.0))?;
            let pnl = money::realized_pnl(price, existing.avg_cost, quantity)?;
            next.cash = next.cash.checked_add(total)?;
            next.realized_pl = next.realized_pl.checked_add(pnl)?;

            match existing.reduce(quantity)? {
                Some(position) => next.positions.insert(request.symbol.clone(), position),
                None => next.positions.remove(&request.symbol),
            };
            Some(pnl)
        }
    };

    Ok(Applied { portfolio: next, total, realized_pl })
}
