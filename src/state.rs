//! # state
//!
//! TradingSession — the host-owned bundle of engine, ledger and monitor.
//!
//! ```text
//!  PriceEngine ──quote──▶ OrderMonitor ──execute──▶ TradeLedger
//!       │                      │                        │
//!       └──────────────────────┴──── EventBus ◀─────────┘
//! ```
//! ทุก component ใช้ Clock และ EventBus ตัวเดียวกัน so timestamps, the rate
//! limiter and event ordering agree across the session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::clock::{system_clock, SharedClock};
use crate::config::Config;
use crate::engine::{LedgerSnapshot, OrderMonitor, PriceEngine, TradeLedger};
use crate::events::{EngineEvent, EventBus};
use crate::models::{LimitOrder, Portfolio, PortfolioMetrics, Trade};

// ─── Snapshot ─────────────────────────────────────────────────────────────────

/// ข้อมูลล้วนๆ สำหรับบันทึกลง storage (portfolio, trades, orders)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub portfolio: Portfolio,
    #[serde(default)]
    pub trades:    Vec<Trade>,
    #[serde(default)]
    pub orders:    Vec<LimitOrder>,
    pub saved_at:  DateTime<Utc>,
}

// ─── TradingSession ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TradingSession {
    pub prices: PriceEngine,
    pub ledger: TradeLedger,
    pub orders: OrderMonitor,
    pub events: EventBus,
    clock:      SharedClock,
}

impl TradingSession {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: Config, clock: SharedClock) -> Self {
        let events = EventBus::new();
        let prices = PriceEngine::new(config.sim, clock.clone(), events.clone());
        let ledger = TradeLedger::new(config.ledger, clock.clone(), events.clone());
        let orders = OrderMonitor::new(prices.clone(), ledger.clone(), clock.clone(), events.clone());
        Self { prices, ledger, orders, events, clock }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// มูลค่า portfolio ตามราคาล่าสุดจาก PriceEngine
    pub fn metrics(&self) -> PortfolioMetrics {
        self.ledger.portfolio_metrics(&self.prices.current_prices())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let LedgerSnapshot { portfolio, trades } = self.ledger.snapshot();
        SessionSnapshot {
            portfolio,
            trades,
            orders: self.orders.snapshot(),
            saved_at: self.clock.now(),
        }
    }

    /// Replaces ledger and order state from a stored snapshot.
    pub fn restore(&self, snapshot: SessionSnapshot) {
        info!(saved_at = %snapshot.saved_at, "Restoring session");
        self.ledger.load_state(LedgerSnapshot { portfolio: snapshot.portfolio, trades: snapshot.trades });
        self.orders.load_orders(snapshot.orders);
    }

    /// หยุด ticker และล้างทุก component กลับสู่สถานะเริ่มต้น
    pub fn reset(&self) {
        self.orders.reset();
        self.prices.reset();
        self.ledger.reset();
    }
}

pub type SharedSession = Arc<TradingSession>;

pub fn build_session(config: Config) -> SharedSession {
    Arc::new(TradingSession::new(config))
}
