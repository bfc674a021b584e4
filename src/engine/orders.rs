//! # engine::orders
//!
//! **Limit Order Monitor** — holds conditional trades and fires each one at
//! most once when the market crosses its limit.
//!
//! ## Flow per quote
//! ```text
//! PriceEngine ──quote──▶ on_quote
//!                          │  (lock) pending & triggered_by(quote)?
//!                          │         ├─ claim execution lock (order id)
//!                          │         └─ status → Triggered
//!                          │  (unlock)
//!                          ├─▶ TradeLedger::execute_trade(MARKET @ quote.price)
//!                          │  (lock) Filled / Failed → history
//!                          └─ last pending order on symbol? → unsubscribe
//! ```
//! The monitor only subscribes to symbols with at least one pending order,
//! sharing a single subscription between all orders on the same symbol.
//!
//! Placement checks feasibility against the limit price but reserves
//! nothing; the ledger re-validates against the market price at trigger
//! time and the order fails if the portfolio no longer covers it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::engine::price::{PriceEngine, Subscription};
use crate::engine::validate;
use crate::engine::TradeLedger;
use crate::error::{MoneyError, OrderError, TradeError};
use crate::events::{EngineEvent, EventBus};
use crate::models::{
    LimitOrder, LimitOrderRequest, OrderStats, OrderStatus, OrderUpdate, Quote, Side, Trade, TradeRequest,
};

const INTERRUPTED: &str = "Execution interrupted before completion";

// ─── Internal State ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MonitorState {
    /// Pending and triggered orders, in creation order.
    active:        Vec<LimitOrder>,
    /// Order ที่จบแล้ว (filled / cancelled / failed) ล่าสุดอยู่หน้าสุด
    history:       VecDeque<LimitOrder>,
    subscriptions: HashMap<String, Subscription>,
    /// Execution lock: id ของ order ที่กำลังส่งเข้า ledger อยู่
    /// กันยิงซ้ำเมื่อ quote เข้ามาซ้อนกัน
    executing:     HashSet<Uuid>,
}

impl MonitorState {
    fn has_pending(&self, symbol: &str) -> bool {
        self.active
            .iter()
            .any(|o| o.symbol == symbol && o.status == OrderStatus::Pending)
    }

    /// Detaches the symbol's subscription once nothing pending needs it.
    /// ผู้เรียกต้อง drop handle ที่ได้คืนหลังปล่อย lock แล้ว
    fn release_if_idle(&mut self, symbol: &str) -> Option<Subscription> {
        if self.has_pending(symbol) {
            return None;
        }
        let released = self.subscriptions.remove(symbol);
        if released.is_some() {
            debug!(symbol, "Stopped monitoring symbol");
        }
        released
    }

    fn find(&self, id: Uuid) -> Option<&LimitOrder> {
        self.active
            .iter()
            .find(|o| o.id == id)
            .or_else(|| self.history.iter().find(|o| o.id == id))
    }
}

struct MonitorInner {
    state:  Mutex<MonitorState>,
    prices: PriceEngine,
    ledger: TradeLedger,
    clock:  SharedClock,
    events: EventBus,
}

/// Releases an order's execution lock on every exit path.
struct ExecutionLock<'a> {
    inner: &'a MonitorInner,
    id:    Uuid,
}

impl Drop for ExecutionLock<'_> {
    fn drop(&mut self) {
        self.inner.state.lock().executing.remove(&self.id);
    }
}

// ─── OrderMonitor ─────────────────────────────────────────────────────────────

/// Cheap-to-clone handle; clones share the same order book.
#[derive(Clone)]
pub struct OrderMonitor {
    inner: Arc<MonitorInner>,
}

impl OrderMonitor {
    pub fn new(prices: PriceEngine, ledger: TradeLedger, clock: SharedClock, events: EventBus) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState::default()),
                prices,
                ledger,
                clock,
                events,
            }),
        }
    }

    // ─── Placement ────────────────────────────────────────────────────────────

    /// Validates and registers a limit order.
    ///
    /// Returns `Ok(None)` when the order is well-formed but the portfolio
    /// cannot cover it at the limit price: the order is recorded in history
    /// as `Failed` and never monitored.
    pub fn place_order(&self, request: LimitOrderRequest) -> Result<Option<LimitOrder>, OrderError> {
        validate::symbol(&request.symbol)?;
        validate::quantity(request.quantity)?;
        let limit_price = validate::price(request.limit_price)?;

        let now = self.inner.clock.now();
        let mut order = LimitOrder::new(&request.symbol, request.side, limit_price, request.quantity, now);

        if let Err(reason) = self.check_feasibility(&order) {
            order.status = OrderStatus::Failed;
            order.failed_at = Some(now);
            order.error = Some(reason.to_string());
            self.inner.state.lock().history.push_front(order.clone());

            warn!(order_id = %order.id, symbol = %order.symbol, reason = %reason, "Limit order rejected");
            self.inner.events.publish(EngineEvent::OrderRejected { order: Box::new(order) });
            return Ok(None);
        }

        {
            let mut state = self.inner.state.lock();
            state.active.push(order.clone());
            self.watch(&mut state, &order.symbol);
        }

        info!(
            order_id    = %order.id,
            symbol      = %order.symbol,
            side        = %order.side,
            quantity    = order.quantity,
            limit_price = %order.limit_price,
            "Limit order placed"
        );
        self.inner.events.publish(EngineEvent::OrderPlaced { order: Box::new(order.clone()) });
        Ok(Some(order))
    }

    fn check_feasibility(&self, order: &LimitOrder) -> Result<(), TradeError> {
        let portfolio = self.inner.ledger.portfolio();
        match order.side {
            Side::Buy => {
                let required = order.notional().ok_or(TradeError::Arithmetic(MoneyError::Overflow))?;
                if portfolio.cash < required {
                    return Err(TradeError::InsufficientCash {
                        required:  required.to_dollars(),
                        available: portfolio.cash.to_dollars(),
                    });
                }
            }
            Side::Sell => {
                let held = portfolio.shares(&order.symbol);
                if held < order.quantity {
                    return Err(TradeError::InsufficientShares {
                        symbol:    order.symbol.clone(),
                        requested: order.quantity,
                        held,
                    });
                }
            }
        }
        Ok(())
    }

    /// Subscribe ราคา `symbol` ถ้ายังไม่มี order อื่น subscribe ไว้
    fn watch(&self, state: &mut MonitorState, symbol: &str) {
        if state.subscriptions.contains_key(symbol) {
            return;
        }
        let monitor: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let subscription = self.inner.prices.subscribe(symbol, move |quote| {
            if let Some(inner) = monitor.upgrade() {
                OrderMonitor { inner }.on_quote(quote);
            }
        });
        state.subscriptions.insert(symbol.to_string(), subscription);
        debug!(symbol, "Monitoring symbol");
    }

    // ─── Trigger & Execution ──────────────────────────────────────────────────

    /// Evaluates every pending order on the quote's symbol and executes the
    /// ones whose condition holds.  Called by the price subscription; may also
    /// be driven directly.
    pub fn on_quote(&self, quote: &Quote) {
        let now = self.inner.clock.now();
        let fired: Vec<LimitOrder> = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let mut fired = Vec::new();
            for order in state.active.iter_mut() {
                if order.symbol != quote.symbol
                    || order.status != OrderStatus::Pending
                    || !order.is_triggered_by(quote)
                {
                    continue;
                }
                if !state.executing.insert(order.id) {
                    continue;
                }
                order.status = OrderStatus::Triggered;
                order.triggered_at = Some(now);
                fired.push(order.clone());
            }
            fired
        };

        for order in fired {
            info!(
                order_id    = %order.id,
                symbol      = %order.symbol,
                price       = quote.price,
                limit_price = %order.limit_price,
                "Limit order triggered"
            );
            self.inner.events.publish(EngineEvent::OrderTriggered {
                order_id: order.id,
                symbol:   order.symbol.clone(),
                price:    quote.price,
            });

            let _lock = ExecutionLock { inner: &self.inner, id: order.id };
            let request = TradeRequest::market(order.symbol.as_str(), order.side, order.quantity, quote.price);
            let outcome = match catch_unwind(AssertUnwindSafe(|| self.inner.ledger.execute_trade(request))) {
                Ok(Ok(trade)) => Ok(trade),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => {
                    error!(order_id = %order.id, "Ledger panicked while executing limit order");
                    Err("Execution panicked".to_string())
                }
            };
            self.complete(order.id, outcome);
        }
    }

    fn complete(&self, id: Uuid, outcome: Result<Trade, String>) {
        let now = self.inner.clock.now();
        let (order, released) = {
            let mut state = self.inner.state.lock();
            let Some(index) = state.active.iter().position(|o| o.id == id) else {
                // ถูก reset ระหว่างที่ trade กำลังวิ่งอยู่
                return;
            };
            let mut order = state.active.remove(index);
            match outcome {
                Ok(trade) => {
                    order.status = OrderStatus::Filled;
                    order.filled_at = Some(now);
                    order.executed_price = Some(trade.price);
                    order.executed_total = Some(trade.total);
                    order.trade_id = Some(trade.id);
                }
                Err(reason) => {
                    order.status = OrderStatus::Failed;
                    order.failed_at = Some(now);
                    order.error = Some(reason);
                }
            }
            state.history.push_front(order.clone());
            let released = state.release_if_idle(&order.symbol);
            (order, released)
        };
        drop(released);

        if order.status == OrderStatus::Filled {
            info!(
                order_id = %order.id,
                symbol   = %order.symbol,
                price    = ?order.executed_price.map(|p| p.to_dollars()),
                "Limit order filled"
            );
            self.inner.events.publish(EngineEvent::OrderFilled { order: Box::new(order) });
        } else {
            warn!(
                order_id = %order.id,
                symbol   = %order.symbol,
                reason   = order.error.as_deref().unwrap_or_default(),
                "Limit order failed"
            );
            self.inner.events.publish(EngineEvent::OrderFailed { order: Box::new(order) });
        }
    }

    // ─── Cancel / Modify ──────────────────────────────────────────────────────

    /// ยกเลิก order ที่ยัง pending อยู่
    /// คืน `false` ถ้าไม่พบ id หรือ order ไม่ได้ pending แล้ว (ยกเลิกซ้ำก็ได้ `false`)
    pub fn cancel_order(&self, id: Uuid) -> bool {
        let now = self.inner.clock.now();
        let (order, released) = {
            let mut state = self.inner.state.lock();
            let Some(index) = state
                .active
                .iter()
                .position(|o| o.id == id && o.status == OrderStatus::Pending)
            else {
                return false;
            };
            let mut order = state.active.remove(index);
            order.status = OrderStatus::Cancelled;
            order.cancelled_at = Some(now);
            state.history.push_front(order.clone());
            let released = state.release_if_idle(&order.symbol);
            (order, released)
        };
        drop(released);

        info!(order_id = %order.id, symbol = %order.symbol, "Limit order cancelled");
        self.inner.events.publish(EngineEvent::OrderCancelled { order: Box::new(order) });
        true
    }

    /// Changes limit price and/or quantity of a pending order.  Every
    /// supplied field is validated first; on error the order is unchanged.
    pub fn modify_order(&self, id: Uuid, update: OrderUpdate) -> Result<LimitOrder, OrderError> {
        let modified = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(order) = state.active.iter_mut().find(|o| o.id == id) else {
                return Err(match state.history.iter().find(|o| o.id == id) {
                    Some(order) => OrderError::NotPending { id, status: order.status },
                    None => OrderError::NotFound(id),
                });
            };
            if order.status != OrderStatus::Pending {
                return Err(OrderError::NotPending { id, status: order.status });
            }

            let limit_price = update.limit_price.map(validate::price).transpose()?;
            if let Some(quantity) = update.quantity {
                validate::quantity(quantity)?;
            }

            if let Some(limit_price) = limit_price {
                order.limit_price = limit_price;
            }
            if let Some(quantity) = update.quantity {
                order.quantity = quantity;
            }
            order.clone()
        };

        info!(
            order_id    = %modified.id,
            limit_price = %modified.limit_price,
            quantity    = modified.quantity,
            "Limit order modified"
        );
        self.inner.events.publish(EngineEvent::OrderModified { order: Box::new(modified.clone()) });
        Ok(modified)
    }

    // ─── Queries (all return copies) ──────────────────────────────────────────

    /// Pending and triggered orders, oldest first.
    pub fn active_orders(&self) -> Vec<LimitOrder> {
        self.inner.state.lock().active.clone()
    }

    /// Active orders followed by history.
    pub fn orders_for_symbol(&self, symbol: &str) -> Vec<LimitOrder> {
        self.filtered(|o| o.symbol == symbol)
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<LimitOrder> {
        self.filtered(|o| o.status == status)
    }

    /// หาใน active ก่อน แล้วค่อยหาใน history
    pub fn order(&self, id: Uuid) -> Option<LimitOrder> {
        self.inner.state.lock().find(id).cloned()
    }

    /// Terminal orders, most recent first.
    pub fn order_history(&self, limit: Option<usize>) -> Vec<LimitOrder> {
        let state = self.inner.state.lock();
        let take = limit.unwrap_or(state.history.len());
        state.history.iter().take(take).cloned().collect()
    }

    pub fn stats(&self) -> OrderStats {
        let state = self.inner.state.lock();
        let mut stats = OrderStats::default();
        for order in state.active.iter().chain(state.history.iter()) {
            stats.count(order.status);
        }
        stats.monitored_symbols = state.subscriptions.len();
        stats
    }

    /// Symbols the monitor currently holds a subscription for, sorted.
    pub fn monitored_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.state.lock().subscriptions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Every order the monitor knows about (active, then history), for the
    /// persistence collaborator.
    pub fn snapshot(&self) -> Vec<LimitOrder> {
        self.filtered(|_| true)
    }

    fn filtered(&self, keep: impl Fn(&LimitOrder) -> bool) -> Vec<LimitOrder> {
        let state = self.inner.state.lock();
        state
            .active
            .iter()
            .chain(state.history.iter())
            .filter(|o| keep(o))
            .cloned()
            .collect()
    }

    // ─── Loading / Reset ──────────────────────────────────────────────────────

    /// Replaces all order state from a stored snapshot.  Pending orders are
    /// monitored again; orders caught mid-execution (`Triggered`) are failed
    /// rather than re-fired.
    pub fn load_orders(&self, orders: Vec<LimitOrder>) {
        let now = self.inner.clock.now();
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = std::mem::take(&mut state.subscriptions);
            state.active.clear();
            state.history.clear();
            state.executing.clear();

            for mut order in orders {
                // ค้างอยู่กลาง execution ตอน save: ไม่ยิงซ้ำ ถือว่า failed
                if order.status == OrderStatus::Triggered {
                    order.status = OrderStatus::Failed;
                    order.failed_at = Some(now);
                    order.error = Some(INTERRUPTED.to_string());
                }
                if order.status.is_terminal() {
                    state.history.push_back(order);
                } else {
                    state.active.push(order);
                }
            }

            let symbols: Vec<String> = state.active.iter().map(|o| o.symbol.clone()).collect();
            for symbol in symbols {
                self.watch(&mut state, &symbol);
            }
            info!(
                active  = state.active.len(),
                history = state.history.len(),
                symbols = state.subscriptions.len(),
                "Orders loaded"
            );
            previous
        };
        drop(previous);
    }

    /// Unsubscribes everything and forgets all orders.
    pub fn reset(&self) {
        let subscriptions = {
            let mut state = self.inner.state.lock();
            let subscriptions = std::mem::take(&mut state.subscriptions);
            *state = MonitorState::default();
            subscriptions
        };
        drop(subscriptions);
        info!("Order monitor reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::{LedgerConfig, SimConfig};
    use crate::error::ValidationError;
    use crate::models::OrderKind;
    use crate::money::Cents;
    use rstest::rstest;

    struct Harness {
        monitor: OrderMonitor,
        prices:  PriceEngine,
        ledger:  TradeLedger,
        clock:   Arc<ManualClock>,
        events:  EventBus,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let events = EventBus::new();
        let config = SimConfig { seed: Some(7), ..SimConfig::default() };
        let prices = PriceEngine::new(config, clock.clone(), events.clone());
        let ledger = TradeLedger::new(LedgerConfig::default(), clock.clone(), events.clone());
        let monitor = OrderMonitor::new(prices.clone(), ledger.clone(), clock.clone(), events.clone());
        Harness { monitor, prices, ledger, clock, events }
    }

    fn dollars(d: f64) -> Cents {
        Cents::from_dollars(d).unwrap()
    }

    #[test]
    fn test_buy_fills_at_market_not_limit() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 10, 140.0)).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(h.prices.subscriber_count("AAPL"), 1);
        assert_eq!(h.prices.current_price("AAPL"), Some(150.0));

        h.prices.push_price("AAPL", 145.0).unwrap();
        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Pending);

        h.prices.push_price("AAPL", 138.0).unwrap();
        let filled = h.monitor.order(order.id).unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.executed_price, Some(dollars(138.0)));
        assert_eq!(filled.executed_total, Some(dollars(1_380.0)));
        assert!(filled.triggered_at.is_some() && filled.filled_at.is_some());

        let trades = h.ledger.trade_history();
        assert_eq!(trades.len(), 1);
        assert_eq!(Some(trades[0].id), filled.trade_id);
        assert_eq!(trades[0].price, dollars(138.0));
        assert_eq!(trades[0].kind, OrderKind::Market);
        assert_eq!(h.ledger.cash(), dollars(98_620.0));

        // filled orders release the subscription and never fire again
        assert_eq!(h.prices.subscriber_count("AAPL"), 0);
        assert!(h.monitor.active_orders().is_empty());
        h.prices.push_price("AAPL", 130.0).unwrap();
        assert_eq!(h.ledger.trade_history().len(), 1);
    }

    #[test]
    fn test_sell_triggers_at_or_above_limit() {
        let h = harness();
        h.ledger.execute_trade(TradeRequest::buy("AAPL", 10, 150.0)).unwrap();
        h.clock.advance_ms(1_000);

        let order = h.monitor.place_order(LimitOrderRequest::sell("AAPL", 10, 160.0)).unwrap().unwrap();
        h.prices.push_price("AAPL", 159.99).unwrap();
        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Pending);

        h.prices.push_price("AAPL", 160.0).unwrap();
        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Filled);
        assert!(h.ledger.position("AAPL").is_none());
        assert_eq!(h.ledger.portfolio().realized_pl, dollars(100.0));
    }

    #[test]
    fn test_buy_triggers_exactly_at_limit() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 145.0)).unwrap().unwrap();
        h.prices.push_price("AAPL", 145.01).unwrap();
        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Pending);
        h.prices.push_price("AAPL", 145.0).unwrap();
        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Filled);
    }

    #[rstest]
    #[case::lowercase_symbol(LimitOrderRequest::buy("aapl", 1, 100.0), ValidationError::InvalidSymbol("aapl".into()))]
    #[case::zero_quantity(LimitOrderRequest::buy("AAPL", 0, 100.0), ValidationError::InvalidQuantity(0))]
    #[case::price_too_low(LimitOrderRequest::buy("AAPL", 1, 0.001), ValidationError::InvalidPrice(0.001))]
    #[case::price_too_high(LimitOrderRequest::sell("AAPL", 1, 2_000_000.0), ValidationError::InvalidPrice(2_000_000.0))]
    fn test_placement_validation(#[case] request: LimitOrderRequest, #[case] expected: ValidationError) {
        let h = harness();
        assert_eq!(h.monitor.place_order(request), Err(OrderError::Validation(expected)));
        assert!(h.monitor.snapshot().is_empty());
        assert!(h.prices.subscribed_symbols().is_empty());
    }

    #[test]
    fn test_infeasible_orders_go_straight_to_history() {
        let h = harness();
        assert_eq!(h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1_000, 150.0)), Ok(None));
        assert_eq!(h.monitor.place_order(LimitOrderRequest::sell("MSFT", 5, 400.0)), Ok(None));

        let history = h.monitor.order_history(None);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|o| o.status == OrderStatus::Failed && o.failed_at.is_some()));
        assert!(history[1].error.as_deref().unwrap().starts_with("Insufficient cash"));
        assert!(history[0].error.as_deref().unwrap().starts_with("Insufficient shares"));
        assert!(h.monitor.active_orders().is_empty());
        assert!(h.prices.subscribed_symbols().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 100.0)).unwrap().unwrap();

        assert!(h.monitor.cancel_order(order.id));
        assert!(!h.monitor.cancel_order(order.id));
        assert!(!h.monitor.cancel_order(Uuid::new_v4()));

        let history = h.monitor.order_history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OrderStatus::Cancelled);
        assert!(history[0].cancelled_at.is_some());
        assert_eq!(h.prices.subscriber_count("AAPL"), 0);
    }

    #[test]
    fn test_orders_share_one_subscription_per_symbol() {
        let h = harness();
        let a = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 100.0)).unwrap().unwrap();
        let b = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 2, 110.0)).unwrap().unwrap();
        let _c = h.monitor.place_order(LimitOrderRequest::buy("MSFT", 1, 300.0)).unwrap().unwrap();
        assert_eq!(h.prices.subscriber_count("AAPL"), 1);
        assert_eq!(h.monitor.monitored_symbols(), vec!["AAPL".to_string(), "MSFT".to_string()]);

        h.monitor.cancel_order(a.id);
        assert_eq!(h.prices.subscriber_count("AAPL"), 1);
        h.monitor.cancel_order(b.id);
        assert_eq!(h.prices.subscriber_count("AAPL"), 0);
        assert_eq!(h.monitor.stats().monitored_symbols, 1);
    }

    #[test]
    fn test_modify_is_all_or_nothing() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 5, 140.0)).unwrap().unwrap();

        let bad = OrderUpdate { limit_price: Some(135.0), quantity: Some(0) };
        assert_eq!(
            h.monitor.modify_order(order.id, bad),
            Err(OrderError::Validation(ValidationError::InvalidQuantity(0)))
        );
        let unchanged = h.monitor.order(order.id).unwrap();
        assert_eq!(unchanged.limit_price, dollars(140.0));
        assert_eq!(unchanged.quantity, 5);

        let good = OrderUpdate { limit_price: Some(135.5), quantity: Some(8) };
        let modified = h.monitor.modify_order(order.id, good).unwrap();
        assert_eq!(modified.limit_price, dollars(135.5));
        assert_eq!(modified.quantity, 8);
    }

    #[test]
    fn test_modify_rejects_terminal_orders() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 100.0)).unwrap().unwrap();
        h.monitor.cancel_order(order.id);

        assert_eq!(
            h.monitor.modify_order(order.id, OrderUpdate { quantity: Some(2), ..OrderUpdate::default() }),
            Err(OrderError::NotPending { id: order.id, status: OrderStatus::Cancelled })
        );
        let missing = Uuid::new_v4();
        assert_eq!(h.monitor.modify_order(missing, OrderUpdate::default()), Err(OrderError::NotFound(missing)));
    }

    #[test]
    fn test_same_quote_triggers_execute_in_order() {
        let h = harness();
        let first = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 140.0)).unwrap().unwrap();
        let second = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 141.0)).unwrap().unwrap();

        h.prices.push_price("AAPL", 139.0).unwrap();

        assert_eq!(h.monitor.order(first.id).unwrap().status, OrderStatus::Filled);
        let throttled = h.monitor.order(second.id).unwrap();
        assert_eq!(throttled.status, OrderStatus::Failed);
        assert!(throttled.error.as_deref().unwrap().starts_with("Rate limited"));
        assert_eq!(h.ledger.trade_history().len(), 1);
        assert_eq!(h.prices.subscriber_count("AAPL"), 0);
    }

    #[test]
    fn test_ledger_rejection_after_trigger_fails_order() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 600, 150.0)).unwrap().unwrap();

        // spend cash elsewhere between placement and trigger
        h.ledger.execute_trade(TradeRequest::buy("MSFT", 40, 380.0)).unwrap();
        h.clock.advance_ms(1_000);

        h.prices.push_price("AAPL", 149.0).unwrap();
        let failed = h.monitor.order(order.id).unwrap();
        assert_eq!(failed.status, OrderStatus::Failed);
        assert!(failed.error.as_deref().unwrap().starts_with("Insufficient cash"));
        assert!(h.ledger.position("AAPL").is_none());
        assert_eq!(h.monitor.stats().failed, 1);
    }

    #[test]
    fn test_queries_and_stats() {
        let h = harness();
        let a = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 140.0)).unwrap().unwrap();
        let b = h.monitor.place_order(LimitOrderRequest::buy("MSFT", 1, 300.0)).unwrap().unwrap();
        h.monitor.place_order(LimitOrderRequest::buy("GOOGL", 1, 100.0)).unwrap().unwrap();
        h.monitor.cancel_order(b.id);
        h.prices.push_price("AAPL", 139.0).unwrap();

        let stats = h.monitor.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.filled, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.monitored_symbols, 1);

        assert_eq!(h.monitor.orders_for_symbol("AAPL")[0].id, a.id);
        assert_eq!(h.monitor.orders_by_status(OrderStatus::Cancelled)[0].id, b.id);
        // most recent first
        let recent = h.monitor.order_history(Some(1));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, a.id);
        assert_eq!(h.monitor.snapshot().len(), 3);
    }

    #[test]
    fn test_load_orders_restores_monitoring() {
        let h = harness();
        let now = h.clock.now();
        let pending = LimitOrder::new("MSFT", Side::Buy, dollars(300.0), 1, now);
        let mut triggered = LimitOrder::new("AAPL", Side::Buy, dollars(140.0), 1, now);
        triggered.status = OrderStatus::Triggered;
        let mut filled = LimitOrder::new("GOOGL", Side::Buy, dollars(130.0), 1, now);
        filled.status = OrderStatus::Filled;

        h.monitor.load_orders(vec![pending.clone(), triggered.clone(), filled]);

        assert_eq!(h.monitor.active_orders(), vec![pending.clone()]);
        assert_eq!(h.monitor.order_history(None).len(), 2);
        let interrupted = h.monitor.order(triggered.id).unwrap();
        assert_eq!(interrupted.status, OrderStatus::Failed);
        assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED));
        assert_eq!(h.prices.subscriber_count("MSFT"), 1);
        assert_eq!(h.prices.subscriber_count("AAPL"), 0);

        h.prices.push_price("MSFT", 299.0).unwrap();
        assert_eq!(h.monitor.order(pending.id).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_reset_unsubscribes_everything() {
        let h = harness();
        h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 100.0)).unwrap();
        h.monitor.place_order(LimitOrderRequest::buy("MSFT", 1, 100.0)).unwrap();
        h.monitor.reset();

        assert!(h.monitor.snapshot().is_empty());
        assert_eq!(h.monitor.stats(), OrderStats::default());
        assert!(h.prices.subscribed_symbols().is_empty());
    }

    #[test]
    fn test_transitions_are_published() {
        let h = harness();
        let mut rx = h.events.subscribe();
        h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 140.0)).unwrap();
        h.prices.push_price("AAPL", 139.0).unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.to_json());
        }
        assert!(names[0].contains("ORDER_PLACED"));
        assert!(names[1].contains("ORDER_TRIGGERED"));
        assert!(names[2].contains("TRADE_EXECUTED"));
        assert!(names[3].contains("ORDER_FILLED"));
    }

    #[test]
    fn test_reentrant_quote_executes_once() {
        let h = harness();
        // registered before the order, so it sees each quote first and
        // pushes a second crossing quote while the first is being delivered
        let feed = h.prices.clone();
        let pushed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = pushed.clone();
        let _observer = h.prices.subscribe("AAPL", move |q| {
            if q.price <= 140.0 && !flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
                feed.push_price("AAPL", q.price - 1.0).unwrap();
            }
        });

        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 10, 140.0)).unwrap().unwrap();
        h.clock.advance_ms(1_000);
        h.prices.push_price("AAPL", 139.0).unwrap();

        assert!(pushed.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(h.ledger.trade_history().len(), 1);
        let filled = h.monitor.order(order.id).unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(h.monitor.stats().filled, 1);
        assert_eq!(h.monitor.stats().total, 1);
    }

    #[test]
    fn test_repeated_delivery_of_same_quote() {
        let h = harness();
        let order = h.monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 140.0)).unwrap().unwrap();
        let quote = h.prices.push_price("AAPL", 150.0).unwrap();
        let crossing = Quote::derive("AAPL", 139.0, quote.open, quote.high, 139.0, 0.001, h.clock.now());

        h.monitor.on_quote(&crossing);
        h.monitor.on_quote(&crossing);
        h.monitor.on_quote(&crossing);

        assert_eq!(h.monitor.order(order.id).unwrap().status, OrderStatus::Filled);
        assert_eq!(h.ledger.trade_history().len(), 1);
        assert_eq!(h.monitor.order_history(None).len(), 1);
    }

    #[test]
    fn test_concurrent_placement_and_quotes() {
        let h = harness();
        let placer = {
            let monitor = h.monitor.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    let placed = monitor.place_order(LimitOrderRequest::buy("AAPL", 1, 140.0)).unwrap();
                    if let Some(order) = placed {
                        if i % 2 == 0 {
                            monitor.cancel_order(order.id);
                        }
                    }
                }
            })
        };
        let feeder = {
            let prices = h.prices.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    let price = if i % 3 == 0 { 139.0 } else { 150.0 };
                    prices.push_price("AAPL", price).unwrap();
                }
            })
        };
        placer.join().unwrap();
        feeder.join().unwrap();

        let stats = h.monitor.stats();
        assert_eq!(stats.total, 2_000);
        assert_eq!(stats.triggered, 0);
        assert_eq!(stats.pending + stats.filled + stats.cancelled + stats.failed, 2_000);
        assert_eq!(h.ledger.trade_history().len(), stats.filled);
        assert!(!h.ledger.is_executing());

        let subscribed = h.prices.subscriber_count("AAPL");
        assert_eq!(subscribed, usize::from(stats.pending > 0));
    }
}
