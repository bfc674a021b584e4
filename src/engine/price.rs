//! # engine::price
//!
//! **Price Simulation Engine** — produces a continuously updating synthetic
//! quote for every instrument somebody is watching.
//!
//! ## Per tick
//! ```text
//! for each symbol with ≥ 1 subscriber:
//!     price ← GBM step
//!     update session high / low
//!     derive Quote (bid / ask / spread / change)
//!     append PricePoint (rolling window, oldest evicted)
//! release lock → notify subscribers (each callback isolated)
//! ```
//! Instruments nobody subscribes to are never computed, so cost follows
//! interest rather than catalog size.
//!
//! Callbacks run *after* the engine lock is released: a subscriber may call
//! back into the engine (subscribe, unsubscribe, read history) without
//! deadlocking.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::{clamp_interval, SimConfig};
use crate::engine::catalog;
use crate::engine::gbm::GbmParams;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};
use crate::models::{PricePoint, Quote};

/// Observer invoked with every new quote of the subscribed symbol.
pub type QuoteCallback = Arc<dyn Fn(&Quote) + Send + Sync>;

// ─── Instrument State ─────────────────────────────────────────────────────────

struct InstrumentState {
    /// ราคา simulation แบบไม่ปัดเศษ; Quote ถือค่าที่ปัดแล้ว
    price:   f64,
    open:    f64,
    high:    f64,
    low:     f64,
    last:    Quote,
    history: VecDeque<PricePoint>,
}

impl InstrumentState {
    fn new(symbol: &str, price: f64, spread_fraction: f64, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            price,
            open:    price,
            high:    price,
            low:     price,
            last:    Quote::derive(symbol, price, price, price, price, spread_fraction, now),
            history: VecDeque::new(),
        }
    }

    fn apply(&mut self, price: f64, config: &SimConfig, now: chrono::DateTime<chrono::Utc>) -> Quote {
        self.price = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);

        let quote = Quote::derive(
            &self.last.symbol,
            price,
            self.open,
            self.high,
            self.low,
            config.spread_fraction,
            now,
        );

        self.history.push_back(quote.to_point());
        while self.history.len() > config.history_limit {
            self.history.pop_front();
        }
        self.last = quote.clone();
        quote
    }
}

// ─── Engine State ─────────────────────────────────────────────────────────────

struct EngineState {
    instruments:      HashMap<String, InstrumentState>,
    /// symbol → (subscription id → callback)
    /// symbol ที่มี entry อยู่ = active (ถูกคำนวณทุก tick)
    subscribers:      HashMap<String, BTreeMap<u64, QuoteCallback>>,
    next_id:          u64,
    rng:              StdRng,
    tick_interval_ms: u64,
    tick_count:       u64,
    ticker:           Option<JoinHandle<()>>,
}

impl EngineState {
    fn ensure_instrument(&mut self, symbol: &str, config: &SimConfig, now: chrono::DateTime<chrono::Utc>) {
        if !self.instruments.contains_key(symbol) {
            let seed = catalog::initial_price(symbol, &mut self.rng);
            debug!(symbol, seed, "Instrument initialised");
            self.instruments
                .insert(symbol.to_string(), InstrumentState::new(symbol, seed, config.spread_fraction, now));
        }
    }

    fn callbacks_for(&self, symbol: &str) -> Vec<QuoteCallback> {
        self.subscribers
            .get(symbol)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }
}

struct EngineInner {
    config: SimConfig,
    params: GbmParams,
    state:  Mutex<EngineState>,
    clock:  SharedClock,
    events: EventBus,
}

// ─── Subscription ─────────────────────────────────────────────────────────────

/// Handle returned by [`PriceEngine::subscribe`].  Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    engine: Weak<EngineInner>,
    symbol: String,
    id:     u64,
}

impl Subscription {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let removed = {
            let mut state = engine.state.lock();
            let Some(subs) = state.subscribers.get_mut(&self.symbol) else {
                return;
            };
            let removed = subs.remove(&self.id);
            if subs.is_empty() {
                // เก็บ history ไว้ แค่หยุดคำนวณ symbol นี้
                state.subscribers.remove(&self.symbol);
                debug!(symbol = %self.symbol, "Last subscriber left");
            }
            removed
        };
        // callback อาจถือ Subscription อื่นอยู่ → drop หลังปล่อย lock
        drop(removed);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("symbol", &self.symbol).field("id", &self.id).finish()
    }
}

// ─── PriceEngine ──────────────────────────────────────────────────────────────

/// Cheap-to-clone handle; clones share the same engine.
#[derive(Clone)]
pub struct PriceEngine {
    inner: Arc<EngineInner>,
}

impl PriceEngine {
    pub fn new(config: SimConfig, clock: SharedClock, events: EventBus) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = EngineState {
            instruments:      HashMap::new(),
            subscribers:      HashMap::new(),
            next_id:          0,
            rng,
            tick_interval_ms: clamp_interval(config.tick_interval_ms),
            tick_count:       0,
            ticker:           None,
        };
        Self {
            inner: Arc::new(EngineInner {
                params: GbmParams::from_config(&config),
                config,
                state: Mutex::new(state),
                clock,
                events,
            }),
        }
    }

    // ─── Subscriptions ────────────────────────────────────────────────────────

    /// Registers `callback` for every future quote of `symbol`.  The first
    /// subscriber for a symbol seeds its price (catalog or random fallback).
    pub fn subscribe<F>(&self, symbol: &str, callback: F) -> Subscription
    where
        F: Fn(&Quote) + Send + Sync + 'static,
    {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.ensure_instrument(symbol, &self.inner.config, now);

        let id = state.next_id;
        state.next_id += 1;
        state
            .subscribers
            .entry(symbol.to_string())
            .or_default()
            .insert(id, Arc::new(callback));

        Subscription { engine: Arc::downgrade(&self.inner), symbol: symbol.to_string(), id }
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.inner.state.lock().subscribers.get(symbol).map(|s| s.len()).unwrap_or(0)
    }

    /// Symbol ที่กำลังถูก tick อยู่ (เรียงตามตัวอักษร)
    pub fn subscribed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.inner.state.lock().subscribers.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    // ─── Ticking ──────────────────────────────────────────────────────────────

    /// Advances every subscribed instrument by one GBM step and notifies
    /// subscribers.  The background ticker calls this; tests and replays may
    /// call it directly.
    pub fn tick(&self) {
        let now = self.inner.clock.now();
        let deliveries = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.tick_count += 1;

            let symbols: Vec<String> = state.subscribers.keys().cloned().collect();
            let mut deliveries = Vec::with_capacity(symbols.len());
            for symbol in symbols {
                state.ensure_instrument(&symbol, &self.inner.config, now);
                let Some(instrument) = state.instruments.get_mut(&symbol) else {
                    continue;
                };
                let next = self.inner.params.step(instrument.price, &mut state.rng);
                let quote = instrument.apply(next, &self.inner.config, now);
                deliveries.push((quote, state.callbacks_for(&symbol)));
            }
            deliveries
        };

        for (quote, callbacks) in &deliveries {
            notify(quote, callbacks);
        }
    }

    /// Sets `symbol` to an explicit price and notifies its subscribers as if
    /// a tick had produced it.
    pub fn push_price(&self, symbol: &str, price: f64) -> Result<Quote, EngineError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::InvalidPrice { symbol: symbol.to_string(), price });
        }

        let now = self.inner.clock.now();
        let (quote, callbacks) = {
            let mut state = self.inner.state.lock();
            let instrument = state
                .instruments
                .entry(symbol.to_string())
                .or_insert_with(|| InstrumentState::new(symbol, price, self.inner.config.spread_fraction, now));
            let quote = instrument.apply(price, &self.inner.config, now);
            (quote, state.callbacks_for(symbol))
        };

        notify(&quote, &callbacks);
        Ok(quote)
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────────

    /// Starts the periodic ticker on the current Tokio runtime.  Starting a
    /// running engine is a no-op.
    pub fn start(&self) -> Result<(), EngineError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let interval_ms = {
            let mut state = self.inner.state.lock();
            if state.ticker.is_some() {
                return Ok(());
            }
            let interval_ms = state.tick_interval_ms;
            state.ticker = Some(handle.spawn(run_ticker(Arc::downgrade(&self.inner), interval_ms)));
            interval_ms
        };

        info!(interval_ms, "Price engine started");
        self.inner.events.publish(EngineEvent::EngineStarted { interval_ms });
        Ok(())
    }

    /// Stops the ticker.  Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let ticker = self.inner.state.lock().ticker.take();
        match ticker {
            Some(handle) => {
                handle.abort();
                info!("Price engine stopped");
                self.inner.events.publish(EngineEvent::EngineStopped);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().ticker.is_some()
    }

    /// Changes the tick period (clamped to 500–5000 ms) and returns the value
    /// applied.  A running ticker is restarted with the new period.
    pub fn set_tick_interval(&self, ms: u64) -> u64 {
        let interval_ms = clamp_interval(ms);
        let mut state = self.inner.state.lock();
        state.tick_interval_ms = interval_ms;

        if let Some(old) = state.ticker.take() {
            old.abort();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    state.ticker = Some(handle.spawn(run_ticker(Arc::downgrade(&self.inner), interval_ms)));
                    info!(interval_ms, "Price engine ticker restarted");
                }
                Err(_) => warn!("Ticker stopped: no runtime to restart it on"),
            }
        }
        interval_ms
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.inner.state.lock().tick_interval_ms
    }

    pub fn tick_count(&self) -> u64 {
        self.inner.state.lock().tick_count
    }

    /// Clears prices, history and subscribers and stops ticking.  Existing
    /// [`Subscription`] handles become inert.
    pub fn reset(&self) {
        let subscribers = {
            let mut state = self.inner.state.lock();
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            state.instruments.clear();
            state.tick_count = 0;
            std::mem::take(&mut state.subscribers)
        };
        drop(subscribers);
        info!("Price engine reset");
    }

    // ─── Queries ──────────────────────────────────────────────────────────────

    pub fn current_quote(&self, symbol: &str) -> Option<Quote> {
        self.inner.state.lock().instruments.get(symbol).map(|i| i.last.clone())
    }

    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.inner.state.lock().instruments.get(symbol).map(|i| i.last.price)
    }

    /// Last price of every instrument that has been initialised.
    pub fn current_prices(&self) -> HashMap<String, f64> {
        self.inner
            .state
            .lock()
            .instruments
            .iter()
            .map(|(symbol, i)| (symbol.clone(), i.last.price))
            .collect()
    }

    /// Copy of the rolling history, oldest first; `limit` keeps only the
    /// most recent N points.
    pub fn history(&self, symbol: &str, limit: Option<usize>) -> Vec<PricePoint> {
        let state = self.inner.state.lock();
        let Some(instrument) = state.instruments.get(symbol) else {
            return Vec::new();
        };
        let len = instrument.history.len();
        let skip = limit.map(|n| len.saturating_sub(n)).unwrap_or(0);
        instrument.history.iter().skip(skip).copied().collect()
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn notify(quote: &Quote, callbacks: &[QuoteCallback]) {
    for callback in callbacks {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(quote))) {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(symbol = %quote.symbol, reason, "Quote subscriber panicked");
        }
    }
}

async fn run_ticker(engine: Weak<EngineInner>, interval_ms: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // tick แรกของ interval คืนค่าทันที → ข้ามไป
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = engine.upgrade() else {
            break;
        };
        PriceEngine { inner }.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{system_clock, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> PriceEngine {
        let config = SimConfig { seed: Some(42), ..SimConfig::default() };
        PriceEngine::new(config, Arc::new(ManualClock::default()), EventBus::new())
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Quote) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move |_: &Quote| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_lazy_initialisation_from_catalog() {
        let engine = engine();
        assert!(engine.current_quote("AAPL").is_none());

        let _sub = engine.subscribe("AAPL", |_| {});
        let quote = engine.current_quote("AAPL").unwrap();
        assert_eq!(quote.price, 150.0);
        assert_eq!(quote.open, 150.0);
        assert_eq!(quote.change, 0.0);

        let _other = engine.subscribe("ZZZZ", |_| {});
        let price = engine.current_price("ZZZZ").unwrap();
        assert!((100.0..300.0).contains(&price));
    }

    #[test]
    fn test_only_subscribed_symbols_tick() {
        let engine = engine();
        let (count, cb) = counter();
        let _sub = engine.subscribe("AAPL", cb);

        engine.tick();
        engine.tick();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(engine.history("AAPL", None).len(), 2);
        assert!(engine.current_quote("MSFT").is_none());
        assert_eq!(engine.subscribed_symbols(), vec!["AAPL".to_string()]);
        assert_eq!(engine.tick_count(), 2);
    }

    #[test]
    fn test_quote_invariants() {
        let engine = engine();
        let _sub = engine.subscribe("MSFT", |_| {});
        for _ in 0..50 {
            engine.tick();
            let q = engine.current_quote("MSFT").unwrap();
            assert!(q.bid < q.price && q.price < q.ask);
            assert!(q.low <= q.price && q.price <= q.high);
            assert!((q.spread - q.price * 0.001).abs() < 0.001);
            assert!((q.change - (q.price - q.open)).abs() < 0.011);
        }
    }

    #[test]
    fn test_history_is_capped() {
        let engine = engine();
        let _sub = engine.subscribe("AAPL", |_| {});
        for _ in 0..600 {
            engine.tick();
        }
        let history = engine.history("AAPL", None);
        assert_eq!(history.len(), 500);

        let recent = engine.history("AAPL", Some(10));
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[..], history[490..]);
        assert_eq!(engine.history("AAPL", Some(10_000)).len(), 500);
        assert!(engine.history("NOPE", None).is_empty());
    }

    #[test]
    fn test_unsubscribe_keeps_history_and_stops_ticking() {
        let engine = engine();
        let (count, cb) = counter();
        let sub = engine.subscribe("AAPL", cb);
        engine.tick();
        sub.unsubscribe();

        engine.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(engine.history("AAPL", None).len(), 1);
        assert!(engine.subscribed_symbols().is_empty());
        assert!(engine.current_quote("AAPL").is_some());
    }

    #[test]
    fn test_resubscribe_continues_session() {
        let engine = engine();
        let sub = engine.subscribe("AAPL", |_| {});
        engine.push_price("AAPL", 170.0).unwrap();
        drop(sub);

        let _sub = engine.subscribe("AAPL", |_| {});
        let quote = engine.current_quote("AAPL").unwrap();
        assert_eq!(quote.price, 170.0);
        assert_eq!(quote.open, 150.0);
        assert_eq!(quote.high, 170.0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let engine = engine();
        let _bad = engine.subscribe("AAPL", |_| panic!("observer bug"));
        let (count, cb) = counter();
        let _good = engine.subscribe("AAPL", cb);

        engine.tick();
        engine.tick();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself() {
        let engine = engine();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_slot = slot.clone();
        let sub = engine.subscribe("AAPL", move |_| {
            inner_slot.lock().take();
        });
        *slot.lock() = Some(sub);

        engine.tick();
        assert_eq!(engine.subscriber_count("AAPL"), 0);
    }

    #[test]
    fn test_push_price_updates_session_stats() {
        let engine = engine();
        let (count, cb) = counter();
        let _sub = engine.subscribe("AAPL", cb);

        let q = engine.push_price("AAPL", 138.0).unwrap();
        assert_eq!(q.price, 138.0);
        assert_eq!(q.low, 138.0);
        assert_eq!(q.high, 150.0);
        assert_eq!(q.change, -12.0);
        assert_eq!(q.change_percent, -8.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(engine.push_price("AAPL", -1.0).is_err());
        assert!(engine.push_price("AAPL", f64::NAN).is_err());
    }

    #[test]
    fn test_reset_clears_everything() {
        let engine = engine();
        let (count, cb) = counter();
        let sub = engine.subscribe("AAPL", cb);
        engine.tick();

        engine.reset();
        assert!(engine.current_quote("AAPL").is_none());
        assert!(engine.subscribed_symbols().is_empty());
        assert!(engine.history("AAPL", None).is_empty());
        assert!(!engine.is_running());

        engine.tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(sub);
    }

    #[test]
    fn test_start_requires_runtime() {
        let engine = engine();
        assert_eq!(engine.start(), Err(EngineError::NoRuntime));
        assert!(!engine.is_running());
        assert!(!engine.stop());
    }

    #[test]
    fn test_interval_is_clamped() {
        let engine = engine();
        assert_eq!(engine.set_tick_interval(10), 500);
        assert_eq!(engine.set_tick_interval(99_999), 5000);
        assert_eq!(engine.tick_interval_ms(), 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_runs_until_stopped() {
        let engine = PriceEngine::new(SimConfig::default(), system_clock(), EventBus::new());
        let (count, cb) = counter();
        let _sub = engine.subscribe("AAPL", cb);

        engine.start().unwrap();
        assert!(engine.is_running());
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(engine.stop());
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 3, "ticks seen: {seen}");

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
