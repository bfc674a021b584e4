//! # papertrade — simulated trading session
//!
//! ```text
//!  ┌─────────────┐  tick (500–5000 ms)  ┌──────────────┐  MARKET @ quote  ┌─────────────┐
//!  │ PriceEngine │ ───────────────────▶ │ OrderMonitor │ ───────────────▶ │ TradeLedger │
//!  └─────────────┘                      └──────────────┘                  └─────────────┘
//!         └──────────────── EngineEvent (broadcast) ──────▶ event log ◀───────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable               | Default            | Description                      |
//! |------------------------|--------------------|----------------------------------|
//! | `SIM_TICK_INTERVAL_MS` | `1000`             | Tick period, clamped 500–5000    |
//! | `SIM_SEED`             | random             | Deterministic price paths        |
//! | `LEDGER_INITIAL_CASH`  | `100000`           | Starting cash in dollars         |
//! | `DEMO_DURATION_SECS`   | `10`               | How long the demo runs           |
//! | `RUST_LOG`             | `papertrade=debug` | Tracing filter                   |

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use papertrade::engine::catalog;
use papertrade::models::{LimitOrderRequest, TradeRequest};
use papertrade::{build_session, Config};

/// จำนวน Symbol ที่เปิดดูราคาระหว่าง demo (ตัวแรกๆ ใน catalog)
const DEMO_SYMBOL_COUNT: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("papertrade=debug".parse()?))
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════╗
  ║        PAPERTRADE — Simulation Session        ║
  ║     GBM Prices · Ledger · Limit Orders        ║
  ╚═══════════════════════════════════════════════╝"#);

    // ── 3. Session ────────────────────────────────────────────────────────────
    let config = Config::from_env();
    info!(
        interval_ms  = config.sim.tick_interval_ms,
        initial_cash = %config.ledger.initial_cash,
        "Config loaded"
    );
    let session = build_session(config);

    // ── 4. Event log ──────────────────────────────────────────────────────────
    let mut events = session.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = %event.to_json(), "Event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── 5. Quote observers ────────────────────────────────────────────────────
    let _watchers: Vec<_> = catalog::known_symbols()
        .take(DEMO_SYMBOL_COUNT)
        .map(|symbol| {
            session.prices.subscribe(symbol, |q| {
                info!(
                    symbol = %q.symbol,
                    price  = q.price,
                    mid    = q.mid(),
                    bid    = q.bid,
                    ask    = q.ask,
                    change = %format!("{:+.2}%", q.change_percent),
                    "Quote"
                );
            })
        })
        .collect();

    // ── 6. Opening trades ─────────────────────────────────────────────────────
    if let Err(e) = session.ledger.execute_trade(TradeRequest::buy("MSFT", 10, session_price(&session, "MSFT"))) {
        warn!(error = %e, "Opening trade rejected");
    }

    let aapl = session_price(&session, "AAPL");
    for (quantity, discount) in [(20, 0.999), (10, 0.995)] {
        let limit = (aapl * discount * 100.0).round() / 100.0;
        session.orders.place_order(LimitOrderRequest::buy("AAPL", quantity, limit))?;
    }

    // ── 7. Run ────────────────────────────────────────────────────────────────
    let duration = std::env::var("DEMO_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10u64);

    session.prices.start()?;
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    session.prices.stop();

    // ── 8. Report ─────────────────────────────────────────────────────────────
    let metrics = session.metrics();
    let stats = session.orders.stats();
    let executed = session.ledger.trade_history().iter().filter(|t| t.is_executed()).count();
    info!(
        total_value   = metrics.total_value,
        cash          = metrics.cash,
        unrealized_pl = metrics.unrealized_pl,
        realized_pl   = metrics.realized_pl,
        return_pct    = metrics.total_return_percent,
        trades        = executed,
        orders_filled = stats.filled,
        orders_open   = stats.pending,
        "Session finished"
    );
    println!("{}", serde_json::to_string_pretty(&session.snapshot())?);

    Ok(())
}

fn session_price(session: &papertrade::TradingSession, symbol: &str) -> f64 {
    session.prices.current_price(symbol).unwrap_or(100.0)
}
