//! # config
//!
//! Runtime knobs, read from environment variables with typed defaults.
//! `main` loads `.env` first via `dotenvy`, so either works.
//!
//! | Variable                   | Default   | Meaning                                 |
//! |----------------------------|-----------|-----------------------------------------|
//! | `SIM_TICK_INTERVAL_MS`     | 1000      | Ticker period, clamped to 500–5000      |
//! | `SIM_DRIFT`                | 0.10      | Annualised GBM drift μ                  |
//! | `SIM_VOLATILITY`           | 0.20      | Annualised GBM volatility σ             |
//! | `SIM_SPREAD_FRACTION`      | 0.001     | Bid/ask spread as a fraction of price   |
//! | `SIM_HISTORY_LIMIT`        | 500       | Price points kept per instrument        |
//! | `SIM_SEED`                 | (random)  | Fixed RNG seed for reproducible runs    |
//! | `LEDGER_INITIAL_CASH`      | 100000    | Starting cash in dollars                |
//! | `LEDGER_RATE_LIMIT_MS`     | 1000      | Cooldown after each successful trade    |
//! | `LEDGER_MAX_TRADE_HISTORY` | 1000      | Trade records kept (oldest pruned)      |

use crate::money::Cents;

pub const MIN_TICK_INTERVAL_MS: u64 = 500;
pub const MAX_TICK_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Trading seconds in one year: 252 days × 6.5 hours × 3600 s.
pub const TRADING_SECONDS_PER_YEAR: f64 = 252.0 * 6.5 * 3600.0;

// ─── SimConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub tick_interval_ms: u64,
    pub drift: f64,
    pub volatility: f64,
    /// Δt ของ GBM หน่วยเป็นสัดส่วนของ trading year (ค่าคงที่ 1 วินาทีซื้อขาย)
    pub dt: f64,
    pub spread_fraction: f64,
    pub history_limit: usize,
    pub seed: Option<u64>,
}

impl SimConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval_ms: clamp_interval(env_parse("SIM_TICK_INTERVAL_MS", defaults.tick_interval_ms)),
            drift:            env_parse("SIM_DRIFT", defaults.drift),
            volatility:       env_parse("SIM_VOLATILITY", defaults.volatility),
            dt:               defaults.dt,
            spread_fraction:  env_parse("SIM_SPREAD_FRACTION", defaults.spread_fraction),
            history_limit:    env_parse("SIM_HISTORY_LIMIT", defaults.history_limit).max(1),
            seed:             std::env::var("SIM_SEED").ok().and_then(|v| v.parse().ok()),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            drift:            0.10,
            volatility:       0.20,
            dt:               1.0 / TRADING_SECONDS_PER_YEAR,
            spread_fraction:  0.001,
            history_limit:    500,
            seed:             None,
        }
    }
}

/// บีบ tick interval ให้อยู่ในช่วง 500–5000 ms
pub fn clamp_interval(ms: u64) -> u64 {
    ms.clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS)
}

// ─── LedgerConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub initial_cash: Cents,
    pub rate_limit_ms: u64,
    pub max_trade_history: usize,
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let initial_cash = std::env::var("LEDGER_INITIAL_CASH")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .and_then(|d| Cents::from_dollars(d).ok())
            .filter(|c| !c.is_negative())
            .unwrap_or(defaults.initial_cash);

        Self {
            initial_cash,
            rate_limit_ms:     env_parse("LEDGER_RATE_LIMIT_MS", defaults.rate_limit_ms),
            max_trade_history: env_parse("LEDGER_MAX_TRADE_HISTORY", defaults.max_trade_history).max(1),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_cash:      Cents::new(10_000_000).unwrap_or_default(),
            rate_limit_ms:     1_000,
            max_trade_history: 1_000,
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub sim: SimConfig,
    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sim:    SimConfig::from_env(),
            ledger: LedgerConfig::from_env(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
