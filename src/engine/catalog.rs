//! # engine::catalog
//!
//! Seed prices for instruments the simulator knows by name.  Anything else
//! starts from a pseudo-random price in `[100, 300)`.

use rand::Rng;

const SEED_PRICES: &[(&str, f64)] = &[
    ("AAPL", 150.00),
    ("MSFT", 380.00),
    ("GOOGL", 140.00),
    ("AMZN", 175.00),
    ("NVDA", 480.00),
    ("META", 350.00),
    ("TSLA", 250.00),
    ("NFLX", 450.00),
    ("AMD", 120.00),
    ("INTC", 45.00),
    ("JPM", 170.00),
    ("V", 260.00),
    ("DIS", 95.00),
    ("KO", 60.00),
    ("BRK.B", 360.00),
    ("SPY", 450.00),
    ("QQQ", 380.00),
];

pub const FALLBACK_MIN: f64 = 100.0;
pub const FALLBACK_MAX: f64 = 300.0;

pub fn seed_price(symbol: &str) -> Option<f64> {
    SEED_PRICES.iter().find(|(s, _)| *s == symbol).map(|(_, p)| *p)
}

/// ราคาเริ่มต้นจาก catalog ถ้าไม่มีใน catalog สุ่มในช่วง `[100, 300)`
pub fn initial_price<R: Rng + ?Sized>(symbol: &str, rng: &mut R) -> f64 {
    seed_price(symbol).unwrap_or_else(|| rng.gen_range(FALLBACK_MIN..FALLBACK_MAX))
}

pub fn known_symbols() -> impl Iterator<Item = &'static str> {
    SEED_PRICES.iter().map(|(s, _)| *s)
}
