//! # engine::gbm
//!
//! Geometric Brownian Motion step used by the price engine.
//!
//! ```text
//! next = P · exp( (μ − σ²/2)·Δt + σ·√Δt·Z ),   Z ~ N(0, 1)
//! ```
//! `Z` comes from a Box–Muller transform over two uniform draws, so any
//! `rand::Rng` works as the entropy source.

use rand::Rng;
use std::f64::consts::PI;

use crate::config::SimConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GbmParams {
    /// Annualised drift μ.
    pub drift: f64,
    /// Annualised volatility σ.
    pub volatility: f64,
    /// Time step in years.
    pub dt: f64,
}

impl GbmParams {
    pub fn from_config(config: &SimConfig) -> Self {
        Self { drift: config.drift, volatility: config.volatility, dt: config.dt }
    }

    /// Deterministic part of the log-return.
    #[inline]
    pub fn log_drift(&self) -> f64 {
        (self.drift - self.volatility * self.volatility / 2.0) * self.dt
    }

    /// Scale applied to the standard-normal shock.
    #[inline]
    pub fn log_diffusion(&self) -> f64 {
        self.volatility * self.dt.sqrt()
    }

    /// Applies one step with a given shock `z`.
    #[inline]
    pub fn step_with(&self, price: f64, z: f64) -> f64 {
        price * (self.log_drift() + self.log_diffusion() * z).exp()
    }

    pub fn step<R: Rng + ?Sized>(&self, price: f64, rng: &mut R) -> f64 {
        self.step_with(price, standard_normal(rng))
    }
}

/// Box–Muller: `√(−2 ln u₁) · cos(2π u₂)`.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen::<f64>() อยู่ในช่วง [0, 1) → พลิกเป็น (0, 1] กัน ln(0)
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
