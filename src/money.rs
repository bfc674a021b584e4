//! # money
//!
//! Integer-cents arithmetic for everything that touches cash.
//!
//! Dollar amounts enter the system as `f64` at the edges (a UI form, a quote)
//! and are converted to [`Cents`] immediately.  From then on every sum,
//! product and average is computed on `i64` cents with overflow checks, so a
//! buy followed by a sell at the same price returns cash to exactly the same
//! value.
//!
//! The magnitude bound is the IEEE-754 safe-integer limit (`2^53 − 1`): any
//! value beyond it could not be represented exactly once converted back to
//! dollars for display, so it is rejected as [`MoneyError::Overflow`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MoneyError;

/// จำนวนเต็มที่ใหญ่ที่สุดที่ `f64` เก็บได้แบบไม่เพี้ยน (2^53 − 1)
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

// ─── Cents ────────────────────────────────────────────────────────────────────

/// A signed amount of money in whole cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Wraps a raw cent count, rejecting values outside the safe range.
    pub fn new(cents: i64) -> Result<Self, MoneyError> {
        check_bound(cents as i128)
    }

    /// Converts dollars to cents, rounding to the nearest cent.
    pub fn from_dollars(dollars: f64) -> Result<Self, MoneyError> {
        if !dollars.is_finite() {
            return Err(MoneyError::InvalidAmount(dollars));
        }
        let scaled = (dollars * 100.0).round();
        if scaled.abs() > MAX_SAFE_INTEGER as f64 {
            return Err(MoneyError::Overflow);
        }
        Ok(Cents(scaled as i64))
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn to_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(self, other: Cents) -> Result<Cents, MoneyError> {
        check_bound(self.0 as i128 + other.0 as i128)
    }

    pub fn checked_sub(self, other: Cents) -> Result<Cents, MoneyError> {
        check_bound(self.0 as i128 - other.0 as i128)
    }

    /// Price × quantity.
    pub fn checked_mul(self, quantity: u64) -> Result<Cents, MoneyError> {
        check_bound(self.0 as i128 * quantity as i128)
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

fn check_bound(value: i128) -> Result<Cents, MoneyError> {
    if value.abs() > MAX_SAFE_INTEGER as i128 {
        Err(MoneyError::Overflow)
    } else {
        Ok(Cents(value as i64))
    }
}

// ─── Position Math ────────────────────────────────────────────────────────────

/// Average cost per share after adding `incoming_qty` shares at
/// `incoming_price` to a holding whose exact total cost is `existing_basis`.
///
/// Works from the unrounded basis, so the result is always
/// `Σ(price × qty) ÷ Σqty` rounded half away from zero, however many buys
/// preceded it.
pub fn weighted_average(
    existing_basis: Cents,
    existing_qty: u64,
    incoming_price: Cents,
    incoming_qty: u64,
) -> Result<Cents, MoneyError> {
    let total_qty = existing_qty as i128 + incoming_qty as i128;
    if total_qty == 0 {
        return Err(MoneyError::InvalidAmount(0.0));
    }
    let total_cost = existing_basis.0 as i128 + incoming_price.0 as i128 * incoming_qty as i128;
    check_bound(div_round(total_cost, total_qty))
}

/// `amount × part ÷ whole`, rounded to the cent.  Shrinks a cost basis when
/// part of a position is sold.
pub fn pro_rata(amount: Cents, part: u64, whole: u64) -> Result<Cents, MoneyError> {
    if whole == 0 {
        return Err(MoneyError::InvalidAmount(0.0));
    }
    check_bound(div_round(amount.0 as i128 * part as i128, whole as i128))
}

/// `(exit_price − average_cost) × quantity`.
pub fn realized_pnl(exit_price: Cents, average_cost: Cents, quantity: u64) -> Result<Cents, MoneyError> {
    exit_price.checked_sub(average_cost)?.checked_mul(quantity)
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

// ─── Display Rounding ─────────────────────────────────────────────────────────

/// Rounds a display value (quote fields, percentages) to `decimals` places.
#[inline]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
