//! # engine::validate
//!
//! Request-shape checks shared by the ledger and the order monitor, so a
//! limit order is accepted under exactly the same rules a market trade is.

use crate::error::ValidationError;
use crate::money::{Cents, MAX_SAFE_INTEGER};

pub const MAX_SYMBOL_LEN: usize = 10;
pub const MIN_PRICE: f64 = 0.01;
pub const MAX_PRICE: f64 = 1_000_000.0;

/// ยาว 1–10 ตัวอักษร ใช้ได้เฉพาะ `A-Z`, `0-9` และ `.`
pub fn symbol(symbol: &str) -> Result<(), ValidationError> {
    let ok = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidSymbol(symbol.to_string()))
    }
}

/// Positive and within the safe-integer range.
pub fn quantity(quantity: u64) -> Result<(), ValidationError> {
    if quantity == 0 || quantity > MAX_SAFE_INTEGER as u64 {
        Err(ValidationError::InvalidQuantity(quantity))
    } else {
        Ok(())
    }
}

/// Checks bounds and converts to cents.
pub fn price(price: f64) -> Result<Cents, ValidationError> {
    if !price.is_finite() || !(MIN_PRICE..=MAX_PRICE).contains(&price) {
        return Err(ValidationError::InvalidPrice(price));
    }
    Cents::from_dollars(price).map_err(|_| ValidationError::InvalidPrice(price))
}
