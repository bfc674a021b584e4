//! # engine::rate_limit
//!
//! Trade cooldown — at most one successful execution per rolling window.
//!
//! Only successful trades start the cooldown.  Rejections (bad input,
//! insufficient cash) leave the clock alone so the user can fix the request
//! and retry immediately.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Approved,
    Blocked { retry_after_ms: u64 },
}

// ─── Status (for UI countdowns) ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub can_trade:        bool,
    pub remaining_ms:     u64,
    pub cooldown_ms:      u64,
    pub last_trade_at:    Option<DateTime<Utc>>,
    pub cooldown_ends_at: Option<DateTime<Utc>>,
}

// ─── Rate Limiter ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RateLimiter {
    last_success_at: Mutex<Option<DateTime<Utc>>>,
    cooldown:        Duration,
}

impl RateLimiter {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            last_success_at: Mutex::new(None),
            cooldown:        Duration::milliseconds(cooldown_ms as i64),
        }
    }

    pub fn check(&self, now: DateTime<Utc>) -> RateDecision {
        match self.remaining(now) {
            0 => RateDecision::Approved,
            retry_after_ms => RateDecision::Blocked { retry_after_ms },
        }
    }

    /// เริ่มนับ cooldown ใหม่ที่ `now` (เรียกเฉพาะตอน trade สำเร็จ)
    pub fn record_success(&self, now: DateTime<Utc>) {
        *self.last_success_at.lock() = Some(now);
    }

    pub fn reset(&self) {
        *self.last_success_at.lock() = None;
    }

    pub fn status(&self, now: DateTime<Utc>) -> RateLimitStatus {
        let last = *self.last_success_at.lock();
        let remaining_ms = self.remaining(now);
        RateLimitStatus {
            can_trade:        remaining_ms == 0,
            remaining_ms,
            cooldown_ms:      self.cooldown.num_milliseconds().max(0) as u64,
            last_trade_at:    last,
            cooldown_ends_at: last.map(|t| t + self.cooldown).filter(|_| remaining_ms > 0),
        }
    }

    fn remaining(&self, now: DateTime<Utc>) -> u64 {
        let Some(last) = *self.last_success_at.lock() else {
            return 0;
        };
        let elapsed = now.signed_duration_since(last);
        if elapsed >= self.cooldown {
            0
        } else {
            (self.cooldown - elapsed).num_milliseconds().max(1) as u64
        }
    }
}
