//! # events
//!
//! Defines [`EngineEvent`] — every state change the core announces to
//! collaborators (UI toasts, a persistence layer saving on change, logs).
//!
//! Events travel over a `tokio::sync::broadcast` channel.  Publishing never
//! blocks and never fails when nobody is listening, so the core can run
//! headless.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{LimitOrder, Trade};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// เริ่ม Price ticker แล้ว
    EngineStarted { interval_ms: u64 },

    EngineStopped,

    TradeExecuted { trade: Box<Trade> },

    /// ผ่าน validation แต่ apply ไม่สำเร็จ (เช่น arithmetic overflow)
    TradeFailed { trade: Box<Trade> },

    OrderPlaced { order: Box<LimitOrder> },

    /// Limit order ที่เงินหรือหุ้นไม่พอตั้งแต่ตอนวาง → ลง history ทันที ไม่ถูก monitor
    OrderRejected { order: Box<LimitOrder> },

    OrderTriggered {
        order_id: Uuid,
        symbol:   String,
        price:    f64,
    },

    OrderFilled { order: Box<LimitOrder> },

    OrderFailed { order: Box<LimitOrder> },

    OrderCancelled { order: Box<LimitOrder> },

    OrderModified { order: Box<LimitOrder> },
}

impl EngineEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

/// Cheap-to-clone handle over the broadcast sender.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Err เกิดขึ้นเมื่อไม่มี receiver — ไม่ใช่ error จริงๆ
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_listeners_is_fine() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::EngineStopped);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(EngineEvent::EngineStarted { interval_ms: 1000 });
        match rx.try_recv().unwrap() {
            EngineEvent::EngineStarted { interval_ms } => assert_eq!(interval_ms, 1000),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_json_tag() {
        let json = EngineEvent::OrderTriggered {
            order_id: Uuid::nil(),
            symbol:   "AAPL".into(),
            price:    138.0,
        }
        .to_json();
        assert!(json.contains(r#""event":"ORDER_TRIGGERED""#));
        assert!(json.contains(r#""symbol":"AAPL""#));
    }
}
