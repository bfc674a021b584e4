//! Domain models shared by the price engine, the ledger and the order monitor.

pub mod order;
pub mod portfolio;
pub mod quote;
pub mod trade;

pub use order::{LimitOrder, LimitOrderRequest, OrderStats, OrderStatus, OrderUpdate};
pub use portfolio::{Portfolio, PortfolioMetrics, Position, PositionMetrics};
pub use quote::{PricePoint, Quote};
pub use trade::{OrderKind, Side, Trade, TradeRequest, TradeStatus};
