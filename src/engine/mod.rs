//! Simulation core: price generation, the trade ledger and the limit-order
//! monitor that connects them.

pub mod catalog;
pub mod gbm;
pub mod ledger;
pub mod orders;
pub mod price;
pub mod rate_limit;
pub mod validate;

pub use ledger::{LedgerSnapshot, TradeLedger};
pub use orders::OrderMonitor;
pub use price::{PriceEngine, QuoteCallback, Subscription};
pub use rate_limit::{RateLimitStatus, RateLimiter};
