//! # papertrade
//!
//! Paper-trading simulation core: synthetic GBM quotes, an integer-cents
//! trade ledger and a limit-order monitor, wired together by
//! [`state::TradingSession`].

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod money;
pub mod state;

pub use config::Config;
pub use error::{EngineError, MoneyError, OrderError, TradeError, ValidationError};
pub use state::{build_session, SessionSnapshot, TradingSession};
