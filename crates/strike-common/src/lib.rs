//! Shared types for the strike-bot trading stack.
//!
//! CRITICAL: All prices and money amounts use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math. Contract counts are integral (`i64`),
//! matching exchange semantics.

pub mod fees;
pub mod price;
pub mod types;

pub use fees::FeeSchedule;
pub use price::{clamp_price, complement, is_valid_price, max_price, min_price};
pub use types::{BookSide, LevelChange, MarketIdent, OrderBookLevel, Side};
