//! Market state machine for a single binary market.
//!
//! Reconstructs an authoritative local order book from an exchange feed of
//! snapshot and delta messages, enforcing the per-market sequence-number
//! invariant. A gap in the sequence desyncs the market; only a fresh snapshot
//! recovers it. Every applied message triggers the registered update handler
//! with an immutable view of the book plus the current realized-volatility
//! estimate.
//!
//! ## Modules
//!
//! - `sequence`: pure sequence-number validation shared by book and market
//! - `book`: priced level storage per side with snapshot/delta application
//! - `window`: bounded price history feeding the volatility estimate
//! - `feed`: wire types for snapshot and delta messages
//! - `market`: the `BinaryMarket` aggregate and its update notification

pub mod book;
pub mod feed;
pub mod market;
pub mod sequence;
pub mod window;

pub use book::{BookError, BookStatus, OrderBook};
pub use feed::{DeltaMsg, FeedMessage, SnapshotMsg};
pub use market::{BinaryMarket, MarketError, MarketStatus, MarketView, UpdateHandler};
pub use sequence::SequenceError;
pub use window::PriceWindow;
