//! Core trading types shared across the workspace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side for trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign applied to contract counts when computing signed position deltas.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Side of the order book a level or change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookSide::Bid => write!(f, "bid"),
            BookSide::Ask => write!(f, "ask"),
        }
    }
}

/// A single level in an order book (price + resting contracts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// Price in dollars (0.01 to 0.99 for binary contracts).
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Contracts resting at this price.
    pub contracts: i64,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, contracts: i64) -> Self {
        Self { price, contracts }
    }
}

/// A single order-book change inside a delta message.
///
/// `contracts` is the new absolute size at `price`; zero removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub side: BookSide,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub contracts: i64,
}

impl LevelChange {
    pub fn new(side: BookSide, price: Decimal, contracts: i64) -> Self {
        Self {
            side,
            price,
            contracts,
        }
    }
}

/// Identity of a single binary market: ticker, strike, and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketIdent {
    /// Exchange ticker of the market.
    pub ticker: String,
    /// Strike price of the underlying in dollars.
    #[serde(with = "rust_decimal::serde::str")]
    pub strike_price: Decimal,
    /// Expiry time of the market.
    pub expiry: DateTime<Utc>,
}

impl MarketIdent {
    pub fn new(ticker: impl Into<String>, strike_price: Decimal, expiry: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            strike_price,
            expiry,
        }
    }

    /// Time to expiry in years, floored at zero. Feeds the pricing model.
    pub fn time_to_expiry_years(&self, now: DateTime<Utc>) -> f64 {
        let secs = (self.expiry - now).num_milliseconds() as f64 / 1000.0;
        (secs / (365.25 * 24.0 * 3600.0)).max(0.0)
    }
}

impl std::fmt::Display for MarketIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} strike={} expiry={}", self.ticker, self.strike_price, self.expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_sign() {
        assert_eq!(Side::Buy.sign(), 1);
        assert_eq!(Side::Sell.sign(), -1);
    }

    #[test]
    fn test_level_change_serde() {
        let json = r#"{"side": "bid", "price": "0.45", "contracts": 100}"#;
        let change: LevelChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.side, BookSide::Bid);
        assert_eq!(change.price, dec!(0.45));
        assert_eq!(change.contracts, 100);
    }

    #[test]
    fn test_time_to_expiry() {
        let now = Utc::now();
        let ident = MarketIdent::new("BTC-100K", dec!(100000), now + chrono::Duration::days(365));
        let years = ident.time_to_expiry_years(now);
        assert!(years > 0.99 && years < 1.01);

        let past = MarketIdent::new("BTC-100K", dec!(100000), now - chrono::Duration::hours(1));
        assert_eq!(past.time_to_expiry_years(now), 0.0);
    }
}
