//! Exchange client trait and the wire-facing order types.
//!
//! The engine never talks to an exchange directly; everything goes through
//! [`ExchangeClient`] so live trading and tests share the same code paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use strike_common::Side;
use thiserror::Error;

use crate::ledger::OrderId;

/// Errors surfaced by exchange operations.
///
/// `Auth` is fatal for the session; everything else is recoverable through
/// retry or reconciliation.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("exchange api error: {0}")]
    Api(String),
}

impl ExchangeError {
    /// True when the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExchangeError::Auth(_))
    }
}

/// Order kind sent to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

/// An order as dispatched to the exchange.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Client-side id, echoed in logs and used to match acks.
    pub client_id: OrderId,
    pub ticker: String,
    pub side: Side,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    pub contracts: i64,
    pub kind: OrderKind,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Exchange-assigned order id, the key fills are reported under.
    pub exchange_id: String,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    Cancelled,
    /// The order was already gone on the exchange side.
    Noop,
}

/// An order resting on the exchange, as reported by an account snapshot.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub exchange_id: String,
    pub side: Side,
    pub price: Decimal,
    pub remaining: i64,
}

/// Exchange-truth view of the account, fetched during reconciliation.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    /// Signed net position in contracts.
    pub position: i64,
    /// Available balance in dollars.
    pub balance: Decimal,
    pub open_orders: Vec<RestingOrder>,
}

/// A fill reported by the exchange.
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub exchange_order_id: String,
    pub fill_price: Decimal,
    pub fill_contracts: i64,
    pub timestamp: DateTime<Utc>,
}

/// Async exchange operations the engine depends on.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order, returning the exchange-assigned id on acceptance.
    async fn submit(&self, order: &OrderRequest) -> Result<SubmitAck, ExchangeError>;

    /// Cancel a resting order by its exchange id.
    async fn cancel(&self, exchange_id: &str) -> Result<CancelAck, ExchangeError>;

    /// Fetch the authoritative account state.
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError>;
}
