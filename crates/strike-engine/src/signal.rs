//! External pricing-signal ticks consumed by strategies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What kind of observation a tick carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// A trade print on the underlying.
    Trade,
    /// An index or reference price.
    Index,
    /// A top-of-book quote midpoint.
    Quote,
}

/// One tick from an external signal channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalTick {
    /// Channel name the subscriber registered, e.g. `deribit.btc.index`.
    pub channel: String,
    pub kind: SignalKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub value: Decimal,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
