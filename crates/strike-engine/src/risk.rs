//! Position, order-size, and notional limits with shrink-not-reject clamping.
//!
//! A requested order is never refused outright for breaching a limit; it is
//! shrunk to the largest size every limit still admits. The clamp is a pure
//! function of the limits and the current exposure so it can be tested
//! without an exchange.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use strike_common::{FeeSchedule, Side};

/// Hard limits the engine enforces on every order.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Maximum absolute position in contracts.
    pub max_position: i64,
    /// Maximum contracts in a single order.
    pub max_order_contracts: i64,
    /// Maximum total capital committed, cost basis plus open buy orders
    /// including taker fees.
    pub max_notional: Decimal,
    /// Hard deadline after which only flattening orders are allowed.
    pub terminal_exit: DateTime<Utc>,
}

impl RiskLimits {
    /// True once the terminal-exit deadline has passed.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.terminal_exit
    }
}

/// Current exposure of the ledger, the input to the clamp.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exposure {
    /// Signed net position in contracts.
    pub position: i64,
    /// Contracts reserved by open buy orders.
    pub pending_buy: i64,
    /// Contracts reserved by open sell orders.
    pub pending_sell: i64,
    /// Capital already committed: cost basis of the held position plus the
    /// cost of open buy orders.
    pub open_notional: Decimal,
}

/// How the clamp changed the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampOutcome {
    /// The full requested size fits within every limit.
    Full,
    /// The order was shrunk from `requested` contracts.
    Reduced { requested: i64 },
    /// No size fits; nothing should be sent.
    Zero,
}

/// Result of clamping one order request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamp {
    /// Contracts that may actually be sent.
    pub contracts: i64,
    pub outcome: ClampOutcome,
}

/// Shrink `contracts` until position, per-order, and notional limits all
/// hold.
///
/// The position cap counts worst-case exposure: held position plus the open
/// orders on the same side, all assumed to fill. Flattening orders bypass
/// the per-order and notional caps (they only reduce exposure) but still
/// respect the position cap; `price` is `None` only for market flattens,
/// where the notional cap does not apply.
pub fn clamp_order(
    limits: &RiskLimits,
    fees: &FeeSchedule,
    side: Side,
    price: Option<Decimal>,
    contracts: i64,
    exposure: &Exposure,
    flatten: bool,
) -> Clamp {
    let headroom = match side {
        Side::Buy => limits.max_position - (exposure.position + exposure.pending_buy),
        Side::Sell => limits.max_position + (exposure.position - exposure.pending_sell),
    };
    let mut allowed = contracts.min(headroom.max(0));

    if !flatten {
        allowed = allowed.min(limits.max_order_contracts);

        // Only buys commit new capital; the notional cap does not bind sells.
        if side == Side::Buy {
            if let Some(price) = price {
                let unit_cost = price + fees.taker_fee_per_contract(price);
                // A non-positive unit cost commits no capital, so the
                // notional cap cannot bind (and dividing by it would panic).
                if unit_cost > Decimal::ZERO {
                    let free = (limits.max_notional - exposure.open_notional).max(Decimal::ZERO);
                    let by_notional = (free / unit_cost)
                        .floor()
                        .to_i64()
                        .unwrap_or(0);
                    allowed = allowed.min(by_notional);
                }
            }
        }
    }

    if allowed <= 0 {
        Clamp {
            contracts: 0,
            outcome: ClampOutcome::Zero,
        }
    } else if allowed < contracts {
        Clamp {
            contracts: allowed,
            outcome: ClampOutcome::Reduced {
                requested: contracts,
            },
        }
    } else {
        Clamp {
            contracts,
            outcome: ClampOutcome::Full,
        }
    }
}
