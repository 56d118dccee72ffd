//! Local position and order book-keeping.
//!
//! The ledger is the engine's view of its own orders and inventory. It is
//! updated optimistically on submit (reservations), corrected by fills, and
//! overwritten wholesale by reconciliation when exchange truth disagrees.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use strike_common::Side;
use tracing::warn;
use uuid::Uuid;

use crate::exchange::{AccountSnapshot, FillEvent};
use crate::risk::Exposure;

/// Client-side order id, assigned at creation and stable for the order's
/// whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Order lifecycle state. `Filled`, `Cancelled`, and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Created locally, not yet acknowledged by the exchange.
    New,
    /// Accepted by the exchange and resting.
    Acked,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }

    fn accepts_fills(&self) -> bool {
        !self.is_terminal()
    }
}

/// One tracked order.
#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub id: OrderId,
    /// Exchange-assigned id, set once the submit is acknowledged.
    pub exchange_id: Option<String>,
    pub side: Side,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    pub contracts: i64,
    pub filled: i64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

impl OrderHandle {
    pub fn new(side: Side, price: Option<Decimal>, contracts: i64) -> Self {
        Self {
            id: OrderId::new(),
            exchange_id: None,
            side,
            price,
            contracts,
            filled: 0,
            state: OrderState::New,
            created_at: Utc::now(),
        }
    }

    /// Contracts still unfilled.
    pub fn remaining(&self) -> i64 {
        self.contracts - self.filled
    }
}

/// Net position with cost basis and realized P&L.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    /// Signed contracts; positive is long.
    pub contracts: i64,
    /// Average entry price of the open position.
    pub avg_cost: Decimal,
    /// Realized profit and loss, net of fees.
    pub realized_pnl: Decimal,
}

impl Position {
    /// Apply one fill: extend or reduce the position, realizing P&L on the
    /// closed portion and re-basing at the fill price when the position
    /// flips sign.
    pub fn apply_fill(&mut self, side: Side, price: Decimal, contracts: i64, fee: Decimal) {
        let signed = side.sign() * contracts;
        let old = self.contracts;

        if old == 0 || old.signum() == signed.signum() {
            let total = old.abs() + contracts;
            self.avg_cost = (self.avg_cost * Decimal::from(old.abs())
                + price * Decimal::from(contracts))
                / Decimal::from(total);
            self.contracts = old + signed;
        } else {
            let closing = contracts.min(old.abs());
            let pnl_per_contract = if old > 0 {
                price - self.avg_cost
            } else {
                self.avg_cost - price
            };
            self.realized_pnl += pnl_per_contract * Decimal::from(closing);
            self.contracts = old + signed;
            if self.contracts == 0 {
                self.avg_cost = Decimal::ZERO;
            } else if old.signum() != self.contracts.signum() {
                self.avg_cost = price;
            }
        }

        self.realized_pnl -= fee;
    }
}

/// A fill after it has been applied to the ledger.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: OrderId,
    pub exchange_order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub contracts: i64,
    pub position_after: i64,
    pub realized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// What reconciliation changed when overwriting local state.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Exchange position minus local position before the overwrite.
    pub position_drift: i64,
    /// Orders the exchange knew about but we did not.
    pub orders_adopted: usize,
    /// Local open orders the exchange no longer had.
    pub orders_dropped: usize,
    /// Unmatched fills that were pending before the overwrite.
    pub unregistered_fills: usize,
    /// True if anything above is non-zero.
    pub diverged: bool,
}

/// Orders, position, and pending reservations for one market.
#[derive(Debug, Default)]
pub struct Ledger {
    position: Position,
    orders: HashMap<OrderId, OrderHandle>,
    by_exchange_id: HashMap<String, OrderId>,
    /// Fills for order ids we do not know, keyed by exchange order id.
    /// Cleared by the next reconciliation, which restores exchange truth.
    unregistered_fills: HashMap<String, i64>,
    pending_buy: i64,
    pending_sell: i64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn order(&self, id: &OrderId) -> Option<&OrderHandle> {
        self.orders.get(id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &OrderHandle> {
        self.orders.values().filter(|o| !o.state.is_terminal())
    }

    pub fn unregistered_fill_count(&self) -> usize {
        self.unregistered_fills.len()
    }

    /// Worst-case exposure used by the risk clamp.
    pub fn exposure(&self) -> Exposure {
        let open_buy_cost: Decimal = self
            .open_orders()
            .filter(|o| o.side == Side::Buy)
            .map(|o| o.price.unwrap_or(Decimal::ZERO) * Decimal::from(o.remaining()))
            .sum();
        let basis = self.position.avg_cost * Decimal::from(self.position.contracts.abs());
        Exposure {
            position: self.position.contracts,
            pending_buy: self.pending_buy,
            pending_sell: self.pending_sell,
            open_notional: basis + open_buy_cost,
        }
    }

    /// Register a new order and reserve its contracts.
    pub fn insert(&mut self, handle: OrderHandle) -> OrderId {
        let id = handle.id;
        self.reserve(handle.side, handle.remaining());
        self.orders.insert(id, handle);
        id
    }

    /// Record the exchange ack for a pending order.
    pub fn mark_acked(&mut self, id: &OrderId, exchange_id: String) {
        if let Some(order) = self.orders.get_mut(id) {
            if order.state == OrderState::New {
                order.state = OrderState::Acked;
            }
            order.exchange_id = Some(exchange_id.clone());
            self.by_exchange_id.insert(exchange_id, *id);
        }
    }

    /// Mark an order rejected and release its reservation.
    pub fn mark_rejected(&mut self, id: &OrderId) {
        if let Some(order) = self.orders.get_mut(id) {
            if !order.state.is_terminal() {
                let side = order.side;
                let remaining = order.remaining();
                order.state = OrderState::Rejected;
                self.release(side, remaining);
            }
        }
    }

    /// Mark an order cancelled and release its remaining reservation.
    pub fn mark_cancelled(&mut self, id: &OrderId) {
        if let Some(order) = self.orders.get_mut(id) {
            if !order.state.is_terminal() {
                let side = order.side;
                let remaining = order.remaining();
                order.state = OrderState::Cancelled;
                self.release(side, remaining);
            }
        }
    }

    /// Apply an exchange-reported fill.
    ///
    /// Fills for unknown or already-terminal orders are parked as
    /// unregistered rather than applied; position truth for those comes from
    /// the next reconciliation.
    pub fn apply_fill(&mut self, event: &FillEvent, fee: Decimal) -> Option<FillReport> {
        // A zero-quantity fill carries no state change; applying it would
        // corrupt the average-cost math on a flat position.
        if event.fill_contracts <= 0 {
            return None;
        }
        let id = match self.by_exchange_id.get(&event.exchange_order_id).copied() {
            Some(id) => id,
            None => {
                warn!(
                    exchange_order_id = %event.exchange_order_id,
                    contracts = event.fill_contracts,
                    "fill for unknown order, parking until reconcile"
                );
                *self
                    .unregistered_fills
                    .entry(event.exchange_order_id.clone())
                    .or_insert(0) += event.fill_contracts;
                return None;
            }
        };
        let order = self.orders.get_mut(&id)?;
        if !order.state.accepts_fills() {
            warn!(
                order_id = %id,
                state = ?order.state,
                "fill for terminal order, parking until reconcile"
            );
            *self
                .unregistered_fills
                .entry(event.exchange_order_id.clone())
                .or_insert(0) += event.fill_contracts;
            return None;
        }

        let contracts = event.fill_contracts.min(order.remaining());
        order.filled += contracts;
        order.state = if order.remaining() == 0 {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        let side = order.side;
        self.release(side, contracts);
        self.position
            .apply_fill(side, event.fill_price, contracts, fee);

        Some(FillReport {
            order_id: id,
            exchange_order_id: event.exchange_order_id.clone(),
            side,
            price: event.fill_price,
            contracts,
            position_after: self.position.contracts,
            realized_pnl: self.position.realized_pnl,
            timestamp: event.timestamp,
        })
    }

    /// Overwrite local state with exchange truth.
    ///
    /// Exchange wins every disagreement: the position is replaced, local
    /// orders the exchange no longer has are cancelled, exchange orders we
    /// never registered are adopted, and parked unregistered fills are
    /// discarded. Running this twice against the same snapshot is a no-op
    /// the second time.
    pub fn overwrite(&mut self, snapshot: &AccountSnapshot) -> ReconcileReport {
        let mut report = ReconcileReport {
            position_drift: snapshot.position - self.position.contracts,
            unregistered_fills: self.unregistered_fills.len(),
            ..ReconcileReport::default()
        };

        if report.position_drift != 0 {
            self.position.contracts = snapshot.position;
            if snapshot.position == 0 {
                self.position.avg_cost = Decimal::ZERO;
            }
        }

        // Drop local open orders the exchange no longer knows.
        let stale: Vec<OrderId> = self
            .open_orders()
            .filter(|o| match &o.exchange_id {
                Some(xid) => !snapshot.open_orders.iter().any(|r| &r.exchange_id == xid),
                // Never acked; if the exchange has no record, it is gone.
                None => true,
            })
            .map(|o| o.id)
            .collect();
        report.orders_dropped = stale.len();
        for id in stale {
            self.mark_cancelled(&id);
        }

        // Adopt exchange orders we are not tracking, and true up remaining
        // sizes on the ones we are.
        for resting in &snapshot.open_orders {
            match self.by_exchange_id.get(&resting.exchange_id).copied() {
                Some(id) => {
                    let adjust = self.orders.get_mut(&id).and_then(|order| {
                        let local_remaining = order.remaining();
                        if local_remaining == resting.remaining {
                            return None;
                        }
                        order.filled = order.contracts - resting.remaining;
                        Some((order.side, local_remaining - resting.remaining))
                    });
                    if let Some((side, diff)) = adjust {
                        if diff > 0 {
                            self.release(side, diff);
                        } else {
                            self.reserve(side, -diff);
                        }
                        report.diverged = true;
                    }
                }
                None => {
                    let mut handle =
                        OrderHandle::new(resting.side, Some(resting.price), resting.remaining);
                    handle.state = OrderState::Acked;
                    handle.exchange_id = Some(resting.exchange_id.clone());
                    report.orders_adopted += 1;
                    let id = handle.id;
                    self.reserve(handle.side, handle.remaining());
                    self.orders.insert(id, handle);
                    self.by_exchange_id.insert(resting.exchange_id.clone(), id);
                }
            }
        }

        self.unregistered_fills.clear();

        report.diverged = report.diverged
            || report.position_drift != 0
            || report.orders_adopted > 0
            || report.orders_dropped > 0
            || report.unregistered_fills > 0;
        report
    }

    fn reserve(&mut self, side: Side, contracts: i64) {
        match side {
            Side::Buy => self.pending_buy += contracts,
            Side::Sell => self.pending_sell += contracts,
        }
    }

    fn release(&mut self, side: Side, contracts: i64) {
        match side {
            Side::Buy => self.pending_buy = (self.pending_buy - contracts).max(0),
            Side::Sell => self.pending_sell = (self.pending_sell - contracts).max(0),
        }
    }
}
