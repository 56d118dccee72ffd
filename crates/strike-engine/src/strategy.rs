//! Strategy extension points.
//!
//! The engine owns risk, position, and reconciliation; a strategy only
//! decides what it would like to trade. Every plan a strategy returns still
//! passes through the risk clamp before anything reaches the exchange.

use rust_decimal::Decimal;
use strike_common::Side;
use strike_market::MarketView;

use crate::ledger::FillReport;
use crate::signal::SignalTick;

/// A desired order, before risk clamping.
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub side: Side,
    /// Limit price; `None` sends a market order (flattening only).
    pub price: Option<Decimal>,
    pub contracts: i64,
    /// Flattening plans bypass the per-order and notional caps.
    pub flatten: bool,
}

impl OrderPlan {
    /// A plain limit entry order.
    pub fn entry(side: Side, price: Decimal, contracts: i64) -> Self {
        Self {
            side,
            price: Some(price),
            contracts,
            flatten: false,
        }
    }

    /// A market order that reduces the current position.
    pub fn flatten(side: Side, contracts: i64) -> Self {
        Self {
            side,
            price: None,
            contracts,
            flatten: true,
        }
    }
}

/// Trading logic plugged into the engine.
pub trait Strategy: Send {
    /// Called after every consistent order-book update.
    fn on_market_update(&mut self, view: &MarketView) -> Vec<OrderPlan>;

    /// Called on every external signal tick.
    fn on_signal_update(&mut self, tick: &SignalTick) -> Vec<OrderPlan>;

    /// Called after a fill has been applied to the ledger.
    fn on_fill(&mut self, fill: &FillReport) {
        let _ = fill;
    }
}

/// Strategy that never trades. Useful for observation sessions and tests.
#[derive(Debug, Default)]
pub struct NullStrategy;

impl Strategy for NullStrategy {
    fn on_market_update(&mut self, _view: &MarketView) -> Vec<OrderPlan> {
        Vec::new()
    }

    fn on_signal_update(&mut self, _tick: &SignalTick) -> Vec<OrderPlan> {
        Vec::new()
    }
}
