//! Execution engine for a single binary market.
//!
//! The engine owns risk clamping, position accounting, exchange
//! reconciliation, and terminal-exit flattening. Trading logic is injected
//! through the [`Strategy`] trait; exchange access through
//! [`ExchangeClient`]. All state mutation is serialized through the
//! [`Executor`].

pub mod config;
pub mod engine;
pub mod exchange;
pub mod ledger;
pub mod risk;
pub mod signal;
pub mod strategy;

pub use config::SessionConfig;
pub use engine::{
    forward_market_updates, CancelOutcome, EngineError, EngineEvent, Executor, ExecutorConfig,
    SubmitOutcome,
};
pub use exchange::{
    AccountSnapshot, CancelAck, ExchangeClient, ExchangeError, FillEvent, OrderKind, OrderRequest,
    RestingOrder, SubmitAck,
};
pub use ledger::{FillReport, Ledger, OrderHandle, OrderId, OrderState, Position, ReconcileReport};
pub use risk::{clamp_order, Clamp, ClampOutcome, Exposure, RiskLimits};
pub use signal::{SignalKind, SignalTick};
pub use strategy::{NullStrategy, OrderPlan, Strategy};
