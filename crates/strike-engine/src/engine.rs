//! The executor: the single serialization domain for all trading state.
//!
//! Market updates, signal ticks, fills, reconciliation, and operator order
//! entry all mutate one `EngineState` behind one async mutex, so no two
//! operations ever interleave partial updates of the position or the open
//! order set. The lock is held across exchange round-trips on purpose: an
//! in-flight submit must not race a reconcile.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use strike_common::{FeeSchedule, Side};
use strike_market::{BinaryMarket, MarketView};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::exchange::{
    AccountSnapshot, ExchangeClient, ExchangeError, FillEvent, OrderKind, OrderRequest,
};
use crate::ledger::{Ledger, OrderHandle, OrderId, Position, ReconcileReport};
use crate::risk::{clamp_order, ClampOutcome, Exposure, RiskLimits};
use crate::signal::SignalTick;
use crate::strategy::{OrderPlan, Strategy};

/// Fatal engine failures. Everything recoverable is an outcome, not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("balance {balance} below minimum {minimum}")]
    BalanceBelowMinimum { balance: Decimal, minimum: Decimal },
    #[error("position {position} exceeds cap {max_position} after reconcile")]
    PositionLimitExceeded { position: i64, max_position: i64 },
    #[error("flatten retries exhausted, residual position {residual}")]
    FlattenExhausted { residual: i64 },
}

/// What became of a submit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { order_id: OrderId },
    /// The risk clamp left no admissible size; nothing was sent.
    CappedToZero,
    /// Past terminal exit; entry orders are no longer accepted.
    SessionExpired,
    /// The exchange refused the order; the reservation was released.
    Rejected { reason: String },
}

/// What became of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The order had already reached a terminal state; nothing to do.
    AlreadyTerminal,
    UnknownOrder,
}

/// Events consumed by [`Executor::run`]. The queue is the alternative shape
/// of the serialization domain: one consumer, strictly ordered.
#[derive(Debug)]
pub enum EngineEvent {
    MarketUpdate(MarketView),
    Signal(SignalTick),
    Fill(FillEvent),
    Reconcile,
}

/// Session parameters the executor is constructed with. Immutable after
/// startup.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub ticker: String,
    pub limits: RiskLimits,
    pub fees: FeeSchedule,
    pub starting_balance: Decimal,
    /// Reconcile fails the session when the balance drops below this.
    pub minimum_balance: Decimal,
    /// Position drift beyond this is logged as a discrepancy.
    pub max_position_deviation: i64,
    /// Balance drift beyond this is logged as a discrepancy.
    pub max_balance_deviation: Decimal,
    /// Flatten attempts before giving up with a residual position.
    pub flatten_retries: u32,
}

struct EngineState<S> {
    ledger: Ledger,
    strategy: S,
    balance: Decimal,
    discrepancies: u64,
    flatten_started: bool,
}

/// Risk-bounded order executor for one binary market.
pub struct Executor<S: Strategy> {
    config: ExecutorConfig,
    exchange: Arc<dyn ExchangeClient>,
    state: Mutex<EngineState<S>>,
}

impl<S: Strategy> Executor<S> {
    pub fn new(config: ExecutorConfig, exchange: Arc<dyn ExchangeClient>, strategy: S) -> Self {
        let balance = config.starting_balance;
        Self {
            config,
            exchange,
            state: Mutex::new(EngineState {
                ledger: Ledger::new(),
                strategy,
                balance,
                discrepancies: 0,
                flatten_started: false,
            }),
        }
    }

    /// Feed a consistent order-book update to the strategy and execute
    /// whatever it plans.
    pub async fn on_market_update(&self, view: &MarketView) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let plans = state.strategy.on_market_update(view);
        self.execute_plans(&mut state, plans).await
    }

    /// Feed an external signal tick to the strategy and execute its plans.
    pub async fn on_signal_update(&self, tick: &SignalTick) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let plans = state.strategy.on_signal_update(tick);
        self.execute_plans(&mut state, plans).await
    }

    /// Apply an exchange-reported fill to the ledger.
    pub async fn on_fill(&self, event: &FillEvent) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        // Maker/taker attribution is not known at fill time; charge the
        // conservative taker rate and let reconcile true up the balance.
        let fee = self
            .config
            .fees
            .taker_fee(event.fill_price, event.fill_contracts);
        if let Some(report) = state.ledger.apply_fill(event, fee) {
            info!(
                order_id = %report.order_id,
                side = %report.side,
                price = %report.price,
                contracts = report.contracts,
                position = report.position_after,
                realized_pnl = %report.realized_pnl,
                "fill applied"
            );
            state.strategy.on_fill(&report);
        }
        Ok(())
    }

    /// Submit a limit entry order through the risk clamp.
    pub async fn submit_order(
        &self,
        side: Side,
        price: Decimal,
        contracts: i64,
    ) -> Result<SubmitOutcome, EngineError> {
        let mut state = self.state.lock().await;
        self.dispatch(&mut state, &OrderPlan::entry(side, price, contracts))
            .await
    }

    /// Cancel a tracked order. Terminal orders are a no-op.
    pub async fn cancel_order(&self, id: &OrderId) -> Result<CancelOutcome, EngineError> {
        let mut state = self.state.lock().await;
        let exchange_id = match state.ledger.order(id) {
            None => return Ok(CancelOutcome::UnknownOrder),
            Some(order) if order.state.is_terminal() => {
                return Ok(CancelOutcome::AlreadyTerminal)
            }
            Some(order) => order.exchange_id.clone(),
        };
        if let Some(xid) = exchange_id {
            match self.exchange.cancel(&xid).await {
                // An exchange-side noop means the order is already gone;
                // reconcile will settle any fill we have not seen yet.
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }
        state.ledger.mark_cancelled(id);
        info!(order_id = %id, "order cancelled");
        Ok(CancelOutcome::Cancelled)
    }

    /// Pull exchange truth and overwrite local state where it diverges.
    ///
    /// Idempotent against an unchanged snapshot. Fails the session when the
    /// balance is below the configured minimum or the position exceeds the
    /// cap even after the overwrite.
    pub async fn reconcile(&self) -> Result<ReconcileReport, EngineError> {
        let mut state = self.state.lock().await;
        let snapshot = self.exchange.account_snapshot().await?;
        let report = self.absorb_snapshot(&mut state, &snapshot);

        let balance = state.balance;
        if balance < self.config.minimum_balance {
            return Err(EngineError::BalanceBelowMinimum {
                balance,
                minimum: self.config.minimum_balance,
            });
        }
        let position = state.ledger.position().contracts;
        if position.abs() > self.config.limits.max_position {
            return Err(EngineError::PositionLimitExceeded {
                position,
                max_position: self.config.limits.max_position,
            });
        }
        Ok(report)
    }

    /// Cancel everything, resync, and market-out the residual position,
    /// retrying up to the configured bound.
    pub async fn flatten(&self) -> Result<(), EngineError> {
        let mut residual = 0;
        for attempt in 0..=self.config.flatten_retries {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            }
            let mut state = self.state.lock().await;
            state.flatten_started = true;

            let resting: Vec<(OrderId, Option<String>)> = state
                .ledger
                .open_orders()
                .map(|o| (o.id, o.exchange_id.clone()))
                .collect();
            for (id, exchange_id) in resting {
                if let Some(xid) = exchange_id {
                    match self.exchange.cancel(&xid).await {
                        Ok(_) => state.ledger.mark_cancelled(&id),
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => {
                            warn!(order_id = %id, error = %e, "cancel failed during flatten")
                        }
                    }
                } else {
                    state.ledger.mark_cancelled(&id);
                }
            }

            let snapshot = match self.exchange.account_snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(attempt, error = %e, "resync failed during flatten");
                    continue;
                }
            };
            self.absorb_snapshot(&mut state, &snapshot);

            residual = state.ledger.position().contracts;
            if residual == 0 {
                info!(attempt, "position flat");
                return Ok(());
            }

            let side = if residual > 0 { Side::Sell } else { Side::Buy };
            let plan = OrderPlan::flatten(side, residual.abs());
            match self.dispatch(&mut state, &plan).await? {
                SubmitOutcome::Submitted { order_id } => {
                    info!(attempt, %order_id, residual, "flatten order submitted")
                }
                outcome => warn!(attempt, ?outcome, residual, "flatten order not placed"),
            }
        }
        Err(EngineError::FlattenExhausted { residual })
    }

    /// Single-consumer event loop. Flattens once when terminal exit passes,
    /// even on a quiet queue, and keeps applying fills and reconciles
    /// afterwards.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<EngineEvent>) -> Result<(), EngineError> {
        loop {
            let now = Utc::now();
            if self.config.limits.expired(now) {
                let already = {
                    let mut state = self.state.lock().await;
                    std::mem::replace(&mut state.flatten_started, true)
                };
                if !already {
                    info!("terminal exit reached, flattening");
                    self.flatten().await?;
                }
            }
            let event = if self.config.limits.expired(now) {
                rx.recv().await
            } else {
                // Wake at the deadline so flattening is not deferred until
                // the next event arrives.
                let until_exit = (self.config.limits.terminal_exit - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::select! {
                    event = rx.recv() => event,
                    _ = tokio::time::sleep(until_exit) => continue,
                }
            };
            match event {
                Some(EngineEvent::MarketUpdate(view)) => self.on_market_update(&view).await?,
                Some(EngineEvent::Signal(tick)) => self.on_signal_update(&tick).await?,
                Some(EngineEvent::Fill(fill)) => self.on_fill(&fill).await?,
                Some(EngineEvent::Reconcile) => {
                    self.reconcile().await?;
                }
                None => break,
            }
        }
        Ok(())
    }

    pub async fn position(&self) -> Position {
        self.state.lock().await.ledger.position().clone()
    }

    pub async fn exposure(&self) -> Exposure {
        self.state.lock().await.ledger.exposure()
    }

    pub async fn balance(&self) -> Decimal {
        self.state.lock().await.balance
    }

    pub async fn discrepancies(&self) -> u64 {
        self.state.lock().await.discrepancies
    }

    pub async fn open_order_count(&self) -> usize {
        self.state.lock().await.ledger.open_orders().count()
    }

    async fn execute_plans(
        &self,
        state: &mut EngineState<S>,
        plans: Vec<OrderPlan>,
    ) -> Result<(), EngineError> {
        for plan in plans {
            let outcome = self.dispatch(state, &plan).await?;
            debug!(side = %plan.side, contracts = plan.contracts, ?outcome, "plan dispatched");
        }
        Ok(())
    }

    /// Submit pipeline: expiry gate, risk clamp, optimistic reservation,
    /// exchange dispatch, ack or release.
    async fn dispatch(
        &self,
        state: &mut EngineState<S>,
        plan: &OrderPlan,
    ) -> Result<SubmitOutcome, EngineError> {
        if !plan.flatten && self.config.limits.expired(Utc::now()) {
            debug!(side = %plan.side, contracts = plan.contracts, "entry after terminal exit, dropped");
            return Ok(SubmitOutcome::SessionExpired);
        }

        // Limit prices go into the tradeable range before any fee or
        // notional math sees them.
        let price = plan.price.map(strike_common::clamp_price);
        let exposure = state.ledger.exposure();
        let clamp = clamp_order(
            &self.config.limits,
            &self.config.fees,
            plan.side,
            price,
            plan.contracts,
            &exposure,
            plan.flatten,
        );
        match clamp.outcome {
            ClampOutcome::Zero => {
                info!(
                    side = %plan.side,
                    requested = plan.contracts,
                    position = exposure.position,
                    "risk clamp left no size, order dropped"
                );
                return Ok(SubmitOutcome::CappedToZero);
            }
            ClampOutcome::Reduced { requested } => {
                info!(
                    side = %plan.side,
                    requested,
                    granted = clamp.contracts,
                    "risk clamp reduced order"
                );
            }
            ClampOutcome::Full => {}
        }

        let handle = OrderHandle::new(plan.side, price, clamp.contracts);
        let id = handle.id;
        let request = OrderRequest {
            client_id: id,
            ticker: self.config.ticker.clone(),
            side: plan.side,
            price,
            contracts: clamp.contracts,
            kind: if plan.price.is_some() {
                OrderKind::Limit
            } else {
                OrderKind::Market
            },
        };
        state.ledger.insert(handle);

        match self.exchange.submit(&request).await {
            Ok(ack) => {
                state.ledger.mark_acked(&id, ack.exchange_id.clone());
                info!(
                    order_id = %id,
                    exchange_id = %ack.exchange_id,
                    side = %plan.side,
                    contracts = clamp.contracts,
                    "order acked"
                );
                Ok(SubmitOutcome::Submitted { order_id: id })
            }
            Err(ExchangeError::Rejected { reason }) => {
                state.ledger.mark_rejected(&id);
                warn!(order_id = %id, %reason, "order rejected");
                Ok(SubmitOutcome::Rejected { reason })
            }
            Err(e) if e.is_fatal() => {
                state.ledger.mark_rejected(&id);
                Err(e.into())
            }
            Err(e) => {
                // Transport-level failure: release the reservation and let
                // the next reconcile settle whether the order landed.
                state.ledger.mark_rejected(&id);
                warn!(order_id = %id, error = %e, "submit failed, reservation released");
                Ok(SubmitOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn absorb_snapshot(
        &self,
        state: &mut EngineState<S>,
        snapshot: &AccountSnapshot,
    ) -> ReconcileReport {
        let balance_drift = snapshot.balance - state.balance;
        let report = state.ledger.overwrite(snapshot);

        if report.position_drift.abs() > self.config.max_position_deviation {
            warn!(
                drift = report.position_drift,
                tolerance = self.config.max_position_deviation,
                "position drift beyond tolerance"
            );
        }
        if balance_drift.abs() > self.config.max_balance_deviation {
            warn!(
                drift = %balance_drift,
                tolerance = %self.config.max_balance_deviation,
                "balance drift beyond tolerance"
            );
        }
        state.balance = snapshot.balance;

        if report.diverged {
            state.discrepancies += 1;
            warn!(
                position_drift = report.position_drift,
                orders_adopted = report.orders_adopted,
                orders_dropped = report.orders_dropped,
                unregistered_fills = report.unregistered_fills,
                "reconcile corrected local state"
            );
        } else {
            debug!("reconcile clean");
        }
        report
    }
}

/// Wire a market's update notifications into an engine event queue.
///
/// The handler only enqueues; it never blocks feed processing on the
/// engine lock.
pub fn forward_market_updates(market: &mut BinaryMarket, tx: mpsc::UnboundedSender<EngineEvent>) {
    market.set_update_handler(Box::new(move |view: &MarketView| {
        let _ = tx.send(EngineEvent::MarketUpdate(view.clone()));
    }));
}
