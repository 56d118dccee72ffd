//! Integration tests for the executor pipeline.
//!
//! These tests verify:
//! - Shrink-not-reject risk clamping on the live submit path
//! - Reservation release on rejection and cancel semantics
//! - Fill application through to the strategy hook
//! - Reconciliation overwrite, idempotency, and discrepancy counting
//! - Terminal-exit gating and flatten retries

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use async_trait::async_trait;
use strike_common::{FeeSchedule, Side};
use strike_engine::{
    AccountSnapshot, CancelAck, CancelOutcome, EngineEvent, ExchangeClient, ExchangeError,
    Executor, ExecutorConfig, FillEvent, FillReport, NullStrategy, OrderKind, OrderPlan,
    OrderRequest, RiskLimits, SignalTick, Strategy, SubmitAck, SubmitOutcome,
};
use strike_market::MarketView;
use tokio::sync::mpsc;

// =============================================================================
// TEST DOUBLES
// =============================================================================

/// Scriptable exchange: records every request, pops queued results.
struct MockExchange {
    submits: Mutex<Vec<OrderRequest>>,
    submit_results: Mutex<VecDeque<Result<SubmitAck, ExchangeError>>>,
    snapshots: Mutex<VecDeque<AccountSnapshot>>,
    cancels: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockExchange {
    fn new() -> Self {
        Self {
            submits: Mutex::new(Vec::new()),
            submit_results: Mutex::new(VecDeque::new()),
            snapshots: Mutex::new(VecDeque::new()),
            cancels: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn with_snapshots(snapshots: Vec<AccountSnapshot>) -> Self {
        let mock = Self::new();
        *mock.snapshots.lock().unwrap() = snapshots.into();
        mock
    }

    fn queue_submit_result(&self, result: Result<SubmitAck, ExchangeError>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    fn recorded_submits(&self) -> Vec<OrderRequest> {
        self.submits.lock().unwrap().clone()
    }
}

fn flat_snapshot(position: i64) -> AccountSnapshot {
    AccountSnapshot {
        position,
        balance: dec!(1000),
        open_orders: vec![],
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn submit(&self, order: &OrderRequest) -> Result<SubmitAck, ExchangeError> {
        self.submits.lock().unwrap().push(order.clone());
        if let Some(result) = self.submit_results.lock().unwrap().pop_front() {
            return result;
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitAck {
            exchange_id: format!("x{n}"),
        })
    }

    async fn cancel(&self, exchange_id: &str) -> Result<CancelAck, ExchangeError> {
        self.cancels.lock().unwrap().push(exchange_id.to_string());
        Ok(CancelAck::Cancelled)
    }

    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        // The last queued snapshot repeats; an empty queue means flat.
        match snapshots.len() {
            0 => Ok(flat_snapshot(0)),
            1 => Ok(snapshots.front().unwrap().clone()),
            _ => Ok(snapshots.pop_front().unwrap()),
        }
    }
}

/// Strategy that records the fills it is told about.
#[derive(Clone, Default)]
struct RecordingStrategy {
    fills: Arc<Mutex<Vec<FillReport>>>,
}

impl Strategy for RecordingStrategy {
    fn on_market_update(&mut self, _view: &MarketView) -> Vec<OrderPlan> {
        Vec::new()
    }

    fn on_signal_update(&mut self, _tick: &SignalTick) -> Vec<OrderPlan> {
        Vec::new()
    }

    fn on_fill(&mut self, fill: &FillReport) {
        self.fills.lock().unwrap().push(fill.clone());
    }
}

fn limits(max_position: i64) -> RiskLimits {
    RiskLimits {
        max_position,
        max_order_contracts: 50,
        max_notional: dec!(10000),
        terminal_exit: Utc::now() + Duration::hours(1),
    }
}

fn config(limits: RiskLimits) -> ExecutorConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ExecutorConfig {
        ticker: "BTC-100K-DEC".to_string(),
        limits,
        fees: FeeSchedule::default(),
        starting_balance: dec!(1000),
        minimum_balance: Decimal::ZERO,
        max_position_deviation: 100,
        max_balance_deviation: dec!(1000),
        flatten_retries: 3,
    }
}

fn fill(exchange_order_id: &str, price: Decimal, contracts: i64) -> FillEvent {
    FillEvent {
        exchange_order_id: exchange_order_id.to_string(),
        fill_price: price,
        fill_contracts: contracts,
        timestamp: Utc::now(),
    }
}

// =============================================================================
// RISK CLAMP ON THE SUBMIT PATH
// =============================================================================

#[tokio::test]
async fn test_clamp_shrinks_order_to_position_headroom() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(15)]));
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);
    executor.reconcile().await.unwrap();

    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    let submits = exchange.recorded_submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].contracts, 5);
    assert_eq!(submits[0].kind, OrderKind::Limit);
}

#[tokio::test]
async fn test_at_cap_buy_is_capped_to_zero() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(20)]));
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);
    executor.reconcile().await.unwrap();

    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 5)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::CappedToZero);
    assert!(exchange.recorded_submits().is_empty());
}

#[tokio::test]
async fn test_open_orders_count_against_headroom() {
    let exchange = Arc::new(MockExchange::new());
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);

    executor
        .submit_order(Side::Buy, dec!(0.50), 15)
        .await
        .unwrap();
    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    // 15 reserved, cap 20: second order shrinks to 5.
    let submits = exchange.recorded_submits();
    assert_eq!(submits[1].contracts, 5);
}

#[tokio::test]
async fn test_zero_price_submit_is_clamped_not_a_panic() {
    let exchange = Arc::new(MockExchange::new());
    let mut cfg = config(limits(20));
    cfg.limits.max_notional = dec!(10);
    let executor = Executor::new(cfg, exchange.clone(), NullStrategy);

    let outcome = executor
        .submit_order(Side::Buy, Decimal::ZERO, 5)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));

    // The dispatched price sits at the bottom of the tradeable range.
    let submits = exchange.recorded_submits();
    assert_eq!(submits[0].price, Some(dec!(0.01)));
}

// =============================================================================
// REJECTION AND CANCEL SEMANTICS
// =============================================================================

#[tokio::test]
async fn test_rejection_releases_reservation() {
    let exchange = Arc::new(MockExchange::new());
    exchange.queue_submit_result(Err(ExchangeError::Rejected {
        reason: "insufficient margin".to_string(),
    }));
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);

    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Rejected {
            reason: "insufficient margin".to_string()
        }
    );
    assert_eq!(executor.exposure().await.pending_buy, 0);

    // With the reservation released the full size is available again.
    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 20)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Submitted { .. }));
    assert_eq!(exchange.recorded_submits()[1].contracts, 20);
}

#[tokio::test]
async fn test_cancel_of_filled_order_is_a_noop() {
    let exchange = Arc::new(MockExchange::new());
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);

    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    let SubmitOutcome::Submitted { order_id } = outcome else {
        panic!("expected submit to succeed");
    };
    executor.on_fill(&fill("x1", dec!(0.50), 10)).await.unwrap();

    let cancel = executor.cancel_order(&order_id).await.unwrap();
    assert_eq!(cancel, CancelOutcome::AlreadyTerminal);
    assert!(exchange.cancels.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_open_order_releases_reservation() {
    let exchange = Arc::new(MockExchange::new());
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);

    let SubmitOutcome::Submitted { order_id } = executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap()
    else {
        panic!("expected submit to succeed");
    };

    let cancel = executor.cancel_order(&order_id).await.unwrap();
    assert_eq!(cancel, CancelOutcome::Cancelled);
    assert_eq!(executor.exposure().await.pending_buy, 0);
    assert_eq!(exchange.cancels.lock().unwrap().as_slice(), ["x1"]);
}

// =============================================================================
// FILLS
// =============================================================================

#[tokio::test]
async fn test_fill_updates_position_and_notifies_strategy() {
    let exchange = Arc::new(MockExchange::new());
    let strategy = RecordingStrategy::default();
    let fills = strategy.fills.clone();
    let executor = Executor::new(config(limits(20)), exchange, strategy);

    executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    executor.on_fill(&fill("x1", dec!(0.50), 10)).await.unwrap();

    let position = executor.position().await;
    assert_eq!(position.contracts, 10);
    assert_eq!(position.avg_cost, dec!(0.50));
    // Taker fee on 10 @ 0.50: ceil(100 * 0.07 * 10 * 0.25) / 100 = 0.18.
    assert_eq!(position.realized_pnl, dec!(-0.18));
    assert_eq!(executor.exposure().await.pending_buy, 0);

    let fills = fills.lock().unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].position_after, 10);
}

#[tokio::test]
async fn test_unknown_fill_is_parked_until_reconcile() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(5)]));
    let executor = Executor::new(config(limits(20)), exchange, NullStrategy);

    executor
        .on_fill(&fill("ghost", dec!(0.50), 5))
        .await
        .unwrap();
    assert_eq!(executor.position().await.contracts, 0);

    let report = executor.reconcile().await.unwrap();
    assert_eq!(report.unregistered_fills, 1);
    assert_eq!(executor.position().await.contracts, 5);
}

// =============================================================================
// RECONCILIATION
// =============================================================================

#[tokio::test]
async fn test_reconcile_is_idempotent_and_counts_once() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(7)]));
    let executor = Executor::new(config(limits(20)), exchange, NullStrategy);

    let first = executor.reconcile().await.unwrap();
    assert_eq!(first.position_drift, 7);
    assert!(first.diverged);
    assert_eq!(executor.position().await.contracts, 7);
    assert_eq!(executor.discrepancies().await, 1);

    let second = executor.reconcile().await.unwrap();
    assert_eq!(second.position_drift, 0);
    assert!(!second.diverged);
    assert_eq!(executor.discrepancies().await, 1);
}

#[tokio::test]
async fn test_reconcile_updates_balance() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![AccountSnapshot {
        position: 0,
        balance: dec!(850),
        open_orders: vec![],
    }]));
    let executor = Executor::new(config(limits(20)), exchange, NullStrategy);
    assert_eq!(executor.balance().await, dec!(1000));

    executor.reconcile().await.unwrap();
    assert_eq!(executor.balance().await, dec!(850));
}

#[tokio::test]
async fn test_reconcile_fails_below_minimum_balance() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![AccountSnapshot {
        position: 0,
        balance: dec!(5),
        open_orders: vec![],
    }]));
    let mut cfg = config(limits(20));
    cfg.minimum_balance = dec!(25);
    let executor = Executor::new(cfg, exchange, NullStrategy);

    assert!(executor.reconcile().await.is_err());
}

#[tokio::test]
async fn test_reconcile_fails_when_position_exceeds_cap() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(45)]));
    let executor = Executor::new(config(limits(20)), exchange, NullStrategy);

    assert!(executor.reconcile().await.is_err());
}

// =============================================================================
// TERMINAL EXIT AND FLATTEN
// =============================================================================

fn expired_limits(max_position: i64, max_order_contracts: i64) -> RiskLimits {
    RiskLimits {
        max_position,
        max_order_contracts,
        max_notional: dec!(10000),
        terminal_exit: Utc::now() - Duration::seconds(1),
    }
}

#[tokio::test]
async fn test_entries_blocked_after_terminal_exit() {
    let exchange = Arc::new(MockExchange::new());
    let executor = Executor::new(config(expired_limits(20, 50)), exchange.clone(), NullStrategy);

    let outcome = executor
        .submit_order(Side::Buy, dec!(0.50), 5)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::SessionExpired);
    assert!(exchange.recorded_submits().is_empty());
}

#[tokio::test]
async fn test_flatten_bypasses_per_order_cap() {
    // Long 40 with a per-order cap of 10: flatten still goes out whole.
    let exchange = Arc::new(MockExchange::with_snapshots(vec![
        flat_snapshot(40),
        flat_snapshot(0),
    ]));
    let executor = Executor::new(config(expired_limits(50, 10)), exchange.clone(), NullStrategy);

    executor.flatten().await.unwrap();

    let submits = exchange.recorded_submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].side, Side::Sell);
    assert_eq!(submits[0].contracts, 40);
    assert_eq!(submits[0].kind, OrderKind::Market);
    assert_eq!(submits[0].price, None);
}

#[tokio::test]
async fn test_flatten_cancels_resting_orders_first() {
    let exchange = Arc::new(MockExchange::new());
    let executor = Executor::new(config(limits(20)), exchange.clone(), NullStrategy);
    executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();

    executor.flatten().await.unwrap();
    assert_eq!(exchange.cancels.lock().unwrap().as_slice(), ["x1"]);
    assert_eq!(executor.open_order_count().await, 0);
}

#[tokio::test]
async fn test_flatten_exhaustion_is_fatal() {
    // Exchange keeps reporting a stuck position.
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(8)]));
    let mut cfg = config(expired_limits(20, 50));
    cfg.flatten_retries = 1;
    let executor = Executor::new(cfg, exchange, NullStrategy);

    let err = executor.flatten().await.unwrap_err();
    assert!(err.to_string().contains("residual position 8"));
}

// =============================================================================
// EVENT LOOP
// =============================================================================

#[tokio::test]
async fn test_run_flattens_at_deadline_without_events() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![
        flat_snapshot(5),
        flat_snapshot(0),
    ]));
    let mut cfg = config(limits(20));
    cfg.limits.terminal_exit = Utc::now() + Duration::milliseconds(100);
    let executor = Arc::new(Executor::new(cfg, exchange.clone(), NullStrategy));

    let (tx, rx) = mpsc::unbounded_channel::<EngineEvent>();
    let runner = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run(rx).await })
    };

    // No events arrive; the loop must still wake at the deadline and flatten.
    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    drop(tx);
    runner.await.unwrap().unwrap();

    assert_eq!(executor.position().await.contracts, 0);
    let submits = exchange.recorded_submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].side, Side::Sell);
    assert_eq!(submits[0].contracts, 5);
    assert_eq!(submits[0].kind, OrderKind::Market);
}

#[tokio::test]
async fn test_run_applies_events_in_order() {
    let exchange = Arc::new(MockExchange::with_snapshots(vec![flat_snapshot(10)]));
    let executor = Arc::new(Executor::new(config(limits(20)), exchange, NullStrategy));

    let (tx, rx) = mpsc::unbounded_channel();
    let runner = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run(rx).await })
    };

    executor
        .submit_order(Side::Buy, dec!(0.50), 10)
        .await
        .unwrap();
    tx.send(EngineEvent::Fill(fill("x1", dec!(0.50), 10))).unwrap();
    tx.send(EngineEvent::Reconcile).unwrap();
    drop(tx);

    runner.await.unwrap().unwrap();
    assert_eq!(executor.position().await.contracts, 10);
    // Exchange agreed with the local position: no discrepancy.
    assert_eq!(executor.discrepancies().await, 0);
}
