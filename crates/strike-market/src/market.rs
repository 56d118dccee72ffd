//! The `BinaryMarket` aggregate: authoritative local mirror of one market.
//!
//! Owns the order book, the price history window, and the fee schedule.
//! Mutated only by validated feed messages; destroyed at session end or
//! market resolution. Every successfully applied snapshot or delta invokes
//! the registered update handler synchronously with an immutable view of the
//! new book plus the current volatility estimate. The handler runs inline
//! with feed processing and must return promptly, handing off to queued work
//! if needed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use strike_common::{BookSide, FeeSchedule, MarketIdent, OrderBookLevel};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::book::{BookError, BookStatus, OrderBook};
use crate::feed::{DeltaMsg, SnapshotMsg};
use crate::window::PriceWindow;

/// Depth carried in update views.
const VIEW_DEPTH: usize = 5;

/// Errors raised when applying feed messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error(transparent)]
    Book(#[from] BookError),

    /// Market has resolved; no further messages apply.
    #[error("market {0} is resolved")]
    Resolved(String),
}

/// Lifecycle status of the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    /// Sequence invariant holds; trading against the mirror is safe.
    Active,
    /// A sequence gap was detected; deltas are rejected until a snapshot.
    Desynced,
    /// The market has resolved.
    Resolved,
}

/// Immutable view of the market handed to the update notification.
#[derive(Debug, Clone)]
pub struct MarketView {
    pub ticker: String,
    pub sequence: u64,
    pub best_bid: Option<OrderBookLevel>,
    pub best_ask: Option<OrderBookLevel>,
    pub bid_depth: Vec<OrderBookLevel>,
    pub ask_depth: Vec<OrderBookLevel>,
    pub mid_price: Decimal,
    pub spread: Option<Decimal>,
    pub volatility: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Handler invoked after every successfully applied feed message.
pub type UpdateHandler = Box<dyn FnMut(&MarketView) + Send>;

/// Market state machine for a single binary market.
pub struct BinaryMarket {
    ident: MarketIdent,
    fees: FeeSchedule,
    book: OrderBook,
    window: PriceWindow,
    resolved: bool,
    desyncs: u32,
    handler: Option<UpdateHandler>,
}

impl BinaryMarket {
    pub fn new(ident: MarketIdent, fees: FeeSchedule, volatility_horizon: Duration) -> Self {
        Self {
            ident,
            fees,
            book: OrderBook::new(),
            window: PriceWindow::new(volatility_horizon),
            resolved: false,
            desyncs: 0,
            handler: None,
        }
    }

    pub fn ident(&self) -> &MarketIdent {
        &self.ident
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    pub fn status(&self) -> MarketStatus {
        if self.resolved {
            MarketStatus::Resolved
        } else {
            match self.book.status() {
                BookStatus::Active => MarketStatus::Active,
                BookStatus::Desynced => MarketStatus::Desynced,
            }
        }
    }

    /// Consecutive desyncs observed this session. The session layer aborts
    /// when this exceeds its resnapshot budget.
    pub fn desync_count(&self) -> u32 {
        self.desyncs
    }

    /// Register the update notification handler.
    pub fn set_update_handler(&mut self, handler: UpdateHandler) {
        self.handler = Some(handler);
    }

    /// Replace the entire book from a snapshot and return to Active.
    ///
    /// Used at session start and after desync recovery. The price window is
    /// cleared: samples on either side of a resync are not contiguous.
    pub fn apply_snapshot(&mut self, msg: &SnapshotMsg) -> Result<(), MarketError> {
        self.check_open()?;
        self.book.apply_snapshot(&msg.bids, &msg.asks, msg.sequence)?;
        self.window.clear();

        info!(
            ticker = %self.ident.ticker,
            sequence = msg.sequence,
            bids = msg.bids.len(),
            asks = msg.asks.len(),
            "snapshot applied"
        );
        self.notify(msg.ts);
        Ok(())
    }

    /// Apply one delta in sequence, record the new mid price, and notify.
    ///
    /// A sequence gap leaves the book unmodified, desyncs the market, and is
    /// absorbed here: the caller requests a fresh snapshot rather than
    /// surfacing the condition to the strategy layer.
    pub fn apply_delta(&mut self, msg: &DeltaMsg) -> Result<(), MarketError> {
        self.check_open()?;
        if let Err(e) = self.book.apply_delta(&msg.changes, msg.sequence) {
            match &e {
                BookError::Sequence(seq) if seq.requires_resync() => {
                    self.desyncs += 1;
                    warn!(
                        ticker = %self.ident.ticker,
                        error = %seq,
                        desyncs = self.desyncs,
                        "sequence broken, market desynced"
                    );
                }
                _ => {
                    debug!(ticker = %self.ident.ticker, error = %e, "delta rejected");
                }
            }
            return Err(e.into());
        }

        self.window.push(msg.ts, self.book.mid_price());
        debug!(
            ticker = %self.ident.ticker,
            sequence = msg.sequence,
            changes = msg.changes.len(),
            mid = %self.book.mid_price(),
            "delta applied"
        );
        self.notify(msg.ts);
        Ok(())
    }

    /// Record an externally observed price tick into the history window.
    pub fn record_price_tick(&mut self, timestamp: DateTime<Utc>, price: Decimal) {
        self.window.push(timestamp, price);
    }

    /// Mark the market resolved; all further messages are rejected.
    pub fn resolve(&mut self) {
        self.resolved = true;
        info!(ticker = %self.ident.ticker, "market resolved");
    }

    /// Realized volatility over the price window, `None` without enough samples.
    pub fn volatility(&self) -> Option<f64> {
        self.window.realized_volatility()
    }

    pub fn best_bid(&self) -> Result<OrderBookLevel, BookError> {
        self.book.best_bid()
    }

    pub fn best_ask(&self) -> Result<OrderBookLevel, BookError> {
        self.book.best_ask()
    }

    pub fn depth_at(&self, side: BookSide, n: usize) -> Vec<OrderBookLevel> {
        self.book.depth_at(side, n)
    }

    pub fn mid_price(&self) -> Decimal {
        self.book.mid_price()
    }

    pub fn spread(&self) -> Option<Decimal> {
        self.book.spread()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.book.last_sequence()
    }

    /// Build the immutable view handed to update handlers.
    pub fn view(&self, timestamp: DateTime<Utc>) -> MarketView {
        MarketView {
            ticker: self.ident.ticker.clone(),
            sequence: self.book.last_sequence().unwrap_or(0),
            best_bid: self.book.best_bid().ok(),
            best_ask: self.book.best_ask().ok(),
            bid_depth: self.book.depth_at(BookSide::Bid, VIEW_DEPTH),
            ask_depth: self.book.depth_at(BookSide::Ask, VIEW_DEPTH),
            mid_price: self.book.mid_price(),
            spread: self.book.spread(),
            volatility: self.window.realized_volatility(),
            timestamp,
        }
    }

    fn check_open(&self) -> Result<(), MarketError> {
        if self.resolved {
            Err(MarketError::Resolved(self.ident.ticker.clone()))
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, timestamp: DateTime<Utc>) {
        if self.handler.is_some() {
            let view = self.view(timestamp);
            if let Some(handler) = self.handler.as_mut() {
                handler(&view);
            }
        }
    }
}

impl std::fmt::Debug for BinaryMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryMarket")
            .field("ident", &self.ident)
            .field("status", &self.status())
            .field("last_sequence", &self.book.last_sequence())
            .field("desyncs", &self.desyncs)
            .finish()
    }
}
