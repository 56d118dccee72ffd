//! Order book state for a single binary market.
//!
//! Levels are stored per side in price-ordered maps: bids are read descending
//! by price, asks ascending. The book is only valid after a snapshot has
//! anchored the sequence; deltas apply strictly in sequence order and any gap
//! desyncs the book until the next snapshot.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use strike_common::{BookSide, LevelChange, OrderBookLevel};
use thiserror::Error;

use crate::sequence::{self, SequenceError};

/// Errors raised by book mutation and queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Book is desynced; deltas are rejected until a snapshot arrives.
    #[error("book is desynced, awaiting snapshot")]
    Desynced,

    /// Snapshot would produce a crossed book.
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    Crossed { bid: Decimal, ask: Decimal },

    /// Requested side has no levels.
    #[error("{0} side of the book is empty")]
    EmptySide(BookSide),
}

/// Consistency status of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookStatus {
    /// Sequence invariant holds; deltas may apply.
    #[default]
    Active,
    /// Sequence invariant broken; only a snapshot recovers.
    Desynced,
}

/// Priced level storage for one market, bids and asks.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, i64>,
    asks: BTreeMap<Decimal, i64>,
    last_sequence: Option<u64>,
    status: BookStatus,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the most recently applied message.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn status(&self) -> BookStatus {
        self.status
    }

    /// Replace the entire book atomically from a snapshot.
    ///
    /// Re-anchors the sequence and clears a desynced status. A snapshot that
    /// would cross the book is rejected and the existing state is untouched.
    pub fn apply_snapshot(
        &mut self,
        bids: &[OrderBookLevel],
        asks: &[OrderBookLevel],
        sequence: u64,
    ) -> Result<(), BookError> {
        let new_bids: BTreeMap<Decimal, i64> = bids
            .iter()
            .filter(|l| l.contracts > 0)
            .map(|l| (l.price, l.contracts))
            .collect();
        let new_asks: BTreeMap<Decimal, i64> = asks
            .iter()
            .filter(|l| l.contracts > 0)
            .map(|l| (l.price, l.contracts))
            .collect();

        if let (Some((&bid, _)), Some((&ask, _))) =
            (new_bids.iter().next_back(), new_asks.iter().next())
        {
            if bid >= ask {
                return Err(BookError::Crossed { bid, ask });
            }
        }

        self.bids = new_bids;
        self.asks = new_asks;
        self.last_sequence = Some(sequence);
        self.status = BookStatus::Active;
        Ok(())
    }

    /// Apply one delta message as a single atomic step.
    ///
    /// Zero contracts removes the level, nonzero inserts or replaces it.
    /// Fails without modifying the book when the sequence invariant is
    /// violated; a gap additionally desyncs the book.
    pub fn apply_delta(&mut self, changes: &[LevelChange], sequence: u64) -> Result<(), BookError> {
        if self.status == BookStatus::Desynced {
            return Err(BookError::Desynced);
        }

        if let Err(e) = sequence::validate_delta(self.last_sequence, sequence) {
            if e.requires_resync() {
                self.status = BookStatus::Desynced;
            }
            return Err(e.into());
        }

        for change in changes {
            let side = match change.side {
                BookSide::Bid => &mut self.bids,
                BookSide::Ask => &mut self.asks,
            };
            if change.contracts <= 0 {
                side.remove(&change.price);
            } else {
                side.insert(change.price, change.contracts);
            }
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Best (highest) bid level.
    pub fn best_bid(&self) -> Result<OrderBookLevel, BookError> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, c)| OrderBookLevel::new(*p, *c))
            .ok_or(BookError::EmptySide(BookSide::Bid))
    }

    /// Best (lowest) ask level.
    pub fn best_ask(&self) -> Result<OrderBookLevel, BookError> {
        self.asks
            .iter()
            .next()
            .map(|(p, c)| OrderBookLevel::new(*p, *c))
            .ok_or(BookError::EmptySide(BookSide::Ask))
    }

    /// Top `n` levels of one side, best first.
    ///
    /// Unlike `best_bid`/`best_ask`, an empty side is not an error here: it
    /// yields an empty vector, since depth is consumed by view construction
    /// where partial or missing depth is meaningful.
    pub fn depth_at(&self, side: BookSide, n: usize) -> Vec<OrderBookLevel> {
        match side {
            BookSide::Bid => self
                .bids
                .iter()
                .rev()
                .take(n)
                .map(|(p, c)| OrderBookLevel::new(*p, *c))
                .collect(),
            BookSide::Ask => self
                .asks
                .iter()
                .take(n)
                .map(|(p, c)| OrderBookLevel::new(*p, *c))
                .collect(),
        }
    }

    /// Mid price with one-sided fallback.
    ///
    /// Both sides present: midpoint. One side: that side's best. Neither:
    /// 0.50, the uninformative prior for a binary contract.
    pub fn mid_price(&self) -> Decimal {
        match (self.best_bid().ok(), self.best_ask().ok()) {
            (Some(bid), Some(ask)) => (bid.price + ask.price) / Decimal::TWO,
            (None, Some(ask)) => ask.price,
            (Some(bid), None) => bid.price,
            (None, None) => Decimal::new(50, 2),
        }
    }

    /// Best bid-ask spread; `None` unless both sides are populated.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid().ok(), self.best_ask().ok()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
