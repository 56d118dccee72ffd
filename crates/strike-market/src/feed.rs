//! Wire types for the exchange order-book feed.
//!
//! The feed delivers full snapshots and incremental deltas. Sequence numbers
//! are per-market monotonic integers anchored by the initiating snapshot; a
//! delta with `contracts` 0 removes the level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strike_common::{LevelChange, OrderBookLevel};

/// Full order-book snapshot message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMsg {
    pub sequence: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

/// Incremental order-book delta message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaMsg {
    pub sequence: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
    pub changes: Vec<LevelChange>,
}

/// A feed message, dispatched on its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    #[serde(rename = "orderbook_snapshot")]
    Snapshot(SnapshotMsg),
    #[serde(rename = "orderbook_delta")]
    Delta(DeltaMsg),
}

impl FeedMessage {
    pub fn sequence(&self) -> u64 {
        match self {
            FeedMessage::Snapshot(m) => m.sequence,
            FeedMessage::Delta(m) => m.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use strike_common::BookSide;

    #[test]
    fn test_snapshot_parsing() {
        let json = r#"{
            "type": "orderbook_snapshot",
            "sequence": 100,
            "ts": 1704067200000,
            "bids": [{"price": "0.45", "contracts": 100}],
            "asks": [{"price": "0.55", "contracts": 150}]
        }"#;

        let msg: FeedMessage = serde_json::from_str(json).unwrap();
        let FeedMessage::Snapshot(snap) = msg else {
            panic!("expected snapshot");
        };
        assert_eq!(snap.sequence, 100);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].price, dec!(0.45));
        assert_eq!(snap.asks[0].contracts, 150);
        assert_eq!(snap.ts.timestamp_millis(), 1704067200000);
    }

    #[test]
    fn test_delta_parsing() {
        let json = r#"{
            "type": "orderbook_delta",
            "sequence": 101,
            "ts": 1704067201000,
            "changes": [
                {"side": "bid", "price": "0.46", "contracts": 50},
                {"side": "ask", "price": "0.55", "contracts": 0}
            ]
        }"#;

        let msg: FeedMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sequence(), 101);
        let FeedMessage::Delta(delta) = msg else {
            panic!("expected delta");
        };
        assert_eq!(delta.changes.len(), 2);
        assert_eq!(delta.changes[0].side, BookSide::Bid);
        assert_eq!(delta.changes[1].contracts, 0);
    }
}
