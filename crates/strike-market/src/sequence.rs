//! Sequence-number validation for feed messages.
//!
//! Feed sequence numbers are per-market monotonic integers anchored by the
//! initiating snapshot. A delta is valid only when its sequence is exactly
//! one past the last applied message.

use thiserror::Error;

/// Violations of the sequence invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Delta arrived before any snapshot anchored the sequence.
    #[error("delta {got} received before an anchoring snapshot")]
    Unanchored { got: u64 },

    /// Sequence jumped past the expected value; messages were lost.
    #[error("sequence gap: expected {expected}, got {got}")]
    Gap { expected: u64, got: u64 },

    /// Sequence at or behind the last applied message; already seen.
    #[error("sequence replay: last applied {last}, got {got}")]
    Replay { last: u64, got: u64 },
}

impl SequenceError {
    /// Gaps (and missing anchors) require a fresh snapshot to recover.
    /// Replays do not; the message is simply dropped.
    pub fn requires_resync(&self) -> bool {
        matches!(self, SequenceError::Gap { .. } | SequenceError::Unanchored { .. })
    }
}

/// Validate a delta sequence number against the last applied one.
pub fn validate_delta(last: Option<u64>, incoming: u64) -> Result<(), SequenceError> {
    match last {
        None => Err(SequenceError::Unanchored { got: incoming }),
        Some(last) if incoming == last + 1 => Ok(()),
        Some(last) if incoming <= last => Err(SequenceError::Replay { last, got: incoming }),
        Some(last) => Err(SequenceError::Gap {
            expected: last + 1,
            got: incoming,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_accepted() {
        assert!(validate_delta(Some(100), 101).is_ok());
    }

    #[test]
    fn test_gap_rejected() {
        assert_eq!(
            validate_delta(Some(100), 103),
            Err(SequenceError::Gap {
                expected: 101,
                got: 103
            })
        );
    }

    #[test]
    fn test_replay_rejected() {
        assert_eq!(
            validate_delta(Some(100), 100),
            Err(SequenceError::Replay { last: 100, got: 100 })
        );
        assert_eq!(
            validate_delta(Some(100), 95),
            Err(SequenceError::Replay { last: 100, got: 95 })
        );
    }

    #[test]
    fn test_unanchored_rejected() {
        assert_eq!(
            validate_delta(None, 5),
            Err(SequenceError::Unanchored { got: 5 })
        );
    }

    #[test]
    fn test_resync_required() {
        assert!(SequenceError::Gap { expected: 101, got: 103 }.requires_resync());
        assert!(SequenceError::Unanchored { got: 5 }.requires_resync());
        assert!(!SequenceError::Replay { last: 100, got: 100 }.requires_resync());
    }
}
