//! Chain heads: the ordering rule for a record's transaction log.
//!
//! Each record has its own log. Entries are numbered 1, 2, 3, ... with no gaps
//! and every entry after the first names its predecessor by id. A writer that
//! raced another writer to the same position is detected here.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::transaction::TransactionHeader;
use crate::types::TxId;

/// The last accepted position in a record's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Sequence number of the head transaction.
    pub seq: u64,
    /// Id of the head transaction.
    pub tx_id: TxId,
}

impl ChainHead {
    /// Sequence number the next transaction must carry.
    pub fn next_seq(head: Option<&ChainHead>) -> u64 {
        head.map(|h| h.seq + 1).unwrap_or(1)
    }

    /// Previous-id the next transaction must carry.
    pub fn next_prev(head: Option<&ChainHead>) -> Option<TxId> {
        head.map(|h| h.tx_id)
    }

    /// Check that `header` extends `head` directly.
    pub fn check_extends(
        head: Option<&ChainHead>,
        header: &TransactionHeader,
    ) -> Result<(), ValidationError> {
        let expected = Self::next_seq(head);
        if header.seq != expected {
            return Err(ValidationError::InvalidSequence {
                expected,
                got: header.seq,
            });
        }

        let expected_prev = Self::next_prev(head);
        if header.prev_tx_id != expected_prev {
            return Err(ValidationError::InvalidPrevTransaction {
                expected: expected_prev,
                got: header.prev_tx_id,
            });
        }

        Ok(())
    }
}
