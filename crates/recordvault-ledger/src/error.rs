//! Error types for the access ledger.

use recordvault_core::{GrantId, PrincipalId, RecordId, RequestId, ValidationError};
use recordvault_store::StoreError;
use thiserror::Error;

/// Errors that can occur while reading or appending ledger entries.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The signer may not author this action on this record.
    #[error("not authorized: {actor} may not {action} on record {record_id}")]
    NotAuthorized {
        record_id: RecordId,
        actor: PrincipalId,
        action: &'static str,
    },

    /// The entry contradicts the record's current state or log position.
    #[error("ledger conflict on record {record_id}: {reason}")]
    LedgerConflict { record_id: RecordId, reason: String },

    /// An access request was made without a reason.
    #[error("invalid reason for access request on record {0}: reason must not be empty")]
    InvalidReason(RecordId),

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("request {request_id} not found on record {record_id}")]
    RequestNotFound {
        record_id: RecordId,
        request_id: RequestId,
    },

    #[error("grant {grant_id} not found on record {record_id}")]
    GrantNotFound {
        record_id: RecordId,
        grant_id: GrantId,
    },

    /// The payload is well-formed but inconsistent with the record.
    #[error("invalid payload on record {record_id}: {reason}")]
    InvalidPayload { record_id: RecordId, reason: String },

    /// A transaction read back from the backend failed verification.
    #[error("verification failed for record {record_id} at seq {seq}: {source}")]
    Verification {
        record_id: RecordId,
        seq: u64,
        source: ValidationError,
    },

    /// Payload CBOR could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The cached state lock was poisoned.
    #[error("ledger state unavailable: lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
