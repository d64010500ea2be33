//! Error types for the vault.
//!
//! Lower-level errors are mapped onto a small taxonomy. Integrity and
//! authorization failures keep their own variants so callers never mistake
//! them for transient storage trouble.

use recordvault_core::{GrantId, PrincipalId, RecordId, RequestId};
use recordvault_keys::KeyError;
use recordvault_ledger::LedgerError;
use recordvault_store::StoreError;
use thiserror::Error;

/// Errors that can occur during vault operations.
///
/// Messages never contain key material.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Ciphertext, a wrapped key or a stored blob failed authentication.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The operation lost a race or contradicts the record's log.
    #[error("ledger conflict on record {record_id}: {reason}")]
    LedgerConflict { record_id: RecordId, reason: String },

    /// Storage stayed unreachable after every retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("key wrap failure: {0}")]
    KeyWrapFailure(String),

    #[error("wrong recipient: {0}")]
    WrongRecipient(String),

    #[error("invalid reason for access request on record {0}: reason must not be empty")]
    InvalidReason(RecordId),

    /// The directory has no encryption key for this principal.
    #[error("unknown principal {0}")]
    UnknownPrincipal(PrincipalId),

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    #[error("grant {0} not found")]
    GrantNotFound(GrantId),

    /// A re-key task was cancelled before it committed.
    #[error("re-key of record {0} cancelled")]
    Cancelled(RecordId),

    #[error("configuration error: {0}")]
    Config(String),

    /// A key operation failed for a reason outside the taxonomy above.
    #[error("key error: {0}")]
    Key(KeyError),

    /// A storage operation failed permanently.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// A ledger operation failed for a reason outside the taxonomy above.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<KeyError> for VaultError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::IntegrityFailure { .. } => VaultError::IntegrityFailure(e.to_string()),
            KeyError::WrongRecipient { .. } => VaultError::WrongRecipient(e.to_string()),
            KeyError::KeyWrapFailure { .. } => VaultError::KeyWrapFailure(e.to_string()),
            other => VaultError::Key(other),
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            return VaultError::StorageUnavailable(e.to_string());
        }
        match e {
            StoreError::IntegrityViolation { .. } => VaultError::IntegrityFailure(e.to_string()),
            other => VaultError::Store(other),
        }
    }
}

impl From<LedgerError> for VaultError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotAuthorized { .. } => VaultError::NotAuthorized(e.to_string()),
            LedgerError::LedgerConflict { record_id, reason } => {
                VaultError::LedgerConflict { record_id, reason }
            }
            LedgerError::InvalidReason(record_id) => VaultError::InvalidReason(record_id),
            LedgerError::RecordNotFound(record_id) => VaultError::RecordNotFound(record_id),
            LedgerError::RequestNotFound { request_id, .. } => {
                VaultError::RequestNotFound(request_id)
            }
            LedgerError::GrantNotFound { grant_id, .. } => VaultError::GrantNotFound(grant_id),
            LedgerError::Verification { .. } => VaultError::IntegrityFailure(e.to_string()),
            LedgerError::Store(store) => store.into(),
            other => VaultError::Ledger(other),
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use recordvault_core::DataKeyId;

    #[test]
    fn test_key_errors_map_to_taxonomy() {
        let id = DataKeyId::from_bytes([0x01; 32]);
        assert!(matches!(
            VaultError::from(KeyError::IntegrityFailure { data_key_id: id }),
            VaultError::IntegrityFailure(_)
        ));
        assert!(matches!(
            VaultError::from(KeyError::WrongRecipient { data_key_id: id }),
            VaultError::WrongRecipient(_)
        ));
        assert!(matches!(
            VaultError::from(KeyError::UnknownDataKey(id)),
            VaultError::Key(_)
        ));
    }

    #[test]
    fn test_transient_store_errors_become_unavailable() {
        assert!(matches!(
            VaultError::from(StoreError::Unavailable("timed out".into())),
            VaultError::StorageUnavailable(_)
        ));
        assert!(matches!(
            VaultError::from(StoreError::NotFound("blake3:00".into())),
            VaultError::Store(_)
        ));
        let wrapped = LedgerError::Store(StoreError::Unavailable("timed out".into()));
        assert!(matches!(
            VaultError::from(wrapped),
            VaultError::StorageUnavailable(_)
        ));
    }

    #[test]
    fn test_messages_name_the_record() {
        let record_id = RecordId::from_bytes([0xab; 32]);
        let e = VaultError::from(LedgerError::LedgerConflict {
            record_id,
            reason: "request already Approved".into(),
        });
        assert!(e.to_string().contains(&record_id.to_string()));
    }
}
