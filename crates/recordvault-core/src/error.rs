//! Errors raised while encoding, decoding and checking ledger entries.

use thiserror::Error;

use crate::types::TxId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("signature does not verify under the signer's key")]
    InvalidSignature,

    #[error("signer key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("transaction format version {0} is not supported")]
    UnsupportedVersion(u8),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("invalid content address: {0}")]
    InvalidAddress(String),

    /// CBOR could not be parsed at all.
    #[error("cbor decoding failed: {0}")]
    DecodingError(String),
}

/// Why a transaction was refused.
///
/// Position errors carry what the log expected so a caller can tell a lost
/// race from a forged entry.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature check failed")]
    SignatureFailed,

    #[error("payload does not hash to the digest in the header")]
    PayloadHashMismatch,

    #[error("transaction format version {0} is not supported")]
    UnsupportedVersion(u8),

    #[error("out of order: log expects seq {expected}, transaction has {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("broken chain link: log expects prev {expected:?}, transaction has {got:?}")]
    InvalidPrevTransaction {
        expected: Option<TxId>,
        got: Option<TxId>,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => Self::SignatureFailed,
            CoreError::UnsupportedVersion(v) => Self::UnsupportedVersion(v),
            CoreError::MalformedTransaction(msg)
            | CoreError::InvalidAddress(msg)
            | CoreError::DecodingError(msg) => Self::StructuralError(msg),
        }
    }
}
