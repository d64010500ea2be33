//! Error types for key management and envelope encryption.

use recordvault_core::DataKeyId;
use thiserror::Error;

/// Errors that can occur during key and envelope operations.
///
/// Messages name the data key involved and never include key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// AEAD authentication failed: ciphertext, nonce, tag or key id altered.
    #[error("integrity failure: sealed payload for data key {data_key_id} failed authentication")]
    IntegrityFailure { data_key_id: DataKeyId },

    /// The codec already used this nonce under this data key.
    #[error("nonce reuse: nonce already used with data key {data_key_id}")]
    NonceReuse { data_key_id: DataKeyId },

    /// A wrapped key did not open with the supplied secret.
    #[error("wrong recipient: wrapped key for data key {data_key_id} was not issued to this key pair")]
    WrongRecipient { data_key_id: DataKeyId },

    /// Wrapping a data key for a recipient failed.
    #[error("key wrap failure for data key {data_key_id}: {reason}")]
    KeyWrapFailure {
        data_key_id: DataKeyId,
        reason: String,
    },

    /// The manager has no record of this data key.
    #[error("unknown data key {0}")]
    UnknownDataKey(DataKeyId),

    /// The key was already rotated; rotation is allowed once per key.
    #[error("data key {data_key_id} already superseded by {superseded_by}")]
    AlreadySuperseded {
        data_key_id: DataKeyId,
        superseded_by: DataKeyId,
    },

    /// The key material was zeroized after rotation.
    #[error("data key {0} is retired")]
    KeyRetired(DataKeyId),

    /// Retiring a key that is still current.
    #[error("data key {0} is still current and cannot be retired")]
    NotSuperseded(DataKeyId),

    /// CBOR encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The key table lock was poisoned by a panicking thread.
    #[error("key table unavailable: lock poisoned")]
    Poisoned,
}

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, KeyError>;
