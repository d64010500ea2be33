//! Transaction payloads for each ledger action.
//!
//! The payload is CBOR. Its shape is determined by the transaction's
//! [`Action`]; a payload that does not decode as its action's shape is
//! rejected.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use recordvault_core::{Action, ContentAddress, DataKeyId, GrantId, RequestId};
use recordvault_keys::WrappedKey;

use crate::error::{LedgerError, Result};

/// Descriptive metadata supplied by the owner on upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Original file name.
    pub file_name: String,
    /// MIME type of the plaintext.
    pub content_type: String,
}

/// Payload of a `RegisterRecord` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayload {
    /// Address of the sealed payload in the content store.
    pub content_address: ContentAddress,
    /// Key the payload is sealed under.
    pub data_key_id: DataKeyId,
    /// Plaintext size in bytes.
    pub size: u64,
    pub metadata: RecordMetadata,
    /// The data key wrapped for the owner, so custody survives a restart.
    pub owner_key: WrappedKey,
}

/// Payload of a `RequestAccess` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Why access is needed. Must not be blank.
    pub reason: String,
    /// Name the requester wants shown to the owner.
    pub display_name: Option<String>,
}

/// Payload of an `Approve` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePayload {
    pub request_id: RequestId,
    /// The record's data key wrapped for the requester.
    pub wrapped_key: WrappedKey,
}

/// Payload of a `Deny` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyPayload {
    pub request_id: RequestId,
}

/// Payload of a `Revoke` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokePayload {
    pub grant_id: GrantId,
    pub reason: Option<String>,
}

/// Payload of a `Rekey` transaction.
///
/// Commits a rotation in one entry: the new ciphertext, the new key, and a
/// freshly wrapped key for every grant still active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyPayload {
    /// The key being replaced. Must be the record's current key.
    pub previous_data_key_id: DataKeyId,
    pub data_key_id: DataKeyId,
    pub content_address: ContentAddress,
    pub size: u64,
    /// The new data key wrapped for the owner.
    pub owner_key: WrappedKey,
    /// Re-wrapped keys, one per active grant.
    pub rewrapped: Vec<(GrantId, WrappedKey)>,
}

/// A decoded payload, tagged by action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    Register(RegisterPayload),
    Request(RequestPayload),
    Approve(ApprovePayload),
    Deny(DenyPayload),
    Revoke(RevokePayload),
    Rekey(RekeyPayload),
}

impl ActionPayload {
    /// The action this payload belongs to.
    pub fn action(&self) -> Action {
        match self {
            ActionPayload::Register(_) => Action::RegisterRecord,
            ActionPayload::Request(_) => Action::RequestAccess,
            ActionPayload::Approve(_) => Action::Approve,
            ActionPayload::Deny(_) => Action::Deny,
            ActionPayload::Revoke(_) => Action::Revoke,
            ActionPayload::Rekey(_) => Action::Rekey,
        }
    }

    /// Encode to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ActionPayload::Register(p) => encode(p),
            ActionPayload::Request(p) => encode(p),
            ActionPayload::Approve(p) => encode(p),
            ActionPayload::Deny(p) => encode(p),
            ActionPayload::Revoke(p) => encode(p),
            ActionPayload::Rekey(p) => encode(p),
        }
    }

    /// Decode the payload of a transaction with the given action.
    pub fn decode(action: Action, bytes: &[u8]) -> Result<Self> {
        Ok(match action {
            Action::RegisterRecord => ActionPayload::Register(decode(bytes)?),
            Action::RequestAccess => ActionPayload::Request(decode(bytes)?),
            Action::Approve => ActionPayload::Approve(decode(bytes)?),
            Action::Deny => ActionPayload::Deny(decode(bytes)?),
            Action::Revoke => ActionPayload::Revoke(decode(bytes)?),
            Action::Rekey => ActionPayload::Rekey(decode(bytes)?),
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}
