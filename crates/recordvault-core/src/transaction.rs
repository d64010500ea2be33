//! Transaction: one signed, immutable entry in a record's access ledger.
//!
//! Past entries are never edited. A change of state (a decision, a
//! revocation, a re-key) is a new transaction that supersedes the logical
//! state before it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_bytes, canonical_header_bytes};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Signer};
use crate::types::{RecordId, TxId};

/// The current transaction schema version.
pub const TX_VERSION: u8 = 0;

/// What a transaction does, determining how the payload is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Action {
    // Record lifecycle (0x0000 - 0x00FF)
    /// Creates a record. Always seq=1; the signer becomes the owner.
    RegisterRecord = 0x0001,

    // Access kinds (0x0100 - 0x01FF)
    /// A principal asks the owner for read access.
    RequestAccess = 0x0100,
    /// Owner approves a pending request and issues a grant.
    Approve = 0x0101,
    /// Owner denies a pending request.
    Deny = 0x0102,
    /// Owner revokes an active grant.
    Revoke = 0x0103,

    // Key kinds (0x0200 - 0x02FF)
    /// Owner commits a rotated key, new ciphertext and re-wrapped grants.
    Rekey = 0x0200,
}

impl Action {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::RegisterRecord),
            0x0100 => Some(Self::RequestAccess),
            0x0101 => Some(Self::Approve),
            0x0102 => Some(Self::Deny),
            0x0103 => Some(Self::Revoke),
            0x0200 => Some(Self::Rekey),
            _ => None,
        }
    }

    /// Whether only the record owner may author this action.
    pub fn is_owner_only(self) -> bool {
        matches!(
            self,
            Action::Approve | Action::Deny | Action::Revoke | Action::Rekey
        )
    }

    /// Short lowercase name, used in logs and the SQLite schema.
    pub fn name(self) -> &'static str {
        match self {
            Action::RegisterRecord => "register",
            Action::RequestAccess => "request",
            Action::Approve => "approve",
            Action::Deny => "deny",
            Action::Revoke => "revoke",
            Action::Rekey => "rekey",
        }
    }
}

/// The header of a transaction, containing all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// The record this transaction belongs to.
    pub record_id: RecordId,

    /// The signing principal.
    pub actor: Ed25519PublicKey,

    /// Position in the record's log (1-indexed, gapless).
    pub seq: u64,

    /// Actor-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp: i64,

    /// What this transaction does.
    pub action: Action,

    /// Id of the previous transaction for the record (None if seq=1).
    pub prev_tx_id: Option<TxId>,

    /// Blake3 hash of the payload bytes.
    pub payload_hash: Blake3Hash,
}

/// A complete transaction: header + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction header.
    pub header: TransactionHeader,

    /// CBOR-encoded action payload.
    pub payload: Bytes,

    /// Ed25519 signature over (canonical_header || payload).
    pub signature: Ed25519Signature,
}

impl Transaction {
    /// Compute the transaction ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> TxId {
        let bytes = canonical_bytes(self);
        TxId(Blake3Hash::hash(&bytes).0)
    }

    /// The signing principal.
    pub fn actor(&self) -> &Ed25519PublicKey {
        &self.header.actor
    }

    /// The record this transaction belongs to.
    pub fn record_id(&self) -> &RecordId {
        &self.header.record_id
    }

    /// Position in the record's log.
    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    /// The action.
    pub fn action(&self) -> Action {
        self.header.action
    }

    /// Actor-claimed timestamp.
    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }
}

/// Builder for creating transactions.
pub struct TransactionBuilder {
    record_id: RecordId,
    seq: u64,
    timestamp: i64,
    action: Action,
    prev_tx_id: Option<TxId>,
    payload: Bytes,
}

impl TransactionBuilder {
    /// Start building a transaction at `seq` in the record's log.
    pub fn new(record_id: RecordId, seq: u64) -> Self {
        Self {
            record_id,
            seq,
            timestamp: 0,
            action: Action::RequestAccess,
            prev_tx_id: None,
            payload: Bytes::new(),
        }
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the action.
    pub fn action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Set the previous transaction ID.
    pub fn prev(mut self, prev: TxId) -> Self {
        self.prev_tx_id = Some(prev);
        self
    }

    /// Set the payload.
    pub fn payload(mut self, p: impl Into<Bytes>) -> Self {
        self.payload = p.into();
        self
    }

    /// Build and sign the transaction. The signer becomes the actor.
    pub fn sign(self, signer: &dyn Signer) -> Transaction {
        let payload_hash = Blake3Hash::hash(&self.payload);

        let header = TransactionHeader {
            version: TX_VERSION,
            record_id: self.record_id,
            actor: signer.public_key(),
            seq: self.seq,
            timestamp: self.timestamp,
            action: self.action,
            prev_tx_id: self.prev_tx_id,
            payload_hash,
        };

        // Sign: canonical_header || payload
        let mut message = canonical_header_bytes(&header);
        message.extend_from_slice(&self.payload);
        let signature = signer.sign(&message);

        Transaction {
            header,
            payload: self.payload,
            signature,
        }
    }
}
