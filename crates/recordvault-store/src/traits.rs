//! Storage traits: content-addressed blobs and the transaction log.
//!
//! The vault is storage-agnostic. Implementations include SQLite (durable)
//! and in-memory (for tests). Neither is trusted: blob reads are re-hashed by
//! [`ContentStoreExt::get_verified`] and ledger reads are re-verified by the
//! access ledger.

use async_trait::async_trait;
use bytes::Bytes;
use recordvault_core::{ChainHead, ContentAddress, HashAlgorithm, RecordId, Transaction, TxId};

use crate::error::{Result, StoreError};

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Transaction was appended.
    Accepted,
    /// The exact same transaction is already in the log (idempotent).
    AlreadyExists,
    /// A different transaction already occupies this record position.
    Conflict {
        /// The transaction at this position.
        existing: TxId,
    },
}

/// Content-addressed blob storage.
///
/// `put` is idempotent: storing the same bytes twice returns the same
/// address and keeps one copy.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Hash function used to address new blobs.
    fn hash_algorithm(&self) -> HashAlgorithm;

    /// Store bytes and return their address.
    async fn put(&self, bytes: Bytes) -> Result<ContentAddress>;

    /// Fetch the bytes stored under an address.
    ///
    /// Returns `NotFound` if nothing is stored there.
    async fn get(&self, address: &ContentAddress) -> Result<Bytes>;
}

/// Totally ordered, signature-checked transaction log, partitioned by record.
///
/// # Design Notes
///
/// - **Validation**: transactions with a bad signature, payload hash or
///   structure are rejected with `StoreError::Validation`.
/// - **Idempotent submits**: submitting the same transaction twice returns
///   `AlreadyExists`.
/// - **Conflict detection**: a different transaction at an occupied
///   `(record_id, seq)` returns `Conflict` with the existing id.
/// - **No gaps**: a transaction must extend the record's current head.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Append a transaction to its record's log.
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult>;

    /// Transactions of a record with `seq > after_seq`, ordered by seq.
    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>>;

    /// All records with at least one transaction.
    async fn list_records(&self) -> Result<Vec<RecordId>>;

    /// Current head of a record's log.
    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>>;
}

/// Extension trait adding verification around [`ContentStore`].
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    /// Fetch and check that the bytes hash to the address.
    async fn get_verified(&self, address: &ContentAddress) -> Result<Bytes> {
        let bytes = self.get(address).await?;
        if !address.matches(&bytes) {
            return Err(StoreError::IntegrityViolation {
                expected: *address,
                actual: ContentAddress::compute(address.algorithm, &bytes),
            });
        }
        Ok(bytes)
    }

    /// Store and check that the returned address is the hash of the bytes.
    async fn put_verified(&self, bytes: Bytes) -> Result<ContentAddress> {
        let expected = ContentAddress::compute(self.hash_algorithm(), &bytes);
        let address = self.put(bytes).await?;
        if address != expected {
            return Err(StoreError::IntegrityViolation {
                expected,
                actual: address,
            });
        }
        Ok(address)
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}

/// Admission rules shared by the backends.
///
/// Returns `Some(result)` when the submit resolves without an append
/// (already present or conflicting), `None` when the transaction may be
/// appended at the record's head.
pub(crate) fn admit(
    tx: &Transaction,
    already_present: bool,
    at_position: Option<TxId>,
    head: Option<&ChainHead>,
) -> Result<Option<SubmitResult>> {
    recordvault_core::validate_transaction(tx)?;

    if already_present {
        return Ok(Some(SubmitResult::AlreadyExists));
    }
    if let Some(existing) = at_position {
        return Ok(Some(SubmitResult::Conflict { existing }));
    }

    ChainHead::check_extends(head, &tx.header)?;
    Ok(None)
}
