//! In-memory implementation of the storage traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use recordvault_core::{ChainHead, ContentAddress, HashAlgorithm, RecordId, Transaction, TxId};

use crate::error::{Result, StoreError};
use crate::traits::{admit, ContentStore, LedgerBackend, SubmitResult};

/// In-memory content store and ledger backend.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    algorithm: HashAlgorithm,
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Blobs indexed by address.
    blobs: HashMap<ContentAddress, Bytes>,

    /// Transactions indexed by id.
    transactions: HashMap<TxId, Transaction>,

    /// Per-record logs: tx ids in seq order (index = seq - 1).
    logs: BTreeMap<RecordId, Vec<TxId>>,
}

impl MemoryStore {
    /// Create a new empty store addressing blobs with BLAKE3.
    pub fn new() -> Self {
        Self::with_hash_algorithm(HashAlgorithm::default())
    }

    /// Create a new empty store addressing blobs with `algorithm`.
    pub fn with_hash_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.inner.read().map(|i| i.blobs.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn head(&self, record_id: &RecordId) -> Option<ChainHead> {
        let log = self.logs.get(record_id)?;
        let tx_id = *log.last()?;
        Some(ChainHead {
            seq: log.len() as u64,
            tx_id,
        })
    }

    fn at_position(&self, record_id: &RecordId, seq: u64) -> Option<TxId> {
        let index = usize::try_from(seq.checked_sub(1)?).ok()?;
        self.logs.get(record_id)?.get(index).copied()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    async fn put(&self, bytes: Bytes) -> Result<ContentAddress> {
        let address = ContentAddress::compute(self.algorithm, &bytes);
        self.write()?.blobs.entry(address).or_insert(bytes);
        Ok(address)
    }

    async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
        self.read()?
            .blobs
            .get(address)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(address.to_string()))
    }
}

#[async_trait]
impl LedgerBackend for MemoryStore {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult> {
        let tx_id = tx.compute_id();
        let mut inner = self.write()?;

        let record_id = *tx.record_id();
        let already_present = inner.transactions.contains_key(&tx_id);
        let at_position = inner.at_position(&record_id, tx.seq());
        let head = inner.head(&record_id);

        if let Some(result) = admit(tx, already_present, at_position, head.as_ref())? {
            return Ok(result);
        }

        inner.transactions.insert(tx_id, tx.clone());
        inner.logs.entry(record_id).or_default().push(tx_id);
        Ok(SubmitResult::Accepted)
    }

    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>> {
        let inner = self.read()?;
        let Some(log) = inner.logs.get(record_id) else {
            return Ok(Vec::new());
        };

        let skip = usize::try_from(after_seq).unwrap_or(usize::MAX);
        log.iter()
            .skip(skip)
            .map(|id| {
                inner
                    .transactions
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))
            })
            .collect()
    }

    async fn list_records(&self) -> Result<Vec<RecordId>> {
        Ok(self.read()?.logs.keys().copied().collect())
    }

    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        Ok(self.read()?.head(record_id))
    }
}
