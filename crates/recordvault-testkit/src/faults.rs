//! Fault-injecting store wrappers.
//!
//! Both wrappers delegate to an inner store and implement whichever of
//! [`ContentStore`] and [`LedgerBackend`] the inner store does.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use recordvault_core::{ChainHead, ContentAddress, HashAlgorithm, RecordId, Transaction};
use recordvault_store::{ContentStore, LedgerBackend, Result, StoreError, SubmitResult};

/// Fails a configurable number of upcoming calls with a transient error.
pub struct FlakyStore<S: ?Sized> {
    inner: Arc<S>,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl<S: ?Sized> FlakyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    /// Make the next `n` calls fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Total calls seen, failed or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn inject(&self, op: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for FlakyStore<S> {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.inner.hash_algorithm()
    }

    async fn put(&self, bytes: Bytes) -> Result<ContentAddress> {
        self.inject("put")?;
        self.inner.put(bytes).await
    }

    async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
        self.inject("get")?;
        self.inner.get(address).await
    }
}

#[async_trait]
impl<S: LedgerBackend + ?Sized> LedgerBackend for FlakyStore<S> {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult> {
        self.inject("submit_transaction")?;
        self.inner.submit_transaction(tx).await
    }

    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>> {
        self.inject("read_transactions")?;
        self.inner.read_transactions(record_id, after_seq).await
    }

    async fn list_records(&self) -> Result<Vec<RecordId>> {
        self.inject("list_records")?;
        self.inner.list_records().await
    }

    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        self.inject("head")?;
        self.inner.head(record_id).await
    }
}

/// Flips a bit in every blob it returns while tampering is switched on.
///
/// Ledger calls pass through untouched.
pub struct TamperingStore<S: ?Sized> {
    inner: Arc<S>,
    tampering: AtomicBool,
    /// Byte offset of the flipped bit, counted from the end of the blob.
    offset_from_end: usize,
}

impl<S: ?Sized> TamperingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            tampering: AtomicBool::new(false),
            offset_from_end: 1,
        }
    }

    /// Flip the bit this many bytes before the end instead of the last byte.
    pub fn with_offset_from_end(mut self, offset: usize) -> Self {
        self.offset_from_end = offset.max(1);
        self
    }

    pub fn set_tampering(&self, on: bool) {
        self.tampering.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for TamperingStore<S> {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.inner.hash_algorithm()
    }

    async fn put(&self, bytes: Bytes) -> Result<ContentAddress> {
        self.inner.put(bytes).await
    }

    async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
        let bytes = self.inner.get(address).await?;
        if !self.tampering.load(Ordering::SeqCst) || bytes.len() < self.offset_from_end {
            return Ok(bytes);
        }
        let mut tampered = bytes.to_vec();
        let at = tampered.len() - self.offset_from_end;
        tampered[at] ^= 0x01;
        Ok(Bytes::from(tampered))
    }
}

#[async_trait]
impl<S: LedgerBackend + ?Sized> LedgerBackend for TamperingStore<S> {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult> {
        self.inner.submit_transaction(tx).await
    }

    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>> {
        self.inner.read_transactions(record_id, after_seq).await
    }

    async fn list_records(&self) -> Result<Vec<RecordId>> {
        self.inner.list_records().await
    }

    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        self.inner.head(record_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordvault_store::{ContentStoreExt, MemoryStore};

    #[tokio::test]
    async fn test_flaky_store_fails_then_recovers() {
        let store = FlakyStore::new(Arc::new(MemoryStore::new()));
        store.fail_next(2);

        let bytes = Bytes::from_static(b"sealed");
        assert!(store.put(bytes.clone()).await.unwrap_err().is_transient());
        assert!(store.put(bytes.clone()).await.is_err());
        assert!(store.put(bytes).await.is_ok());
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_tampering_is_detected_by_verified_get() {
        let store = TamperingStore::new(Arc::new(MemoryStore::new()));
        let address = store.put(Bytes::from_static(b"sealed")).await.unwrap();
        assert!(store.get_verified(&address).await.is_ok());

        store.set_tampering(true);
        assert!(matches!(
            store.get_verified(&address).await,
            Err(StoreError::IntegrityViolation { .. })
        ));
    }
}
