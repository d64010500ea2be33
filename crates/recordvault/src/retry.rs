//! Timeouts and bounded retries around storage backends.
//!
//! [`Retrying`] wraps a content store or ledger backend and applies a
//! [`RetryPolicy`] to every call. Only transient failures are retried; a
//! not-found, an integrity violation or a rejected transaction is returned
//! at once. When the attempts run out the last failure is reported as
//! `StoreError::Unavailable`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use recordvault_core::{ChainHead, ContentAddress, HashAlgorithm, RecordId, Transaction};
use recordvault_store::{ContentStore, LedgerBackend, Result, StoreError, SubmitResult};
use tracing::warn;

use crate::config::RetryPolicy;

/// A backend with a timeout and retry policy applied to every call.
///
/// Resubmitting a transaction after a timeout is safe: if the first attempt
/// landed, the retry resolves to `AlreadyExists`.
pub struct Retrying<S: ?Sized> {
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S: ?Sized> Retrying<S> {
    pub fn new(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.base_delay();
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout(), call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Unavailable(format!(
                    "{} timed out after {}ms",
                    op, self.policy.timeout_ms
                ))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(op, attempt, error = %e, "storage retries exhausted");
                    return Err(StoreError::Unavailable(format!(
                        "{} failed after {} attempts: {}",
                        op, attempt, e
                    )));
                }
                Err(e) => {
                    warn!(
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient storage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.policy.max_delay());
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Retrying<S> {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.inner.hash_algorithm()
    }

    async fn put(&self, bytes: Bytes) -> Result<ContentAddress> {
        self.run("content put", || self.inner.put(bytes.clone()))
            .await
    }

    async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
        self.run("content get", || self.inner.get(address)).await
    }
}

#[async_trait]
impl<S: LedgerBackend + ?Sized> LedgerBackend for Retrying<S> {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult> {
        self.run("ledger submit", || self.inner.submit_transaction(tx))
            .await
    }

    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>> {
        self.run("ledger read", || {
            self.inner.read_transactions(record_id, after_seq)
        })
        .await
    }

    async fn list_records(&self) -> Result<Vec<RecordId>> {
        self.run("ledger list", || self.inner.list_records()).await
    }

    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        self.run("ledger head", || self.inner.head(record_id)).await
    }
}
