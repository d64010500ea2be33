//! The access ledger: a cached, verified view over a [`LedgerBackend`].
//!
//! Writes are checked against the cached [`AccessState`] before they are
//! signed, so an unauthorized or contradictory entry never reaches the
//! backend. Everything read back from the backend is re-verified before it
//! is folded in.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use recordvault_core::{
    now_millis, validate_transaction, ChainHead, GrantId, PrincipalId, RecordId, RequestId,
    Signer, Transaction, TransactionBuilder, TxId, ValidationError,
};
use recordvault_store::{LedgerBackend, SubmitResult};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::payload::ActionPayload;
use crate::state::{AccessState, GrantView, RecordView, RequestStatus, RequestView};

/// Signed, append-only record of requests, grants, revocations and re-keys.
pub struct AccessLedger {
    backend: Arc<dyn LedgerBackend>,
    state: RwLock<AccessState>,
}

impl AccessLedger {
    /// Create a ledger with an empty cache. Call [`sync_all`] to load
    /// entries already in the backend.
    ///
    /// [`sync_all`]: AccessLedger::sync_all
    pub fn new(backend: Arc<dyn LedgerBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(AccessState::new()),
        }
    }

    /// Create a ledger and fold every record the backend already holds.
    pub async fn open(backend: Arc<dyn LedgerBackend>) -> Result<Self> {
        let ledger = Self::new(backend);
        ledger.sync_all().await?;
        Ok(ledger)
    }

    pub fn backend(&self) -> &Arc<dyn LedgerBackend> {
        &self.backend
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign and append an entry to a record's log.
    ///
    /// The entry is checked against the cached state first; on any check
    /// failure nothing is signed or submitted. If another writer took the
    /// position in the meantime the record is re-synced and
    /// `LedgerConflict` is returned. An accepted entry that a concurrent
    /// sync folded first still counts as appended.
    pub async fn append(
        &self,
        signer: &dyn Signer,
        record_id: RecordId,
        payload: ActionPayload,
    ) -> Result<TxId> {
        let actor = signer.public_key();
        let action = payload.action();

        let known = self.read_state()?.head(&record_id).is_some();
        if !known && !matches!(payload, ActionPayload::Register(_)) {
            self.sync_record(&record_id).await?;
        }

        let head = {
            let state = self.read_state()?;
            state.check(&record_id, &actor, &payload)?;
            state.head(&record_id)
        };

        let seq = ChainHead::next_seq(head.as_ref());
        let mut builder = TransactionBuilder::new(record_id, seq)
            .timestamp(now_millis())
            .action(action)
            .payload(payload.to_bytes()?);
        if let Some(prev) = ChainHead::next_prev(head.as_ref()) {
            builder = builder.prev(prev);
        }
        let tx = builder.sign(signer);
        let tx_id = tx.compute_id();

        let result = match self.backend.submit_transaction(&tx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(record_id = %record_id, seq, error = %e, "backend did not accept transaction");
                return Err(e.into());
            }
        };

        match result {
            SubmitResult::Accepted | SubmitResult::AlreadyExists => {
                {
                    let mut state = self.write_state()?;
                    if state.contains(&tx) {
                        debug!(record_id = %record_id, seq, tx_id = %tx_id, "entry already folded by sync");
                    } else {
                        state.apply(&tx)?;
                    }
                }
                info!(
                    record_id = %record_id,
                    seq,
                    action = action.name(),
                    tx_id = %tx_id,
                    "appended ledger entry"
                );
                Ok(tx_id)
            }
            SubmitResult::Conflict { existing } => {
                warn!(
                    record_id = %record_id,
                    seq,
                    existing = %existing,
                    "ledger position taken by another writer"
                );
                self.sync_record(&record_id).await?;
                Err(LedgerError::LedgerConflict {
                    record_id,
                    reason: format!("seq {} already holds transaction {}", seq, existing),
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Synchronization
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold entries appended to the backend since the cached head.
    ///
    /// Each entry's signature, chain link and signer are re-verified. On the
    /// first entry that fails, the cache stays at the last good entry and
    /// `Verification` is returned. Returns the number of entries folded.
    pub async fn sync_record(&self, record_id: &RecordId) -> Result<usize> {
        let after = self
            .read_state()?
            .head(record_id)
            .map(|h| h.seq)
            .unwrap_or(0);
        let txs = self.backend.read_transactions(record_id, after).await?;

        let mut state = self.write_state()?;
        let mut folded = 0;
        for tx in &txs {
            let seq = tx.seq();
            let verified = verify_entry(tx, record_id).and_then(|()| {
                // A concurrent sync may have folded this entry already.
                let current = state.head(record_id).map(|h| h.seq).unwrap_or(0);
                if seq <= current {
                    return Ok(false);
                }
                state
                    .apply(tx)
                    .map(|()| true)
                    .map_err(|e| ValidationError::StructuralError(e.to_string()))
            });

            match verified {
                Ok(true) => folded += 1,
                Ok(false) => {}
                Err(source) => {
                    warn!(record_id = %record_id, seq, error = %source, "rejected ledger entry from backend");
                    return Err(LedgerError::Verification {
                        record_id: *record_id,
                        seq,
                        source,
                    });
                }
            }
        }

        if folded > 0 {
            debug!(record_id = %record_id, folded, "synced record");
        }
        Ok(folded)
    }

    /// Sync every record the backend knows about.
    pub async fn sync_all(&self) -> Result<usize> {
        let mut total = 0;
        for record_id in self.backend.list_records().await? {
            total += self.sync_record(&record_id).await?;
        }
        Ok(total)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        Ok(self.read_state()?.head(record_id))
    }

    pub fn record(&self, record_id: &RecordId) -> Result<RecordView> {
        self.read_state()?.record(record_id).cloned()
    }

    /// A record and the principal's active grant on it, read together so
    /// the grant's wrapped key matches the record's data key.
    pub fn access_snapshot(
        &self,
        record_id: &RecordId,
        principal: &PrincipalId,
    ) -> Result<(RecordView, Option<GrantView>)> {
        let state = self.read_state()?;
        let record = state.record(record_id)?.clone();
        let grant = state.active_grant_for(record_id, principal).cloned();
        Ok((record, grant))
    }

    pub fn request(&self, request_id: &RequestId) -> Result<Option<RequestView>> {
        Ok(self.read_state()?.request(request_id).cloned())
    }

    pub fn grant(&self, grant_id: &GrantId) -> Result<Option<GrantView>> {
        Ok(self.read_state()?.grant(grant_id).cloned())
    }

    /// The principal's active grant on a record, if any.
    pub fn active_grant_for(
        &self,
        record_id: &RecordId,
        principal: &PrincipalId,
    ) -> Result<Option<GrantView>> {
        Ok(self
            .read_state()?
            .active_grant_for(record_id, principal)
            .cloned())
    }

    /// Records registered by `owner`, oldest first.
    pub fn records_owned_by(&self, owner: &PrincipalId) -> Result<Vec<RecordView>> {
        let state = self.read_state()?;
        let mut records: Vec<RecordView> = state
            .records()
            .filter(|r| r.owner == *owner)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.record_id));
        Ok(records)
    }

    /// Pending requests on any record owned by `owner`, oldest first.
    pub fn pending_requests(&self, owner: &PrincipalId) -> Result<Vec<RequestView>> {
        let state = self.read_state()?;
        let mut requests: Vec<RequestView> = state
            .requests()
            .filter(|r| r.record_owner == *owner && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.requested_at, r.request_id));
        Ok(requests)
    }

    /// Every request made by `requester`, oldest first.
    pub fn requests_by(&self, requester: &PrincipalId) -> Result<Vec<RequestView>> {
        let state = self.read_state()?;
        let mut requests: Vec<RequestView> = state
            .requests()
            .filter(|r| r.requester == *requester)
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.requested_at, r.request_id));
        Ok(requests)
    }

    /// Records `principal` currently holds an active grant on.
    pub fn accessible_records(&self, principal: &PrincipalId) -> Result<Vec<RecordView>> {
        let state = self.read_state()?;
        let mut records: Vec<RecordView> = state
            .grants()
            .filter(|g| g.grantee == *principal && g.is_active())
            .filter_map(|g| state.record(&g.record_id).ok().cloned())
            .collect();
        records.sort_by_key(|r| (r.created_at, r.record_id));
        records.dedup_by_key(|r| r.record_id);
        Ok(records)
    }

    /// Every grant ever issued on a record, active or revoked.
    pub fn grants_for_record(&self, record_id: &RecordId) -> Result<Vec<GrantView>> {
        let state = self.read_state()?;
        let mut grants: Vec<GrantView> = state
            .grants_for_record(record_id)
            .into_iter()
            .cloned()
            .collect();
        grants.sort_by_key(|g| (g.granted_at, g.grant_id));
        Ok(grants)
    }

    pub fn requests_for_record(&self, record_id: &RecordId) -> Result<Vec<RequestView>> {
        let state = self.read_state()?;
        let mut requests: Vec<RequestView> = state
            .requests_for_record(record_id)
            .into_iter()
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.requested_at, r.request_id));
        Ok(requests)
    }

    /// The signed transactions of a record, in log order.
    pub fn history(&self, record_id: &RecordId) -> Result<Vec<Transaction>> {
        Ok(self.read_state()?.history(record_id).to_vec())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, AccessState>> {
        self.state.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, AccessState>> {
        self.state.write().map_err(|_| LedgerError::Poisoned)
    }
}

fn verify_entry(
    tx: &Transaction,
    record_id: &RecordId,
) -> std::result::Result<(), ValidationError> {
    if tx.record_id() != record_id {
        return Err(ValidationError::StructuralError(format!(
            "entry belongs to record {}",
            tx.record_id()
        )));
    }
    validate_transaction(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{
        ApprovePayload, DenyPayload, RecordMetadata, RegisterPayload, RequestPayload,
        RevokePayload,
    };
    use async_trait::async_trait;
    use recordvault_core::{ContentAddress, HashAlgorithm, Keypair};
    use recordvault_keys::{DataKey, KeyManager, SeededCryptoProvider, X25519StaticSecret};
    use recordvault_store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct Parties {
        owner: Keypair,
        provider: Keypair,
        provider_x: X25519StaticSecret,
        owner_x: X25519StaticSecret,
        km: KeyManager,
        data_key: DataKey,
        record_id: RecordId,
    }

    impl Parties {
        fn new() -> Self {
            let km = KeyManager::new(Arc::new(SeededCryptoProvider::new([0x42; 32])));
            let data_key = km.generate_data_key().unwrap();
            Self {
                owner: Keypair::from_seed(&[0x01; 32]),
                provider: Keypair::from_seed(&[0x02; 32]),
                provider_x: X25519StaticSecret::from_bytes([0x03; 32]),
                owner_x: X25519StaticSecret::from_bytes([0x04; 32]),
                km,
                data_key,
                record_id: RecordId::from_bytes([0x20; 32]),
            }
        }

        fn register(&self) -> ActionPayload {
            ActionPayload::Register(RegisterPayload {
                content_address: ContentAddress::compute(HashAlgorithm::Blake3, b"sealed"),
                data_key_id: self.data_key.id(),
                size: 6,
                metadata: RecordMetadata {
                    file_name: "lab-result.pdf".into(),
                    content_type: "application/pdf".into(),
                },
                owner_key: self
                    .km
                    .wrap_for_principal(&self.data_key, &self.owner_x.public_key())
                    .unwrap(),
            })
        }

        fn request(&self, reason: &str) -> ActionPayload {
            ActionPayload::Request(RequestPayload {
                reason: reason.into(),
                display_name: None,
            })
        }

        fn approve(&self, request_id: RequestId) -> ActionPayload {
            ActionPayload::Approve(ApprovePayload {
                request_id,
                wrapped_key: self
                    .km
                    .wrap_for_principal(&self.data_key, &self.provider_x.public_key())
                    .unwrap(),
            })
        }
    }

    async fn registered(parties: &Parties) -> (Arc<MemoryStore>, AccessLedger) {
        let backend = Arc::new(MemoryStore::new());
        let ledger = AccessLedger::new(backend.clone());
        ledger
            .append(&parties.owner, parties.record_id, parties.register())
            .await
            .unwrap();
        (backend, ledger)
    }

    #[tokio::test]
    async fn test_request_and_approve() {
        let p = Parties::new();
        let (_, ledger) = registered(&p).await;

        let request_id = RequestId::from(
            ledger
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );
        assert_eq!(ledger.pending_requests(&p.owner.public_key()).unwrap().len(), 1);

        let grant_id = GrantId::from(
            ledger
                .append(&p.owner, p.record_id, p.approve(request_id))
                .await
                .unwrap(),
        );

        let grant = ledger
            .active_grant_for(&p.record_id, &p.provider.public_key())
            .unwrap()
            .unwrap();
        assert_eq!(grant.grant_id, grant_id);
        assert!(ledger.pending_requests(&p.owner.public_key()).unwrap().is_empty());
        assert_eq!(
            ledger.accessible_records(&p.provider.public_key()).unwrap()[0].record_id,
            p.record_id
        );
        assert_eq!(ledger.history(&p.record_id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_entry_is_not_submitted() {
        let p = Parties::new();
        let (backend, ledger) = registered(&p).await;
        let request_id = RequestId::from(
            ledger
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );

        let result = ledger
            .append(&p.provider, p.record_id, p.approve(request_id))
            .await;
        assert!(matches!(result, Err(LedgerError::NotAuthorized { .. })));

        let result = ledger
            .append(&p.provider, p.record_id, p.request("  "))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidReason(_))));

        let stored = backend.read_transactions(&p.record_id, 0).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_writer_gets_conflict_and_resyncs() {
        let p = Parties::new();
        let (backend, first) = registered(&p).await;
        let second = AccessLedger::open(backend.clone()).await.unwrap();

        let request_id = RequestId::from(
            first
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );
        second.sync_record(&p.record_id).await.unwrap();

        first
            .append(&p.owner, p.record_id, p.approve(request_id))
            .await
            .unwrap();
        let result = second
            .append(
                &p.owner,
                p.record_id,
                ActionPayload::Deny(DenyPayload { request_id }),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::LedgerConflict { .. })));

        // The conflict refreshed the stale cache.
        let request = second.request(&request_id).unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn test_open_folds_existing_entries() {
        let p = Parties::new();
        let (backend, ledger) = registered(&p).await;
        ledger
            .append(&p.provider, p.record_id, p.request("second opinion"))
            .await
            .unwrap();

        let reopened = AccessLedger::open(backend).await.unwrap();
        assert_eq!(reopened.head(&p.record_id).unwrap().unwrap().seq, 2);
        assert_eq!(
            reopened.requests_by(&p.provider.public_key()).unwrap()[0].reason,
            "second opinion"
        );
        assert_eq!(
            reopened.records_owned_by(&p.owner.public_key()).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_append_to_unknown_record_syncs_first() {
        let p = Parties::new();
        let (backend, _) = registered(&p).await;
        let fresh = AccessLedger::new(backend);

        fresh
            .append(&p.provider, p.record_id, p.request("follow-up"))
            .await
            .unwrap();
        assert_eq!(fresh.head(&p.record_id).unwrap().unwrap().seq, 2);

        let missing = RecordId::from_bytes([0x99; 32]);
        let result = fresh
            .append(&p.provider, missing, p.request("follow-up"))
            .await;
        assert!(matches!(result, Err(LedgerError::RecordNotFound(_))));
    }

    /// Serves extra transactions after the real log, bypassing admission.
    struct InjectingBackend {
        inner: MemoryStore,
        injected: Mutex<Vec<Transaction>>,
    }

    #[async_trait]
    impl LedgerBackend for InjectingBackend {
        async fn submit_transaction(
            &self,
            tx: &Transaction,
        ) -> recordvault_store::Result<SubmitResult> {
            self.inner.submit_transaction(tx).await
        }

        async fn read_transactions(
            &self,
            record_id: &RecordId,
            after_seq: u64,
        ) -> recordvault_store::Result<Vec<Transaction>> {
            let mut txs = self.inner.read_transactions(record_id, after_seq).await?;
            let injected = self.injected.lock().map_err(|_| StoreError::Poisoned)?;
            txs.extend(injected.iter().filter(|tx| tx.seq() > after_seq).cloned());
            Ok(txs)
        }

        async fn list_records(&self) -> recordvault_store::Result<Vec<RecordId>> {
            self.inner.list_records().await
        }

        async fn head(&self, record_id: &RecordId) -> recordvault_store::Result<Option<ChainHead>> {
            self.inner.head(record_id).await
        }
    }

    #[tokio::test]
    async fn test_sync_rejects_entry_from_wrong_signer() {
        let p = Parties::new();
        let backend = Arc::new(InjectingBackend {
            inner: MemoryStore::new(),
            injected: Mutex::new(Vec::new()),
        });
        let ledger = AccessLedger::new(backend.clone());
        ledger
            .append(&p.owner, p.record_id, p.register())
            .await
            .unwrap();
        let request_id = RequestId::from(
            ledger
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );

        // Validly signed by the provider, who does not own the record.
        let payload = ActionPayload::Revoke(RevokePayload {
            grant_id: GrantId::from_bytes(*request_id.as_bytes()),
            reason: None,
        });
        let head = ledger.head(&p.record_id).unwrap().unwrap();
        let forged = TransactionBuilder::new(p.record_id, head.seq + 1)
            .timestamp(now_millis())
            .action(payload.action())
            .prev(head.tx_id)
            .payload(payload.to_bytes().unwrap())
            .sign(&p.provider);
        backend.injected.lock().unwrap().push(forged);

        let result = ledger.sync_record(&p.record_id).await;
        assert!(matches!(
            result,
            Err(LedgerError::Verification { seq: 3, .. })
        ));
        assert_eq!(ledger.head(&p.record_id).unwrap().unwrap().seq, 2);
    }

    /// Holds back the reply to one submit after the entry has landed.
    struct GatedBackend {
        inner: MemoryStore,
        armed: AtomicBool,
        submitted: Notify,
        release: Notify,
    }

    #[async_trait]
    impl LedgerBackend for GatedBackend {
        async fn submit_transaction(
            &self,
            tx: &Transaction,
        ) -> recordvault_store::Result<SubmitResult> {
            let result = self.inner.submit_transaction(tx).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.submitted.notify_one();
                self.release.notified().await;
            }
            Ok(result)
        }

        async fn read_transactions(
            &self,
            record_id: &RecordId,
            after_seq: u64,
        ) -> recordvault_store::Result<Vec<Transaction>> {
            self.inner.read_transactions(record_id, after_seq).await
        }

        async fn list_records(&self) -> recordvault_store::Result<Vec<RecordId>> {
            self.inner.list_records().await
        }

        async fn head(&self, record_id: &RecordId) -> recordvault_store::Result<Option<ChainHead>> {
            self.inner.head(record_id).await
        }
    }

    #[tokio::test]
    async fn test_append_folded_by_concurrent_sync_still_succeeds() {
        let p = Parties::new();
        let backend = Arc::new(GatedBackend {
            inner: MemoryStore::new(),
            armed: AtomicBool::new(false),
            submitted: Notify::new(),
            release: Notify::new(),
        });
        let ledger = Arc::new(AccessLedger::new(backend.clone()));
        ledger
            .append(&p.owner, p.record_id, p.register())
            .await
            .unwrap();

        backend.armed.store(true, Ordering::SeqCst);
        let append = {
            let ledger = ledger.clone();
            let provider = p.provider.clone();
            let record_id = p.record_id;
            let payload = p.request("follow-up");
            tokio::spawn(async move { ledger.append(&provider, record_id, payload).await })
        };

        // The entry is in the backend; its writer has not folded it yet.
        backend.submitted.notified().await;
        assert_eq!(ledger.sync_record(&p.record_id).await.unwrap(), 1);
        backend.release.notify_one();

        let tx_id = append.await.unwrap().unwrap();
        let history = ledger.history(&p.record_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].compute_id(), tx_id);
        assert_eq!(
            ledger.requests_by(&p.provider.public_key()).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_access_snapshot_pairs_grant_with_record() {
        let p = Parties::new();
        let (_, ledger) = registered(&p).await;
        let request_id = RequestId::from(
            ledger
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );
        let grant_id = GrantId::from(
            ledger
                .append(&p.owner, p.record_id, p.approve(request_id))
                .await
                .unwrap(),
        );

        let (record, grant) = ledger
            .access_snapshot(&p.record_id, &p.provider.public_key())
            .unwrap();
        let grant = grant.unwrap();
        assert_eq!(grant.grant_id, grant_id);
        assert_eq!(grant.wrapped_key.data_key_id, record.data_key_id);

        let (_, none) = ledger
            .access_snapshot(&p.record_id, &p.owner.public_key())
            .unwrap();
        assert!(none.is_none());
        assert!(matches!(
            ledger.access_snapshot(&RecordId::from_bytes([0x99; 32]), &p.provider.public_key()),
            Err(LedgerError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_then_grant_list_keeps_history() {
        let p = Parties::new();
        let (_, ledger) = registered(&p).await;
        let request_id = RequestId::from(
            ledger
                .append(&p.provider, p.record_id, p.request("follow-up"))
                .await
                .unwrap(),
        );
        let grant_id = GrantId::from(
            ledger
                .append(&p.owner, p.record_id, p.approve(request_id))
                .await
                .unwrap(),
        );
        ledger
            .append(
                &p.owner,
                p.record_id,
                ActionPayload::Revoke(RevokePayload {
                    grant_id,
                    reason: Some("care episode ended".into()),
                }),
            )
            .await
            .unwrap();

        let grants = ledger.grants_for_record(&p.record_id).unwrap();
        assert_eq!(grants.len(), 1);
        assert!(!grants[0].is_active());
        assert!(ledger
            .accessible_records(&p.provider.public_key())
            .unwrap()
            .is_empty());
    }
}
