//! The access controller: the vault's public API.
//!
//! The controller brings together key custody, the content store and the
//! access ledger. It owns no durable state of its own; everything it knows
//! about records, requests and grants is folded from the ledger.

use std::sync::Arc;

use bytes::Bytes;
use recordvault_core::{
    ChainHead, GrantId, PrincipalId, RecordId, RequestId, Signer, Transaction, TxId,
};
use recordvault_keys::{
    random_array, CryptoProvider, KeyInfo, KeyManager, SealedPayload, X25519StaticSecret,
};
use recordvault_ledger::{
    AccessLedger, ActionPayload, ApprovePayload, DenyPayload, GrantView, RecordMetadata,
    RecordView, RegisterPayload, RequestPayload, RequestView, RevokePayload,
};
use recordvault_store::{ContentStore, ContentStoreExt, LedgerBackend};
use tracing::{debug, info};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::identity::Directory;
use crate::locks::RecordLocks;
use crate::rekey::{self, RekeyHandle};
use crate::retry::Retrying;

/// Outcome of [`AccessController::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was approved and this grant issued.
    Approved { grant_id: GrantId },
    Denied,
}

/// Outcome of [`AccessController::revoke`].
#[derive(Debug)]
pub struct Revocation {
    pub grant_id: GrantId,
    pub tx_id: TxId,
    /// The re-key started for the record, if rotation on revoke is enabled.
    pub rekey: Option<RekeyHandle>,
}

pub(crate) struct Shared {
    pub(crate) config: VaultConfig,
    pub(crate) keys: KeyManager,
    pub(crate) content: Retrying<dyn ContentStore>,
    pub(crate) ledger: AccessLedger,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) locks: RecordLocks,
}

/// Orchestrates uploads, access requests, grants, revocation and re-keying.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct AccessController {
    shared: Arc<Shared>,
}

impl AccessController {
    /// Open a vault over the given backends.
    ///
    /// Validates the configuration, checks the content store hashes with the
    /// configured function, wraps both backends in the retry policy and
    /// folds every record already on the ledger.
    pub async fn open(
        config: VaultConfig,
        provider: Arc<dyn CryptoProvider>,
        content: Arc<dyn ContentStore>,
        backend: Arc<dyn LedgerBackend>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        config.validate()?;
        if content.hash_algorithm() != config.hash_function {
            return Err(VaultError::Config(format!(
                "content store hashes with {}, configuration requires {}",
                content.hash_algorithm().as_str(),
                config.hash_function.as_str()
            )));
        }

        let backend: Arc<dyn LedgerBackend> =
            Arc::new(Retrying::new(backend, config.retry_policy.clone()));
        let ledger = AccessLedger::open(backend).await?;
        let content = Retrying::new(content, config.retry_policy.clone());

        info!(
            hash_function = config.hash_function.as_str(),
            aead_cipher = config.aead_cipher.as_str(),
            "opened record vault"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                keys: KeyManager::new(provider),
                config,
                content,
                ledger,
                directory,
                locks: RecordLocks::new(),
            }),
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.shared.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.shared.keys
    }

    pub fn ledger(&self) -> &AccessLedger {
        &self.shared.ledger
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt a document under a fresh data key, store the ciphertext and
    /// register the record on the ledger.
    ///
    /// The data key is also wrapped for the owner's encryption key and
    /// registered with the record, so a restarted vault can take custody of
    /// it again through [`restore_keys`]. The owner must be in the directory.
    ///
    /// [`restore_keys`]: AccessController::restore_keys
    pub async fn upload_record(
        &self,
        owner: &dyn Signer,
        plaintext: &[u8],
        metadata: RecordMetadata,
    ) -> Result<RecordId> {
        let owner_id = owner.public_key();
        let owner_recipient = self
            .shared
            .directory
            .encryption_key(&owner_id)
            .ok_or(VaultError::UnknownPrincipal(owner_id))?;

        let keys = &self.shared.keys;
        let record_id = RecordId::from_bytes(random_array(keys.provider().as_ref()));
        let data_key = keys.generate_data_key()?;

        let owner_key = keys.wrap_for_principal(&data_key, &owner_recipient)?;
        let sealed = keys.encrypt(&data_key, plaintext)?;
        let address = self
            .shared
            .content
            .put_verified(Bytes::from(sealed.to_bytes()?))
            .await?;
        debug!(record_id = %record_id, address = %address, "stored sealed payload");

        let _guard = self.shared.locks.lock(&record_id).await;
        self.shared
            .ledger
            .append(
                owner,
                record_id,
                ActionPayload::Register(RegisterPayload {
                    content_address: address,
                    data_key_id: data_key.id(),
                    size: plaintext.len() as u64,
                    metadata,
                    owner_key,
                }),
            )
            .await?;

        info!(record_id = %record_id, owner = %owner_id, "registered record");
        Ok(record_id)
    }

    /// Fetch a record's sealed payload, verified against its address.
    pub async fn fetch_sealed(&self, record_id: &RecordId) -> Result<SealedPayload> {
        let record = self.shared.ledger.record(record_id)?;
        fetch_sealed(&self.shared, &record).await
    }

    /// Decrypt a record as a grantee.
    ///
    /// Checks for an active grant, then opens the grant's wrapped key with
    /// `secret` and decrypts the current ciphertext locally.
    pub async fn read_record(
        &self,
        principal: &PrincipalId,
        secret: &X25519StaticSecret,
        record_id: &RecordId,
    ) -> Result<Vec<u8>> {
        let (record, grant) = self.shared.ledger.access_snapshot(record_id, principal)?;
        let grant = grant.ok_or_else(|| no_grant(principal, record_id))?;
        let sealed = fetch_sealed(&self.shared, &record).await?;

        let data_key = KeyManager::unwrap(&grant.wrapped_key, secret)?;
        let plaintext = self.shared.keys.decrypt(&data_key, &sealed)?;
        debug!(record_id = %record_id, principal = %principal, "grantee read record");
        Ok(plaintext)
    }

    /// Decrypt a record as its owner, using the key in custody.
    pub async fn read_own_record(
        &self,
        owner: &PrincipalId,
        record_id: &RecordId,
    ) -> Result<Vec<u8>> {
        let record = self.shared.ledger.record(record_id)?;
        if record.owner != *owner {
            return Err(VaultError::NotAuthorized(format!(
                "{} does not own record {}",
                owner, record_id
            )));
        }
        let sealed = fetch_sealed(&self.shared, &record).await?;
        let data_key = self.shared.keys.data_key(&record.data_key_id)?;
        Ok(self.shared.keys.decrypt(&data_key, &sealed)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests and grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the owner of a record for access.
    ///
    /// Fails with `InvalidReason` if `reason` is empty or whitespace.
    pub async fn request_access(
        &self,
        requester: &dyn Signer,
        record_id: &RecordId,
        reason: &str,
    ) -> Result<RequestId> {
        self.request_access_as(requester, record_id, reason, None)
            .await
    }

    /// [`request_access`] with a display name shown to the owner.
    ///
    /// [`request_access`]: AccessController::request_access
    pub async fn request_access_as(
        &self,
        requester: &dyn Signer,
        record_id: &RecordId,
        reason: &str,
        display_name: Option<String>,
    ) -> Result<RequestId> {
        if reason.trim().is_empty() {
            return Err(VaultError::InvalidReason(*record_id));
        }

        let _guard = self.shared.locks.lock(record_id).await;
        let tx_id = self
            .shared
            .ledger
            .append(
                requester,
                *record_id,
                ActionPayload::Request(RequestPayload {
                    reason: reason.to_string(),
                    display_name,
                }),
            )
            .await?;

        let request_id = RequestId::from(tx_id);
        info!(
            record_id = %record_id,
            request_id = %request_id,
            requester = %requester.public_key(),
            "access requested"
        );
        Ok(request_id)
    }

    /// Approve or deny a pending request. Owner only.
    ///
    /// Approval resolves the requester's current encryption key through the
    /// directory and issues a grant carrying the record's data key wrapped
    /// for it. Denial touches no key material.
    pub async fn decide(
        &self,
        owner: &dyn Signer,
        request_id: &RequestId,
        approve: bool,
    ) -> Result<Decision> {
        let request = self
            .shared
            .ledger
            .request(request_id)?
            .ok_or(VaultError::RequestNotFound(*request_id))?;
        let record_id = request.record_id;

        let _guard = self.shared.locks.lock(&record_id).await;
        let record = self.shared.ledger.record(&record_id)?;
        let actor = owner.public_key();
        if actor != record.owner {
            return Err(VaultError::NotAuthorized(format!(
                "{} may not decide request {} on record {}: not the owner",
                actor, request_id, record_id
            )));
        }

        if !approve {
            self.shared
                .ledger
                .append(
                    owner,
                    record_id,
                    ActionPayload::Deny(DenyPayload {
                        request_id: *request_id,
                    }),
                )
                .await?;
            info!(record_id = %record_id, request_id = %request_id, "request denied");
            return Ok(Decision::Denied);
        }

        let grantee_key = self
            .shared
            .directory
            .encryption_key(&request.requester)
            .ok_or(VaultError::UnknownPrincipal(request.requester))?;
        let data_key = self.shared.keys.data_key(&record.data_key_id)?;
        let wrapped_key = self.shared.keys.wrap_for_principal(&data_key, &grantee_key)?;

        let tx_id = self
            .shared
            .ledger
            .append(
                owner,
                record_id,
                ActionPayload::Approve(ApprovePayload {
                    request_id: *request_id,
                    wrapped_key,
                }),
            )
            .await?;

        let grant_id = GrantId::from(tx_id);
        info!(
            record_id = %record_id,
            request_id = %request_id,
            grant_id = %grant_id,
            grantee = %request.requester,
            "request approved"
        );
        Ok(Decision::Approved { grant_id })
    }

    /// Revoke a grant. Owner only.
    ///
    /// The grantee can no longer obtain the record's key through the vault.
    /// A grantee who already fetched and decrypted the ciphertext keeps what
    /// they read, and until the re-key commits the wrapped key they hold
    /// still opens the unchanged ciphertext. With
    /// `rotation.auto_trigger_on_revoke` set, a re-key is started and its
    /// handle returned.
    ///
    /// Back-to-back revocations on one record start overlapping re-keys. One
    /// of them may fail with `LedgerConflict` because another rotated the key
    /// first; the one that commits covers every revocation made before it.
    /// A caller that needs its own report retries [`rekey`].
    ///
    /// [`rekey`]: AccessController::rekey
    pub async fn revoke(
        &self,
        owner: Arc<dyn Signer>,
        grant_id: &GrantId,
        reason: Option<&str>,
    ) -> Result<Revocation> {
        let grant = self
            .shared
            .ledger
            .grant(grant_id)?
            .ok_or(VaultError::GrantNotFound(*grant_id))?;
        let record_id = grant.record_id;

        let tx_id = {
            let _guard = self.shared.locks.lock(&record_id).await;
            self.shared
                .ledger
                .append(
                    owner.as_ref(),
                    record_id,
                    ActionPayload::Revoke(RevokePayload {
                        grant_id: *grant_id,
                        reason: reason.map(String::from),
                    }),
                )
                .await?
        };
        info!(
            record_id = %record_id,
            grant_id = %grant_id,
            grantee = %grant.grantee,
            "grant revoked"
        );

        let rekey = if self.shared.config.rotation.auto_trigger_on_revoke {
            Some(rekey::spawn(self.shared.clone(), owner, record_id))
        } else {
            None
        };

        Ok(Revocation {
            grant_id: *grant_id,
            tx_id,
            rekey,
        })
    }

    /// Start re-keying a record in the background. Owner only.
    pub fn rekey(&self, owner: Arc<dyn Signer>, record_id: &RecordId) -> Result<RekeyHandle> {
        let record = self.shared.ledger.record(record_id)?;
        let actor = owner.public_key();
        if actor != record.owner {
            return Err(VaultError::NotAuthorized(format!(
                "{} may not re-key record {}: not the owner",
                actor, record_id
            )));
        }
        Ok(rekey::spawn(self.shared.clone(), owner, *record_id))
    }

    /// The principal's active grant on a record.
    ///
    /// Fails with `NotAuthorized` if there is none.
    pub fn check_access(&self, principal: &PrincipalId, record_id: &RecordId) -> Result<GrantView> {
        self.shared.ledger.record(record_id)?;
        self.shared
            .ledger
            .active_grant_for(record_id, principal)?
            .ok_or_else(|| no_grant(principal, record_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn record(&self, record_id: &RecordId) -> Result<RecordView> {
        Ok(self.shared.ledger.record(record_id)?)
    }

    pub fn request(&self, request_id: &RequestId) -> Result<RequestView> {
        self.shared
            .ledger
            .request(request_id)?
            .ok_or(VaultError::RequestNotFound(*request_id))
    }

    pub fn grant(&self, grant_id: &GrantId) -> Result<GrantView> {
        self.shared
            .ledger
            .grant(grant_id)?
            .ok_or(VaultError::GrantNotFound(*grant_id))
    }

    pub fn records_owned_by(&self, owner: &PrincipalId) -> Result<Vec<RecordView>> {
        Ok(self.shared.ledger.records_owned_by(owner)?)
    }

    pub fn pending_requests(&self, owner: &PrincipalId) -> Result<Vec<RequestView>> {
        Ok(self.shared.ledger.pending_requests(owner)?)
    }

    pub fn requests_by(&self, requester: &PrincipalId) -> Result<Vec<RequestView>> {
        Ok(self.shared.ledger.requests_by(requester)?)
    }

    pub fn accessible_records(&self, principal: &PrincipalId) -> Result<Vec<RecordView>> {
        Ok(self.shared.ledger.accessible_records(principal)?)
    }

    pub fn grants_for_record(&self, record_id: &RecordId) -> Result<Vec<GrantView>> {
        self.shared.ledger.record(record_id)?;
        Ok(self.shared.ledger.grants_for_record(record_id)?)
    }

    /// The record's signed transactions, oldest first.
    pub fn history(&self, record_id: &RecordId) -> Result<Vec<Transaction>> {
        self.shared.ledger.record(record_id)?;
        Ok(self.shared.ledger.history(record_id)?)
    }

    pub fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        Ok(self.shared.ledger.head(record_id)?)
    }

    /// Key metadata for the record's current data key.
    pub fn key_info(&self, record_id: &RecordId) -> Result<KeyInfo> {
        let record = self.shared.ledger.record(record_id)?;
        Ok(self.shared.keys.key_info(&record.data_key_id)?)
    }

    /// Fold entries other writers appended to a record's log.
    ///
    /// Waits for in-flight writes on the record, so a sync never folds an
    /// entry between its submission and its writer's own fold.
    pub async fn sync_record(&self, record_id: &RecordId) -> Result<usize> {
        let _guard = self.shared.locks.lock(record_id).await;
        Ok(self.shared.ledger.sync_record(record_id).await?)
    }

    /// Fold entries other writers appended to any record's log.
    pub async fn sync_all(&self) -> Result<usize> {
        let record_ids = self.shared.ledger.backend().list_records().await?;
        let mut total = 0;
        for record_id in record_ids {
            total += self.sync_record(&record_id).await?;
        }
        Ok(total)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key custody
    // ─────────────────────────────────────────────────────────────────────────

    /// Take custody of the owner's data keys from the ledger.
    ///
    /// A vault reopened over an existing ledger holds no data keys. Every
    /// record registered by `owner` carries its current key wrapped for the
    /// owner; this opens each one the manager does not already hold.
    /// Returns the number of keys restored.
    pub fn restore_keys(&self, owner: &PrincipalId, secret: &X25519StaticSecret) -> Result<usize> {
        let mut restored = 0;
        for record in self.shared.ledger.records_owned_by(owner)? {
            if self.shared.keys.key_info(&record.data_key_id).is_ok() {
                continue;
            }
            self.shared.keys.restore(&record.owner_key, secret)?;
            restored += 1;
        }
        if restored > 0 {
            info!(owner = %owner, restored, "restored data keys from ledger");
        }
        Ok(restored)
    }
}

impl std::fmt::Debug for AccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

fn no_grant(principal: &PrincipalId, record_id: &RecordId) -> VaultError {
    VaultError::NotAuthorized(format!(
        "{} holds no active grant on record {}",
        principal, record_id
    ))
}

pub(crate) async fn fetch_sealed(shared: &Shared, record: &RecordView) -> Result<SealedPayload> {
    let bytes = shared.content.get_verified(&record.content_address).await?;
    let sealed = SealedPayload::from_bytes(&bytes)?;
    if sealed.data_key_id != record.data_key_id {
        return Err(VaultError::IntegrityFailure(format!(
            "record {} points at data key {} but its payload is sealed under {}",
            record.record_id, record.data_key_id, sealed.data_key_id
        )));
    }
    if sealed.format != shared.config.aead_cipher {
        return Err(VaultError::Config(format!(
            "record {} is sealed with {}, configuration requires {}",
            record.record_id,
            sealed.format.as_str(),
            shared.config.aead_cipher.as_str()
        )));
    }
    Ok(sealed)
}
