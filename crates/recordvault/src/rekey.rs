//! Background re-keying of a record.
//!
//! A re-key decrypts the current ciphertext, seals it again under a rotated
//! data key, stores the new ciphertext and re-wraps the new key for every
//! active grant. All of it lands on the ledger as a single `Rekey` entry, so
//! readers see either the old key and ciphertext or the new ones.
//!
//! Until that entry is appended the task can fail or be cancelled; the
//! rotation is then abandoned and the record keeps its old key. The new
//! ciphertext may stay behind in the content store, unreferenced.
//!
//! A grant revoked after the task collected the active grants but before it
//! committed still holds the new key. The task checks for that once the
//! entry lands and re-keys again.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use recordvault_core::{ContentAddress, DataKeyId, GrantId, RecordId, Signer, TxId};
use recordvault_keys::{DataKey, KeyError, WrappedKey};
use recordvault_ledger::{ActionPayload, RekeyPayload};
use recordvault_store::ContentStoreExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::controller::{fetch_sealed, Shared};
use crate::error::{Result, VaultError};

/// What a committed re-key changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyReport {
    pub record_id: RecordId,
    pub previous_data_key_id: DataKeyId,
    pub data_key_id: DataKeyId,
    pub content_address: ContentAddress,
    /// Record version after the re-key.
    pub version: u32,
    /// Grants whose wrapped key was re-issued.
    pub rewrapped: Vec<GrantId>,
    pub tx_id: TxId,
}

/// Handle to a running re-key.
///
/// Dropping the handle does not stop the task.
#[derive(Debug)]
pub struct RekeyHandle {
    record_id: RecordId,
    cancel: CancellationToken,
    task: JoinHandle<Result<RekeyReport>>,
}

impl RekeyHandle {
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// Ask the task to stop.
    ///
    /// Has no effect once the `Rekey` entry has been appended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to commit, fail or observe cancellation.
    ///
    /// `LedgerConflict` means another re-key of the record rotated its key
    /// first. Start a new re-key once that one has finished.
    pub async fn wait(self) -> Result<RekeyReport> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(VaultError::Task(format!(
                "re-key of record {}: {}",
                self.record_id, e
            ))),
        }
    }
}

pub(crate) fn spawn(shared: Arc<Shared>, owner: Arc<dyn Signer>, record_id: RecordId) -> RekeyHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut report = run(&shared, owner.as_ref(), record_id, &token).await?;
        while let Some(grant_id) = revoked_since(&shared, &report)? {
            debug!(record_id = %record_id, grant_id = %grant_id, "grant revoked during re-key");
            match run(&shared, owner.as_ref(), record_id, &token).await {
                Ok(next) => report = next,
                // A later re-key rotated first, or the caller cancelled after
                // the first commit.
                Err(VaultError::LedgerConflict { .. } | VaultError::Cancelled(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok::<_, VaultError>(report)
    });
    debug!(record_id = %record_id, "re-key scheduled");
    RekeyHandle {
        record_id,
        cancel,
        task,
    }
}

/// A grant the committed re-key wrapped for that has since been revoked.
fn revoked_since(shared: &Shared, report: &RekeyReport) -> Result<Option<GrantId>> {
    let record = shared.ledger.record(&report.record_id)?;
    if record.data_key_id != report.data_key_id {
        return Ok(None);
    }
    for grant_id in &report.rewrapped {
        if let Some(grant) = shared.ledger.grant(grant_id)? {
            if !grant.is_active() {
                return Ok(Some(*grant_id));
            }
        }
    }
    Ok(None)
}

async fn run(
    shared: &Shared,
    owner: &dyn Signer,
    record_id: RecordId,
    cancel: &CancellationToken,
) -> Result<RekeyReport> {
    let record = shared.ledger.record(&record_id)?;
    let old_key = shared.keys.data_key(&record.data_key_id)?;

    let sealed = until_cancelled(cancel, record_id, fetch_sealed(shared, &record)).await?;
    let plaintext = Zeroizing::new(shared.keys.decrypt(&old_key, &sealed)?);

    let new_key = shared.keys.rotate(&old_key.id()).map_err(|e| match e {
        KeyError::AlreadySuperseded { superseded_by, .. } => VaultError::LedgerConflict {
            record_id,
            reason: format!("re-key to data key {} already in progress", superseded_by),
        },
        other => other.into(),
    })?;

    match reseal_and_commit(shared, owner, record_id, &old_key, &new_key, &plaintext, cancel).await
    {
        Ok(report) => {
            if shared.config.rotation.retire_superseded_keys {
                if let Err(e) = shared.keys.retire(&old_key.id()) {
                    warn!(record_id = %record_id, error = %e, "could not retire superseded key");
                }
            }
            info!(
                record_id = %record_id,
                data_key_id = %report.data_key_id,
                version = report.version,
                rewrapped = report.rewrapped.len(),
                "re-key committed"
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = shared.keys.abandon_rotation(&new_key.id()) {
                warn!(record_id = %record_id, error = %rollback, "could not abandon rotation");
            }
            match &e {
                VaultError::Cancelled(_) => warn!(record_id = %record_id, "re-key cancelled"),
                _ => warn!(record_id = %record_id, error = %e, "re-key abandoned"),
            }
            Err(e)
        }
    }
}

async fn reseal_and_commit(
    shared: &Shared,
    owner: &dyn Signer,
    record_id: RecordId,
    old_key: &DataKey,
    new_key: &DataKey,
    plaintext: &[u8],
    cancel: &CancellationToken,
) -> Result<RekeyReport> {
    let resealed = shared.keys.encrypt(new_key, plaintext)?;
    let address = until_cancelled(
        cancel,
        record_id,
        shared.content.put_verified(Bytes::from(resealed.to_bytes()?)),
    )
    .await?;
    debug!(record_id = %record_id, address = %address, "stored re-sealed payload");

    let _guard = until_cancelled(cancel, record_id, async {
        Ok::<_, VaultError>(shared.locks.lock(&record_id).await)
    })
    .await?;
    if cancel.is_cancelled() {
        return Err(VaultError::Cancelled(record_id));
    }

    let record = shared.ledger.record(&record_id)?;
    if record.data_key_id != old_key.id() {
        return Err(VaultError::LedgerConflict {
            record_id,
            reason: format!(
                "record moved to data key {} while re-keying from {}",
                record.data_key_id,
                old_key.id()
            ),
        });
    }

    let mut rewrapped: Vec<(GrantId, WrappedKey)> = Vec::new();
    for grant in shared.ledger.grants_for_record(&record_id)? {
        if !grant.is_active() {
            continue;
        }
        let recipient = shared
            .directory
            .encryption_key(&grant.grantee)
            .unwrap_or(grant.wrapped_key.recipient);
        let wrapped = shared.keys.wrap_for_principal(new_key, &recipient)?;
        rewrapped.push((grant.grant_id, wrapped));
    }
    let rewrapped_ids: Vec<GrantId> = rewrapped.iter().map(|(id, _)| *id).collect();
    let owner_recipient = shared
        .directory
        .encryption_key(&record.owner)
        .unwrap_or(record.owner_key.recipient);
    let owner_key = shared.keys.wrap_for_principal(new_key, &owner_recipient)?;

    let tx_id = shared
        .ledger
        .append(
            owner,
            record_id,
            ActionPayload::Rekey(RekeyPayload {
                previous_data_key_id: old_key.id(),
                data_key_id: new_key.id(),
                content_address: address,
                size: plaintext.len() as u64,
                owner_key,
                rewrapped,
            }),
        )
        .await?;

    Ok(RekeyReport {
        record_id,
        previous_data_key_id: old_key.id(),
        data_key_id: new_key.id(),
        content_address: address,
        version: record.version + 1,
        rewrapped: rewrapped_ids,
        tx_id,
    })
}

async fn until_cancelled<T, E, F>(cancel: &CancellationToken, record_id: RecordId, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    VaultError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VaultError::Cancelled(record_id)),
        result = fut => result.map_err(VaultError::from),
    }
}
