//! Storage faults and the durable SQLite backend.

use std::sync::Arc;

use recordvault::keys::SeededCryptoProvider;
use recordvault::store::{MemoryStore, SqliteStore};
use recordvault::{AccessController, Decision, MemoryDirectory, VaultConfig, VaultError};
use recordvault_testkit::fixtures::lab_result_metadata;
use recordvault_testkit::{wallet, FlakyStore, VaultFixture, LAB_RESULT};

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    let fx = VaultFixture::over(VaultConfig::default(), flaky.clone(), store).await;

    flaky.fail_next(3);
    let record_id = fx.upload_lab_result().await;
    assert_eq!(flaky.calls(), 4);

    fx.grant(&record_id, &fx.doctor).await;
    flaky.fail_next(2);
    assert_eq!(fx.read_as(&fx.doctor, &record_id).await.unwrap(), LAB_RESULT);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_as_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    let fx = VaultFixture::over(VaultConfig::default(), flaky.clone(), store).await;

    flaky.fail_next(100);
    let result = fx
        .vault
        .upload_record(fx.patient.as_ref(), LAB_RESULT, lab_result_metadata())
        .await;
    assert!(matches!(result, Err(VaultError::StorageUnavailable(_))));
    assert_eq!(flaky.calls(), 4);

    // Nothing was registered.
    assert!(fx
        .vault
        .records_owned_by(&fx.patient.principal_id())
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flaky_ledger_backend_is_retried() {
    let store = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(store.clone()));
    let fx = VaultFixture::over(VaultConfig::default(), store, flaky.clone()).await;
    let record_id = fx.upload_lab_result().await;

    flaky.fail_next(2);
    fx.grant(&record_id, &fx.doctor).await;
    assert_eq!(fx.vault.history(&record_id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_sqlite_vault_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let patient = Arc::new(wallet(0x01));
    let doctor = wallet(0x02);
    let specialist = wallet(0x03);
    let directory = Arc::new(MemoryDirectory::new());
    directory.register_wallet(&patient);
    directory.register_wallet(&doctor);
    directory.register_wallet(&specialist);

    let (record_id, grant_id) = {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let vault = AccessController::open(
            VaultConfig::default(),
            Arc::new(SeededCryptoProvider::new([0x5e; 32])),
            store.clone(),
            store,
            directory.clone(),
        )
        .await
        .unwrap();

        let record_id = vault
            .upload_record(patient.as_ref(), LAB_RESULT, lab_result_metadata())
            .await
            .unwrap();
        let request_id = vault
            .request_access(&doctor, &record_id, "follow-up")
            .await
            .unwrap();
        let decision = vault.decide(patient.as_ref(), &request_id, true).await.unwrap();
        let grant_id = match decision {
            Decision::Approved { grant_id } => grant_id,
            Decision::Denied => panic!("request was denied"),
        };
        (record_id, grant_id)
    };

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let vault = AccessController::open(
        VaultConfig::default(),
        Arc::new(SeededCryptoProvider::new([0x5f; 32])),
        store.clone(),
        store,
        directory,
    )
    .await
    .unwrap();

    let record = vault.record(&record_id).unwrap();
    assert_eq!(record.owner, patient.principal_id());
    assert_eq!(vault.history(&record_id).unwrap().len(), 3);
    assert!(vault.grant(&grant_id).unwrap().is_active());

    // The grantee's wrapped key lives on the ledger, so they can still read.
    let plaintext = vault
        .read_record(&doctor.principal_id(), doctor.encryption_secret(), &record_id)
        .await
        .unwrap();
    assert_eq!(plaintext, LAB_RESULT);

    // The new process holds no data keys until the owner restores them.
    assert!(vault
        .read_own_record(&patient.principal_id(), &record_id)
        .await
        .is_err());
    assert_eq!(
        vault
            .restore_keys(&patient.principal_id(), patient.encryption_secret())
            .unwrap(),
        1
    );
    assert_eq!(
        vault
            .restore_keys(&patient.principal_id(), patient.encryption_secret())
            .unwrap(),
        0
    );
    assert_eq!(
        vault
            .read_own_record(&patient.principal_id(), &record_id)
            .await
            .unwrap(),
        LAB_RESULT
    );

    // New grants and re-keys work against the restored key.
    let request_id = vault
        .request_access(&specialist, &record_id, "referral")
        .await
        .unwrap();
    assert!(matches!(
        vault.decide(patient.as_ref(), &request_id, true).await.unwrap(),
        Decision::Approved { .. }
    ));
    let revocation = vault.revoke(patient.clone(), &grant_id, None).await.unwrap();
    let report = revocation.rekey.unwrap().wait().await.unwrap();
    assert_eq!(report.previous_data_key_id, record.data_key_id);
    assert_eq!(report.rewrapped.len(), 1);

    assert!(vault
        .read_record(&doctor.principal_id(), doctor.encryption_secret(), &record_id)
        .await
        .is_err());
    assert_eq!(
        vault
            .read_record(&specialist.principal_id(), specialist.encryption_secret(), &record_id)
            .await
            .unwrap(),
        LAB_RESULT
    );
    assert_eq!(
        vault.record(&record_id).unwrap().owner_key.data_key_id,
        report.data_key_id
    );
}

#[tokio::test]
async fn test_restore_keys_rejects_wrong_secret() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;

    let reopened = AccessController::open(
        VaultConfig::default(),
        Arc::new(SeededCryptoProvider::new([0x60; 32])),
        fx.store.clone(),
        fx.store.clone(),
        fx.directory.clone(),
    )
    .await
    .unwrap();

    assert!(reopened
        .restore_keys(&fx.patient.principal_id(), fx.doctor.encryption_secret())
        .is_err());
    assert!(reopened
        .read_own_record(&fx.patient.principal_id(), &record_id)
        .await
        .is_err());

    // Another principal owns nothing, so there is nothing to restore.
    assert_eq!(
        reopened
            .restore_keys(&fx.doctor.principal_id(), fx.doctor.encryption_secret())
            .unwrap(),
        0
    );
}
