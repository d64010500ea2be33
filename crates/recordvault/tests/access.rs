//! Authorization and integrity failures.

use std::sync::Arc;

use proptest::prelude::*;
use recordvault::keys::{KeyError, KeyManager};
use recordvault::ledger::RequestStatus;
use recordvault::store::MemoryStore;
use recordvault::{Decision, GrantId, RequestId, VaultConfig, VaultError};
use recordvault_testkit::generators::access_ops;
use recordvault_testkit::fixtures::lab_result_metadata;
use recordvault_testkit::{AccessOp, TamperingStore, VaultFixture, LAB_RESULT};

#[tokio::test]
async fn test_non_owner_cannot_decide_revoke_or_rekey() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;
    let grant_id = fx.grant(&record_id, &fx.doctor).await;

    let request_id = fx
        .vault
        .request_access(fx.specialist.as_ref(), &record_id, "referral")
        .await
        .unwrap();
    let entries = fx.vault.history(&record_id).unwrap().len();

    // The requester approving their own request.
    assert!(matches!(
        fx.vault
            .decide(fx.specialist.as_ref(), &request_id, true)
            .await,
        Err(VaultError::NotAuthorized(_))
    ));
    // A grantee revoking their own grant.
    assert!(matches!(
        fx.vault.revoke(fx.doctor.clone(), &grant_id, None).await,
        Err(VaultError::NotAuthorized(_))
    ));
    assert!(matches!(
        fx.vault.rekey(fx.doctor.clone(), &record_id),
        Err(VaultError::NotAuthorized(_))
    ));

    assert_eq!(fx.vault.history(&record_id).unwrap().len(), entries);
    assert_eq!(
        fx.vault.request(&request_id).unwrap().status,
        RequestStatus::Pending
    );
    assert!(fx.vault.grant(&grant_id).unwrap().is_active());
}

#[tokio::test]
async fn test_owner_cannot_request_own_record() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;

    assert!(matches!(
        fx.vault
            .request_access(fx.patient.as_ref(), &record_id, "curious")
            .await,
        Err(VaultError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn test_blank_reason_is_rejected() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;

    for reason in ["", "   ", "\t\n"] {
        assert!(matches!(
            fx.vault
                .request_access(fx.doctor.as_ref(), &record_id, reason)
                .await,
            Err(VaultError::InvalidReason(id)) if id == record_id
        ));
    }
    assert_eq!(fx.vault.history(&record_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_principal_cannot_be_granted() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;

    let request_id = fx
        .vault
        .request_access(fx.stranger.as_ref(), &record_id, "insurance claim")
        .await
        .unwrap();
    assert!(matches!(
        fx.vault
            .decide(fx.patient.as_ref(), &request_id, true)
            .await,
        Err(VaultError::UnknownPrincipal(p)) if p == fx.stranger.principal_id()
    ));
    assert_eq!(
        fx.vault.request(&request_id).unwrap().status,
        RequestStatus::Pending
    );

    // Once registered, the same request can be approved.
    fx.directory.register_wallet(&fx.stranger);
    let decision = fx
        .vault
        .decide(fx.patient.as_ref(), &request_id, true)
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Approved { .. }));
    assert_eq!(fx.read_as(&fx.stranger, &record_id).await.unwrap(), LAB_RESULT);
}

#[tokio::test]
async fn test_owner_outside_directory_cannot_upload() {
    let fx = VaultFixture::new().await;

    let result = fx
        .vault
        .upload_record(fx.stranger.as_ref(), LAB_RESULT, lab_result_metadata())
        .await;
    assert!(matches!(
        result,
        Err(VaultError::UnknownPrincipal(p)) if p == fx.stranger.principal_id()
    ));
    assert!(fx
        .vault
        .records_owned_by(&fx.stranger.principal_id())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_owner_key_opens_only_for_owner() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;
    let record = fx.vault.record(&record_id).unwrap();

    assert_eq!(record.owner_key.data_key_id, record.data_key_id);
    assert_eq!(record.owner_key.recipient, fx.patient.encryption_public_key());
    assert!(KeyManager::unwrap(&record.owner_key, fx.patient.encryption_secret()).is_ok());
    assert!(KeyManager::unwrap(&record.owner_key, fx.doctor.encryption_secret()).is_err());
}

#[tokio::test]
async fn test_wrapped_key_opens_only_for_its_recipient() {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;
    let grant_id = fx.grant(&record_id, &fx.doctor).await;
    let wrapped = fx.vault.grant(&grant_id).unwrap().wrapped_key;

    assert!(KeyManager::unwrap(&wrapped, fx.doctor.encryption_secret()).is_ok());
    assert!(matches!(
        KeyManager::unwrap(&wrapped, fx.specialist.encryption_secret()),
        Err(KeyError::WrongRecipient { .. })
    ));
    assert!(matches!(
        fx.read_as(&fx.specialist, &record_id).await,
        Err(VaultError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_closed() {
    let store = Arc::new(MemoryStore::new());
    let tampering = Arc::new(TamperingStore::new(store.clone()));
    let fx = VaultFixture::over(VaultConfig::default(), tampering.clone(), store).await;
    let record_id = fx.upload_lab_result().await;
    fx.grant(&record_id, &fx.doctor).await;

    tampering.set_tampering(true);
    assert!(matches!(
        fx.read_as(&fx.doctor, &record_id).await,
        Err(VaultError::IntegrityFailure(_))
    ));
    assert!(matches!(
        fx.vault
            .read_own_record(&fx.patient.principal_id(), &record_id)
            .await,
        Err(VaultError::IntegrityFailure(_))
    ));

    tampering.set_tampering(false);
    assert_eq!(fx.read_as(&fx.doctor, &record_id).await.unwrap(), LAB_RESULT);
}

#[tokio::test]
async fn test_mismatched_hash_algorithm_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let mut config = VaultConfig::default();
    config.hash_function = recordvault::core::HashAlgorithm::Sha256;

    let result = recordvault::AccessController::open(
        config,
        Arc::new(recordvault::keys::SeededCryptoProvider::new([0x01; 32])),
        store.clone(),
        store,
        Arc::new(recordvault::MemoryDirectory::new()),
    )
    .await;
    assert!(matches!(result, Err(VaultError::Config(_))));
}

/// Replay a scenario and check that exactly the providers holding an
/// active grant can read.
async fn replay(ops: Vec<AccessOp>) {
    let fx = VaultFixture::new().await;
    let record_id = fx.upload_lab_result().await;
    let providers = [fx.doctor.clone(), fx.specialist.clone()];
    let mut requests: Vec<RequestId> = Vec::new();
    let mut grants: Vec<GrantId> = Vec::new();

    for op in ops {
        match op {
            AccessOp::Request { provider } => {
                let requester = &providers[provider % providers.len()];
                let id = fx
                    .vault
                    .request_access(requester.as_ref(), &record_id, "follow-up")
                    .await
                    .unwrap();
                requests.push(id);
            }
            AccessOp::Approve { request } | AccessOp::Deny { request } => {
                if requests.is_empty() {
                    continue;
                }
                let approve = matches!(op, AccessOp::Approve { .. });
                let request_id = requests[request % requests.len()];
                let pending =
                    fx.vault.request(&request_id).unwrap().status == RequestStatus::Pending;
                let result = fx
                    .vault
                    .decide(fx.patient.as_ref(), &request_id, approve)
                    .await;
                match result {
                    Ok(Decision::Approved { grant_id }) => grants.push(grant_id),
                    Ok(Decision::Denied) => {}
                    Err(VaultError::LedgerConflict { .. }) => assert!(!pending),
                    Err(e) => panic!("unexpected decide error: {}", e),
                }
            }
            AccessOp::Revoke { grant } => {
                if grants.is_empty() {
                    continue;
                }
                let grant_id = grants[grant % grants.len()];
                let active = fx.vault.grant(&grant_id).unwrap().is_active();
                match fx.vault.revoke(fx.patient.clone(), &grant_id, None).await {
                    Ok(revocation) => {
                        assert!(active);
                        if let Some(rekey) = revocation.rekey {
                            rekey.wait().await.unwrap();
                        }
                    }
                    Err(VaultError::LedgerConflict { .. }) => assert!(!active),
                    Err(e) => panic!("unexpected revoke error: {}", e),
                }
            }
            AccessOp::ForgedApprove { request, provider } => {
                if requests.is_empty() {
                    continue;
                }
                let forger = &providers[provider % providers.len()];
                let request_id = requests[request % requests.len()];
                assert!(matches!(
                    fx.vault.decide(forger.as_ref(), &request_id, true).await,
                    Err(VaultError::NotAuthorized(_))
                ));
            }
        }
    }

    let active: Vec<_> = fx
        .vault
        .grants_for_record(&record_id)
        .unwrap()
        .into_iter()
        .filter(|g| g.is_active())
        .map(|g| g.grantee)
        .collect();
    for provider in &providers {
        let has_grant = active.contains(&provider.principal_id());
        let read = fx.read_as(provider, &record_id).await;
        assert_eq!(read.is_ok(), has_grant);
        if let Ok(plaintext) = read {
            assert_eq!(plaintext, LAB_RESULT);
        }
        assert_eq!(
            fx.vault
                .check_access(&provider.principal_id(), &record_id)
                .is_ok(),
            has_grant
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_access_follows_active_grants(ops in access_ops(2, 12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(replay(ops));
    }
}
