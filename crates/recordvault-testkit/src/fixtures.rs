//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a vault over in-memory storage
//! with a patient and two providers registered in the directory.

use std::sync::{Arc, Once};

use recordvault::{AccessController, Decision, LocalWallet, MemoryDirectory, VaultConfig};
use recordvault_core::{GrantId, RecordId};
use recordvault_keys::SeededCryptoProvider;
use recordvault_ledger::RecordMetadata;
use recordvault_store::{ContentStore, LedgerBackend, MemoryStore};

/// Plaintext of the standard test record.
pub const LAB_RESULT: &[u8] = b"HbA1c 5.4% (ref 4.0-5.6); fasting glucose 92 mg/dL";

/// A deterministic wallet derived from a one-byte seed.
pub fn wallet(seed: u8) -> LocalWallet {
    LocalWallet::from_seeds([seed; 32], [seed ^ 0x80; 32])
}

/// Metadata of the standard test record.
pub fn lab_result_metadata() -> RecordMetadata {
    RecordMetadata {
        file_name: "lab-result.pdf".into(),
        content_type: "application/pdf".into(),
    }
}

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

/// A vault with three parties.
///
/// `patient`, `doctor` and `specialist` are registered in the directory;
/// `stranger` is not.
pub struct VaultFixture {
    pub vault: AccessController,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
    pub patient: Arc<LocalWallet>,
    pub doctor: Arc<LocalWallet>,
    pub specialist: Arc<LocalWallet>,
    pub stranger: Arc<LocalWallet>,
}

impl VaultFixture {
    /// Vault over a fresh in-memory store with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(VaultConfig::default()).await
    }

    pub async fn with_config(config: VaultConfig) -> Self {
        let store = Arc::new(MemoryStore::with_hash_algorithm(config.hash_function));
        Self::build(config, store.clone(), store.clone(), store).await
    }

    /// Vault over caller-supplied backends, for fault injection and SQLite.
    ///
    /// `store` is kept only for inspection; the vault uses `content` and
    /// `backend`.
    pub async fn over(
        config: VaultConfig,
        content: Arc<dyn ContentStore>,
        backend: Arc<dyn LedgerBackend>,
    ) -> Self {
        Self::build(config, Arc::new(MemoryStore::new()), content, backend).await
    }

    async fn build(
        config: VaultConfig,
        store: Arc<MemoryStore>,
        content: Arc<dyn ContentStore>,
        backend: Arc<dyn LedgerBackend>,
    ) -> Self {
        init_tracing();

        let patient = Arc::new(wallet(0x01));
        let doctor = Arc::new(wallet(0x02));
        let specialist = Arc::new(wallet(0x03));
        let stranger = Arc::new(wallet(0x04));

        let directory = Arc::new(MemoryDirectory::new());
        directory.register_wallet(&patient);
        directory.register_wallet(&doctor);
        directory.register_wallet(&specialist);

        let vault = AccessController::open(
            config,
            Arc::new(SeededCryptoProvider::new([0x5e; 32])),
            content,
            backend,
            directory.clone(),
        )
        .await
        .expect("vault opens over fixture backends");

        Self {
            vault,
            store,
            directory,
            patient,
            doctor,
            specialist,
            stranger,
        }
    }

    /// Upload the standard lab result as the patient.
    pub async fn upload_lab_result(&self) -> RecordId {
        self.vault
            .upload_record(self.patient.as_ref(), LAB_RESULT, lab_result_metadata())
            .await
            .expect("patient uploads lab result")
    }

    /// Request and approve access for `grantee`, returning the grant.
    pub async fn grant(&self, record_id: &RecordId, grantee: &LocalWallet) -> GrantId {
        let request_id = self
            .vault
            .request_access(grantee, record_id, "follow-up")
            .await
            .expect("grantee requests access");
        match self
            .vault
            .decide(self.patient.as_ref(), &request_id, true)
            .await
            .expect("patient approves request")
        {
            Decision::Approved { grant_id } => grant_id,
            Decision::Denied => unreachable!("approval returned a denial"),
        }
    }

    /// Read a record as `grantee` with its own secret.
    pub async fn read_as(
        &self,
        grantee: &LocalWallet,
        record_id: &RecordId,
    ) -> recordvault::Result<Vec<u8>> {
        self.vault
            .read_record(&grantee.principal_id(), grantee.encryption_secret(), record_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallets_are_distinct() {
        let wallets: Vec<_> = (1..=4).map(wallet).collect();
        for (i, a) in wallets.iter().enumerate() {
            for b in &wallets[i + 1..] {
                assert_ne!(a.principal_id(), b.principal_id());
                assert_ne!(a.encryption_public_key(), b.encryption_public_key());
            }
        }
    }

    #[tokio::test]
    async fn test_fixture_grant_gives_access() {
        let fx = VaultFixture::new().await;
        let record_id = fx.upload_lab_result().await;
        fx.grant(&record_id, &fx.doctor).await;

        assert_eq!(fx.read_as(&fx.doctor, &record_id).await.unwrap(), LAB_RESULT);
        assert!(fx.read_as(&fx.specialist, &record_id).await.is_err());
    }
}
