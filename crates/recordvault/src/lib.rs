//! # RecordVault
//!
//! Encrypted patient records with owner-controlled access.
//!
//! ## Overview
//!
//! A record owner uploads a document; it is sealed under a fresh data key
//! and the ciphertext goes to an untrusted, content-addressed store. Access
//! is negotiated on a signed, append-only ledger:
//!
//! - **Request**: a provider asks for access, giving a reason
//! - **Decide**: the owner approves (wrapping the data key for the provider)
//!   or denies
//! - **Revoke**: the owner ends a grant; the record is then re-keyed so the
//!   revoked key no longer opens the current ciphertext
//!
//! Revocation cannot recall plaintext a grantee already decrypted, and a
//! grantee who cached the old ciphertext can still open it with the old key.
//! Re-keying protects everything written after it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recordvault::{AccessController, Decision, LocalWallet, MemoryDirectory, VaultConfig};
//! use recordvault::keys::OsCryptoProvider;
//! use recordvault::ledger::RecordMetadata;
//! use recordvault::store::MemoryStore;
//!
//! async fn example() -> recordvault::Result<()> {
//!     let patient = Arc::new(LocalWallet::generate());
//!     let doctor = LocalWallet::generate();
//!     let directory = Arc::new(MemoryDirectory::new());
//!     directory.register_wallet(&patient);
//!     directory.register_wallet(&doctor);
//!
//!     let store = Arc::new(MemoryStore::new());
//!     let vault = AccessController::open(
//!         VaultConfig::default(),
//!         Arc::new(OsCryptoProvider),
//!         store.clone(),
//!         store,
//!         directory,
//!     )
//!     .await?;
//!
//!     let record_id = vault
//!         .upload_record(patient.as_ref(), b"hba1c 5.4%", RecordMetadata::default())
//!         .await?;
//!     let request_id = vault.request_access(&doctor, &record_id, "follow-up").await?;
//!     if let Decision::Approved { grant_id } = vault.decide(patient.as_ref(), &request_id, true).await? {
//!         let plaintext = vault
//!             .read_record(&doctor.principal_id(), doctor.encryption_secret(), &record_id)
//!             .await?;
//!         assert_eq!(plaintext, b"hba1c 5.4%");
//!
//!         let revocation = vault.revoke(patient, &grant_id, None).await?;
//!         if let Some(rekey) = revocation.rekey {
//!             rekey.wait().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `recordvault::core` - ids, content addresses, signed transactions
//! - `recordvault::keys` - data keys, envelope encryption, key wrapping
//! - `recordvault::store` - content store and ledger backends
//! - `recordvault::ledger` - the access ledger and its state machine

pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod locks;
pub mod rekey;
pub mod retry;

pub use recordvault_core as core;
pub use recordvault_keys as keys;
pub use recordvault_ledger as ledger;
pub use recordvault_store as store;

pub use config::{RetryPolicy, RotationPolicy, VaultConfig};
pub use controller::{AccessController, Decision, Revocation};
pub use error::{Result, VaultError};
pub use identity::{Directory, LocalWallet, MemoryDirectory};
pub use locks::RecordLocks;
pub use rekey::{RekeyHandle, RekeyReport};
pub use retry::Retrying;

pub use recordvault_core::{GrantId, PrincipalId, RecordId, RequestId, Signer};
