//! # RecordVault Testkit
//!
//! Testing utilities for RecordVault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a vault over in-memory storage with a patient and providers
//! - **Fault injection**: stores that fail transiently or corrupt blobs
//! - **Generators**: proptest strategies for documents, reasons and scenarios
//! - **Golden vectors**: known digests and deterministic transactions
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use recordvault_testkit::fixtures::{VaultFixture, LAB_RESULT};
//!
//! async fn example() {
//!     let fx = VaultFixture::new().await;
//!     let record_id = fx.upload_lab_result().await;
//!     fx.grant(&record_id, &fx.doctor).await;
//!     assert_eq!(fx.read_as(&fx.doctor, &record_id).await.unwrap(), LAB_RESULT);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use recordvault_testkit::generators::{transaction_from_params, TransactionParams};
//!
//! proptest! {
//!     #[test]
//!     fn id_is_deterministic(params: TransactionParams) {
//!         let a = transaction_from_params(&params);
//!         let b = transaction_from_params(&params);
//!         prop_assert_eq!(a.compute_id(), b.compute_id());
//!     }
//! }
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use faults::{FlakyStore, TamperingStore};
pub use fixtures::{init_tracing, wallet, VaultFixture, LAB_RESULT};
pub use generators::{transaction_from_params, AccessOp, TransactionParams};
pub use vectors::{address_vectors, transaction_vectors, verify_address_vectors};
