//! # RecordVault Core
//!
//! Pure primitives for RecordVault: identifiers, content addresses, and the
//! signed transactions that make up the access ledger.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Transaction`] - A signed, append-only ledger entry for one record
//! - [`TxId`] - Content-addressed transaction identifier (Blake3 hash)
//! - [`ContentAddress`] - Hash of the exact bytes held by a content store
//! - [`Action`] - Discriminator for payload interpretation
//! - [`Signer`] - The seam to an external wallet; the core never holds its secret
//!
//! ## Canonicalization
//!
//! Transactions are encoded using deterministic CBOR. See [`canonical`] module.

pub mod address;
pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod transaction;
pub mod types;
pub mod validation;

pub use address::{ContentAddress, HashAlgorithm};
pub use canonical::{canonical_bytes, canonical_header_bytes, decode_transaction};
pub use chain::ChainHead;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair, Signer};
pub use error::{CoreError, ValidationError};
pub use transaction::{Action, Transaction, TransactionBuilder, TransactionHeader};
pub use types::{now_millis, DataKeyId, GrantId, PrincipalId, RecordId, RequestId, TxId};
pub use validation::{validate_transaction, validate_transaction_structure};
