//! # RecordVault Store
//!
//! Storage abstraction for RecordVault: a content-addressed blob store for
//! sealed payloads and an append-only, per-record transaction log for the
//! access ledger, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`ContentStore`] - `put(bytes) -> address`, `get(address) -> bytes`
//! - [`ContentStoreExt`] - re-hashing reads and writes; the only path the vault uses
//! - [`LedgerBackend`] - signature-checked, totally ordered transaction log
//! - [`SqliteStore`] - durable storage with versioned migrations
//! - [`MemoryStore`] - in-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use recordvault_store::{ContentStore, ContentStoreExt, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("vault.db").unwrap();
//!
//!     let address = store.put(Bytes::from_static(b"sealed bytes")).await.unwrap();
//!     let bytes = store.get_verified(&address).await.unwrap();
//!     assert_eq!(&bytes[..], b"sealed bytes");
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent writes**: storing the same blob or transaction twice is not an error
//! - **Conflict detection**: a different transaction at an occupied position returns `Conflict`
//! - **Untrusted reads**: blob bytes are re-hashed against their address on every read

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ContentStore, ContentStoreExt, LedgerBackend, SubmitResult};
