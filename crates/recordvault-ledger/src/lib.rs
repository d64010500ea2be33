//! # RecordVault Ledger
//!
//! The access-control ledger: who asked for a record, who was granted it,
//! and when access was revoked or the record re-keyed. Every change is a
//! signed transaction appended to a [`LedgerBackend`]; the current state is
//! folded from the log.
//!
//! ## State machine
//!
//! - Requests: `Pending -> Approved | Denied`, both terminal.
//! - Grants: `Active -> Revoked`, terminal.
//! - Only the record owner may approve, deny, revoke or re-key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use recordvault_core::{Keypair, RecordId};
//! use recordvault_ledger::{AccessLedger, ActionPayload, RequestPayload};
//! use recordvault_store::MemoryStore;
//!
//! async fn example(record_id: RecordId, provider: Keypair) {
//!     let ledger = AccessLedger::open(Arc::new(MemoryStore::new())).await.unwrap();
//!     let payload = ActionPayload::Request(RequestPayload {
//!         reason: "follow-up".into(),
//!         display_name: None,
//!     });
//!     ledger.append(&provider, record_id, payload).await.unwrap();
//! }
//! ```
//!
//! [`LedgerBackend`]: recordvault_store::LedgerBackend

pub mod error;
pub mod ledger;
pub mod payload;
pub mod state;

pub use error::{LedgerError, Result};
pub use ledger::AccessLedger;
pub use payload::{
    ActionPayload, ApprovePayload, DenyPayload, RecordMetadata, RegisterPayload, RekeyPayload,
    RequestPayload, RevokePayload,
};
pub use state::{AccessState, GrantView, RecordView, RequestStatus, RequestView};
