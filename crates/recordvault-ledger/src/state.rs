//! Access state computation.
//!
//! Access state is computed by folding a record's transactions in order.
//! Nothing here is stored as mutable state elsewhere: the views are a cache
//! of the log. [`AccessState::check`] validates an entry against the current
//! state without touching it; [`AccessState::apply`] checks and then folds.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use recordvault_core::{
    ChainHead, ContentAddress, DataKeyId, GrantId, PrincipalId, RecordId, RequestId,
    Transaction, TxId,
};
use recordvault_keys::WrappedKey;

use crate::error::{LedgerError, Result};
use crate::payload::{ActionPayload, RecordMetadata};

/// Lifecycle of an access request. Approved and Denied are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

/// Current view of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordView {
    pub record_id: RecordId,
    pub owner: PrincipalId,
    pub content_address: ContentAddress,
    pub data_key_id: DataKeyId,
    pub size: u64,
    /// 1 at registration, +1 per committed re-key.
    pub version: u32,
    pub created_at: i64,
    pub metadata: RecordMetadata,
    /// The current data key wrapped for the owner.
    pub owner_key: WrappedKey,
    /// Last folded position of the record's log.
    pub head: ChainHead,
}

/// Current view of an access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    pub request_id: RequestId,
    pub record_id: RecordId,
    pub record_owner: PrincipalId,
    pub requester: PrincipalId,
    pub reason: String,
    pub display_name: Option<String>,
    pub requested_at: i64,
    pub status: RequestStatus,
    pub decided_at: Option<i64>,
    /// Set when approved.
    pub grant_id: Option<GrantId>,
}

/// Current view of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantView {
    pub grant_id: GrantId,
    pub request_id: RequestId,
    pub record_id: RecordId,
    pub grantee: PrincipalId,
    /// The most recently issued wrapped key for this grant.
    pub wrapped_key: WrappedKey,
    pub granted_at: i64,
    pub revoked_at: Option<i64>,
}

impl GrantView {
    /// Active until revoked; revocation is permanent.
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[derive(Debug, Clone)]
struct RecordState {
    record: RecordView,
    requests: BTreeMap<RequestId, RequestView>,
    grants: BTreeMap<GrantId, GrantView>,
    history: Vec<Transaction>,
}

/// Folded access state for every record seen so far.
#[derive(Debug, Default, Clone)]
pub struct AccessState {
    records: HashMap<RecordId, RecordState>,
    request_index: HashMap<RequestId, RecordId>,
    grant_index: HashMap<GrantId, RecordId>,
}

impl AccessState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Head of a record's log, `None` if the record is unknown.
    pub fn head(&self, record_id: &RecordId) -> Option<ChainHead> {
        self.records.get(record_id).map(|r| r.record.head)
    }

    /// Check that `actor` may append `payload` to `record_id` now.
    ///
    /// Performs every state-machine check that does not depend on the log
    /// position. Nothing is modified.
    pub fn check(
        &self,
        record_id: &RecordId,
        actor: &PrincipalId,
        payload: &ActionPayload,
    ) -> Result<()> {
        let record_id = *record_id;

        if let ActionPayload::Register(p) = payload {
            if self.records.contains_key(&record_id) {
                return Err(LedgerError::LedgerConflict {
                    record_id,
                    reason: "record already registered".into(),
                });
            }
            return check_owner_key(record_id, &p.owner_key, &p.data_key_id);
        }

        let state = self
            .records
            .get(&record_id)
            .ok_or(LedgerError::RecordNotFound(record_id))?;

        let action = payload.action();
        if action.is_owner_only() && *actor != state.record.owner {
            return Err(LedgerError::NotAuthorized {
                record_id,
                actor: *actor,
                action: action.name(),
            });
        }

        match payload {
            ActionPayload::Register(_) => Ok(()),

            ActionPayload::Request(p) => {
                if p.reason.trim().is_empty() {
                    return Err(LedgerError::InvalidReason(record_id));
                }
                if *actor == state.record.owner {
                    return Err(LedgerError::NotAuthorized {
                        record_id,
                        actor: *actor,
                        action: "request access to their own record",
                    });
                }
                Ok(())
            }

            ActionPayload::Approve(p) => {
                state.pending_request(record_id, &p.request_id)?;
                if p.wrapped_key.data_key_id != state.record.data_key_id {
                    return Err(LedgerError::InvalidPayload {
                        record_id,
                        reason: format!(
                            "wrapped key is for data key {}, record uses {}",
                            p.wrapped_key.data_key_id, state.record.data_key_id
                        ),
                    });
                }
                Ok(())
            }

            ActionPayload::Deny(p) => {
                state.pending_request(record_id, &p.request_id)?;
                Ok(())
            }

            ActionPayload::Revoke(p) => {
                let grant = state
                    .grants
                    .get(&p.grant_id)
                    .ok_or(LedgerError::GrantNotFound {
                        record_id,
                        grant_id: p.grant_id,
                    })?;
                if !grant.is_active() {
                    return Err(LedgerError::LedgerConflict {
                        record_id,
                        reason: format!("grant {} already revoked", p.grant_id),
                    });
                }
                Ok(())
            }

            ActionPayload::Rekey(p) => {
                if p.previous_data_key_id != state.record.data_key_id {
                    return Err(LedgerError::LedgerConflict {
                        record_id,
                        reason: format!(
                            "re-key from data key {} but record uses {}",
                            p.previous_data_key_id, state.record.data_key_id
                        ),
                    });
                }
                if p.data_key_id == p.previous_data_key_id {
                    return Err(LedgerError::InvalidPayload {
                        record_id,
                        reason: "re-key must change the data key".into(),
                    });
                }
                check_owner_key(record_id, &p.owner_key, &p.data_key_id)?;

                let mut covered = Vec::with_capacity(p.rewrapped.len());
                for (grant_id, wrapped) in &p.rewrapped {
                    let active = state
                        .grants
                        .get(grant_id)
                        .map(GrantView::is_active)
                        .unwrap_or(false);
                    if !active {
                        return Err(LedgerError::InvalidPayload {
                            record_id,
                            reason: format!("re-wrapped key for inactive grant {}", grant_id),
                        });
                    }
                    if wrapped.data_key_id != p.data_key_id {
                        return Err(LedgerError::InvalidPayload {
                            record_id,
                            reason: format!("re-wrapped key for grant {} is stale", grant_id),
                        });
                    }
                    covered.push(*grant_id);
                }
                covered.sort();
                covered.dedup();

                let active: Vec<GrantId> = state
                    .grants
                    .values()
                    .filter(|g| g.is_active())
                    .map(|g| g.grant_id)
                    .collect();
                if covered != active || covered.len() != p.rewrapped.len() {
                    return Err(LedgerError::LedgerConflict {
                        record_id,
                        reason: "re-key does not cover exactly the active grants".into(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Fold a transaction into the state.
    ///
    /// The transaction must extend the record's head and pass [`check`]
    /// for its signer. On error the state is unchanged.
    ///
    /// [`check`]: AccessState::check
    pub fn apply(&mut self, tx: &Transaction) -> Result<()> {
        let record_id = *tx.record_id();
        let head = self.head(&record_id);
        ChainHead::check_extends(head.as_ref(), &tx.header).map_err(|e| {
            LedgerError::LedgerConflict {
                record_id,
                reason: e.to_string(),
            }
        })?;

        let payload = ActionPayload::decode(tx.action(), &tx.payload)?;
        self.check(&record_id, tx.actor(), &payload)?;

        let tx_id = tx.compute_id();
        self.fold(tx, tx_id, payload);
        Ok(())
    }

    fn fold(&mut self, tx: &Transaction, tx_id: TxId, payload: ActionPayload) {
        let record_id = *tx.record_id();
        let at = tx.timestamp();
        let new_head = ChainHead {
            seq: tx.seq(),
            tx_id,
        };

        if let ActionPayload::Register(p) = payload {
            self.records.insert(
                record_id,
                RecordState {
                    record: RecordView {
                        record_id,
                        owner: *tx.actor(),
                        content_address: p.content_address,
                        data_key_id: p.data_key_id,
                        size: p.size,
                        version: 1,
                        created_at: at,
                        metadata: p.metadata,
                        owner_key: p.owner_key,
                        head: new_head,
                    },
                    requests: BTreeMap::new(),
                    grants: BTreeMap::new(),
                    history: vec![tx.clone()],
                },
            );
            return;
        }

        let Some(state) = self.records.get_mut(&record_id) else {
            return;
        };

        match payload {
            ActionPayload::Register(_) => {}

            ActionPayload::Request(p) => {
                let request_id = RequestId::from(tx_id);
                state.requests.insert(
                    request_id,
                    RequestView {
                        request_id,
                        record_id,
                        record_owner: state.record.owner,
                        requester: *tx.actor(),
                        reason: p.reason,
                        display_name: p.display_name,
                        requested_at: at,
                        status: RequestStatus::Pending,
                        decided_at: None,
                        grant_id: None,
                    },
                );
                self.request_index.insert(request_id, record_id);
            }

            ActionPayload::Approve(p) => {
                let grant_id = GrantId::from(tx_id);
                if let Some(request) = state.requests.get_mut(&p.request_id) {
                    request.status = RequestStatus::Approved;
                    request.decided_at = Some(at);
                    request.grant_id = Some(grant_id);

                    state.grants.insert(
                        grant_id,
                        GrantView {
                            grant_id,
                            request_id: p.request_id,
                            record_id,
                            grantee: request.requester,
                            wrapped_key: p.wrapped_key,
                            granted_at: at,
                            revoked_at: None,
                        },
                    );
                    self.grant_index.insert(grant_id, record_id);
                }
            }

            ActionPayload::Deny(p) => {
                if let Some(request) = state.requests.get_mut(&p.request_id) {
                    request.status = RequestStatus::Denied;
                    request.decided_at = Some(at);
                }
            }

            ActionPayload::Revoke(p) => {
                if let Some(grant) = state.grants.get_mut(&p.grant_id) {
                    grant.revoked_at = Some(at);
                }
            }

            ActionPayload::Rekey(p) => {
                state.record.content_address = p.content_address;
                state.record.data_key_id = p.data_key_id;
                state.record.size = p.size;
                state.record.owner_key = p.owner_key;
                state.record.version += 1;
                for (grant_id, wrapped) in p.rewrapped {
                    if let Some(grant) = state.grants.get_mut(&grant_id) {
                        grant.wrapped_key = wrapped;
                    }
                }
            }
        }

        state.record.head = new_head;
        state.history.push(tx.clone());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn record(&self, record_id: &RecordId) -> Result<&RecordView> {
        self.records
            .get(record_id)
            .map(|s| &s.record)
            .ok_or(LedgerError::RecordNotFound(*record_id))
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&RequestView> {
        let record_id = self.request_index.get(request_id)?;
        self.records.get(record_id)?.requests.get(request_id)
    }

    pub fn grant(&self, grant_id: &GrantId) -> Option<&GrantView> {
        let record_id = self.grant_index.get(grant_id)?;
        self.records.get(record_id)?.grants.get(grant_id)
    }

    /// The principal's active grant on a record, if any.
    pub fn active_grant_for(
        &self,
        record_id: &RecordId,
        principal: &PrincipalId,
    ) -> Option<&GrantView> {
        self.records
            .get(record_id)?
            .grants
            .values()
            .find(|g| g.grantee == *principal && g.is_active())
    }

    pub fn grants_for_record(&self, record_id: &RecordId) -> Vec<&GrantView> {
        self.records
            .get(record_id)
            .map(|s| s.grants.values().collect())
            .unwrap_or_default()
    }

    pub fn requests_for_record(&self, record_id: &RecordId) -> Vec<&RequestView> {
        self.records
            .get(record_id)
            .map(|s| s.requests.values().collect())
            .unwrap_or_default()
    }

    pub fn history(&self, record_id: &RecordId) -> &[Transaction] {
        self.records
            .get(record_id)
            .map(|s| s.history.as_slice())
            .unwrap_or_default()
    }

    /// Whether this exact transaction is already folded at its position.
    pub fn contains(&self, tx: &Transaction) -> bool {
        let Some(index) = tx.seq().checked_sub(1) else {
            return false;
        };
        self.history(tx.record_id())
            .get(index as usize)
            .is_some_and(|folded| folded.compute_id() == tx.compute_id())
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordView> {
        self.records.values().map(|s| &s.record)
    }

    pub fn requests(&self) -> impl Iterator<Item = &RequestView> {
        self.records.values().flat_map(|s| s.requests.values())
    }

    pub fn grants(&self) -> impl Iterator<Item = &GrantView> {
        self.records.values().flat_map(|s| s.grants.values())
    }
}

fn check_owner_key(
    record_id: RecordId,
    owner_key: &WrappedKey,
    data_key_id: &DataKeyId,
) -> Result<()> {
    if owner_key.data_key_id != *data_key_id {
        return Err(LedgerError::InvalidPayload {
            record_id,
            reason: format!(
                "owner key is for data key {}, payload uses {}",
                owner_key.data_key_id, data_key_id
            ),
        });
    }
    Ok(())
}

impl RecordState {
    fn pending_request(&self, record_id: RecordId, request_id: &RequestId) -> Result<()> {
        let request = self
            .requests
            .get(request_id)
            .ok_or(LedgerError::RequestNotFound {
                record_id,
                request_id: *request_id,
            })?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::LedgerConflict {
                record_id,
                reason: format!(
                    "request {} is already {:?}",
                    request_id, request.status
                ),
            });
        }
        Ok(())
    }
}
