//! Per-record write locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use recordvault_core::RecordId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes state-changing operations on the same record.
///
/// Operations on different records never wait on each other. Guards are
/// owned, so a spawned task can hold one across awaits.
#[derive(Debug, Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<RecordId, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a record.
    pub async fn lock(&self, record_id: &RecordId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(*record_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of records with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
