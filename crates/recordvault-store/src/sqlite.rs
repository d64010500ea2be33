//! SQLite implementation of the storage traits.
//!
//! This is the durable backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use recordvault_core::{
    canonical_bytes, decode_transaction, now_millis, ChainHead, ContentAddress, HashAlgorithm,
    RecordId, Transaction, TxId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{admit, ContentStore, LedgerBackend, SubmitResult};

/// SQLite-based content store and ledger backend.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    algorithm: HashAlgorithm,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Address new blobs with `algorithm` instead of BLAKE3.
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn id_from_blob(bytes: Vec<u8>, column: &str) -> Result<TxId> {
    TxId::try_from(bytes.as_slice())
        .map_err(|_| StoreError::Serialization(format!("{} is not 32 bytes", column)))
}

fn head_of(conn: &Connection, record_id: &RecordId) -> Result<Option<ChainHead>> {
    let row: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT seq, tx_id FROM transactions
             WHERE record_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![record_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((seq, tx_id)) => Ok(Some(ChainHead {
            seq: seq as u64,
            tx_id: id_from_blob(tx_id, "tx_id")?,
        })),
        None => Ok(None),
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    async fn put(&self, bytes: Bytes) -> Result<ContentAddress> {
        let address = ContentAddress::compute(self.algorithm, &bytes);

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO blobs (address, algorithm, size, bytes, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    address.to_string(),
                    address.algorithm.as_str(),
                    bytes.len() as i64,
                    bytes.as_ref(),
                    now_millis(),
                ],
            )?;
            Ok(address)
        })
        .await
    }

    async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
        let key = address.to_string();

        self.blocking(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT bytes FROM blobs WHERE address = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            bytes.map(Bytes::from).ok_or(StoreError::NotFound(key))
        })
        .await
    }
}

#[async_trait]
impl LedgerBackend for SqliteStore {
    async fn submit_transaction(&self, tx: &Transaction) -> Result<SubmitResult> {
        let tx = tx.clone();

        self.blocking(move |conn| {
            let db_tx = conn.transaction()?;
            let tx_id = tx.compute_id();
            let record_id = *tx.record_id();

            let already_present = db_tx
                .query_row(
                    "SELECT 1 FROM transactions WHERE tx_id = ?1",
                    params![tx_id.as_bytes().as_slice()],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();

            let at_position: Option<Vec<u8>> = db_tx
                .query_row(
                    "SELECT tx_id FROM transactions WHERE record_id = ?1 AND seq = ?2",
                    params![record_id.as_bytes().as_slice(), tx.seq() as i64],
                    |row| row.get(0),
                )
                .optional()?;
            let at_position = at_position
                .map(|b| id_from_blob(b, "tx_id"))
                .transpose()?;

            let head = head_of(&db_tx, &record_id)?;

            if let Some(result) = admit(&tx, already_present, at_position, head.as_ref())? {
                return Ok(result);
            }

            db_tx.execute(
                "INSERT INTO transactions (
                    tx_id, record_id, seq, actor, timestamp, action,
                    prev_tx_id, canonical_bytes, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    tx_id.as_bytes().as_slice(),
                    record_id.as_bytes().as_slice(),
                    tx.seq() as i64,
                    tx.actor().as_bytes().as_slice(),
                    tx.timestamp(),
                    tx.action().to_u16() as i64,
                    tx.header.prev_tx_id.as_ref().map(|id| id.as_bytes().to_vec()),
                    canonical_bytes(&tx),
                    now_millis(),
                ],
            )?;
            db_tx.commit()?;

            Ok(SubmitResult::Accepted)
        })
        .await
    }

    async fn read_transactions(
        &self,
        record_id: &RecordId,
        after_seq: u64,
    ) -> Result<Vec<Transaction>> {
        let record_id = *record_id;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT canonical_bytes FROM transactions
                 WHERE record_id = ?1 AND seq > ?2
                 ORDER BY seq",
            )?;

            let rows = stmt
                .query_map(
                    params![record_id.as_bytes().as_slice(), after_seq as i64],
                    |row| row.get::<_, Vec<u8>>(0),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.iter()
                .map(|bytes| {
                    decode_transaction(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
                })
                .collect()
        })
        .await
    }

    async fn list_records(&self) -> Result<Vec<RecordId>> {
        self.blocking(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT record_id FROM transactions ORDER BY record_id")?;

            let rows = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|bytes| {
                    RecordId::try_from(bytes.as_slice())
                        .map_err(|_| StoreError::Serialization("record_id is not 32 bytes".into()))
                })
                .collect()
        })
        .await
    }

    async fn head(&self, record_id: &RecordId) -> Result<Option<ChainHead>> {
        let record_id = *record_id;
        self.blocking(move |conn| head_of(conn, &record_id)).await
    }
}
