//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use recordvault_core::now_millis;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = schema_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// The highest applied migration, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: blobs and the transaction log.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Content-addressed blobs
        CREATE TABLE blobs (
            address TEXT PRIMARY KEY,         -- "<algorithm>:<hex digest>"
            algorithm TEXT NOT NULL,
            size INTEGER NOT NULL,
            bytes BLOB NOT NULL,
            stored_at INTEGER NOT NULL        -- local timestamp (Unix ms)
        );

        -- Transactions: one row per ledger entry
        CREATE TABLE transactions (
            tx_id BLOB PRIMARY KEY,           -- 32 bytes, Blake3 of canonical bytes
            record_id BLOB NOT NULL,          -- 32 bytes
            seq INTEGER NOT NULL,             -- position in the record's log
            actor BLOB NOT NULL,              -- 32 bytes, Ed25519 public key
            timestamp INTEGER NOT NULL,       -- actor-claimed timestamp (Unix ms)
            action INTEGER NOT NULL,          -- Action as u16
            prev_tx_id BLOB,                  -- 32 bytes, NULL for seq=1
            canonical_bytes BLOB NOT NULL,    -- header || payload || signature
            ingested_at INTEGER NOT NULL,     -- local timestamp of ingestion

            UNIQUE(record_id, seq)
        );

        CREATE INDEX idx_transactions_record_seq ON transactions(record_id, seq);
        "#,
    )?;

    Ok(())
}

/// Migration v2: lookup indexes for per-principal listings.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX idx_transactions_actor ON transactions(actor);
        CREATE INDEX idx_transactions_action ON transactions(action);
        "#,
    )?;

    Ok(())
}
