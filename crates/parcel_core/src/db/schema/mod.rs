//! Parcel table schema bootstrap.
//!
//! # Responsibility
//! - Create the `parcel` table on a fresh database.
//! - Refuse databases written by a newer schema.
//!
//! # Invariants
//! - The applied schema version is mirrored to `PRAGMA user_version`.
//! - Bootstrap runs inside one immediate transaction.

use crate::db::{DbError, DbResult};
use rusqlite::{Connection, TransactionBehavior};

const SCHEMA_VERSION: u32 = 1;
const SCHEMA_SQL: &str = include_str!("0001_parcel.sql");

/// Returns the schema version known by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_VERSION
}

/// Ensures the parcel schema exists on the provided connection.
///
/// Concurrent openers of a fresh file take the write lock in turn; the
/// version is re-read under that lock so only the first one creates tables.
pub fn ensure_schema(conn: &mut Connection) -> DbResult<()> {
    if check_version(current_user_version(conn)?)? {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if check_version(current_user_version(&tx)?)? {
        return Ok(());
    }
    tx.execute_batch(SCHEMA_SQL)?;
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;

    Ok(())
}

/// Returns `true` when the schema is already current.
fn check_version(current_version: u32) -> DbResult<bool> {
    if current_version > SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: SCHEMA_VERSION,
        });
    }
    Ok(current_version == SCHEMA_VERSION)
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
