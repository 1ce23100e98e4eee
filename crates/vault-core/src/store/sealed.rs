//! SQL helpers for the durable side: the sealed table and the metadata
//! table.
//!
//! This layer performs no cryptography. Sealing and unsealing happen in
//! [`crate::store::Vault`]; what arrives here is already ciphertext.
//!
//! Persisted layout (stable across versions):
//! - `sealed (id TEXT PRIMARY KEY, secret BLOB)`: exactly one row holds
//!   the wrapped master key under the reserved id
//! - `metadata (name TEXT UNIQUE, int_value INT, text_value TEXT)`: the
//!   id counter and the application settings

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, VaultError};
use crate::id::ShortId;
use crate::model::SealedRecord;

/// Metadata key holding the last issued record id.
pub const RECORD_ID_COUNTER: &str = "record-id-counter";

/// Metadata key holding the base64 settings blob.
pub const SETTINGS_KEY: &str = "settings";

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sealed (
            id      TEXT PRIMARY KEY,
            secret  BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS metadata (
            name        TEXT NOT NULL UNIQUE,
            int_value   INT  NOT NULL DEFAULT 0,
            text_value  TEXT NOT NULL DEFAULT ''
        );
        "#,
    )?;
    Ok(())
}

pub fn get_sealed(conn: &Connection, id: &str) -> Result<Option<SealedRecord>> {
    let row = conn
        .query_row(
            "SELECT id, secret FROM sealed WHERE id = ?",
            [id],
            |row| {
                Ok(SealedRecord {
                    id: row.get(0)?,
                    secret: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn insert_sealed(conn: &Connection, sealed: &SealedRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO sealed (id, secret) VALUES (?, ?)",
        (&sealed.id, &sealed.secret),
    )?;
    Ok(())
}

/// Overwrite the ciphertext of an existing row.
pub fn update_sealed(conn: &Connection, sealed: &SealedRecord) -> Result<()> {
    let changed = conn.execute(
        "UPDATE sealed SET secret = ? WHERE id = ?",
        (&sealed.secret, &sealed.id),
    )?;
    if changed == 0 {
        return Err(VaultError::NotFound(sealed.id.clone()));
    }
    Ok(())
}

/// Delete a row, returning how many rows matched.
///
/// The key-record guard lives in the caller; this function deletes
/// whatever id it is given.
pub fn delete_sealed(conn: &Connection, id: &str) -> Result<usize> {
    let changed = conn.execute("DELETE FROM sealed WHERE id = ?", [id])?;
    Ok(changed)
}

/// Full scan of the sealed table, excluding the key-record.
pub fn all_sealed_except(conn: &Connection, key_record_id: &str) -> Result<Vec<SealedRecord>> {
    let mut stmt = conn.prepare("SELECT id, secret FROM sealed WHERE id <> ? ORDER BY id")?;
    let rows = stmt.query_map([key_record_id], |row| {
        Ok(SealedRecord {
            id: row.get(0)?,
            secret: row.get(1)?,
        })
    })?;

    let mut all = Vec::new();
    for row in rows {
        all.push(row?);
    }
    Ok(all)
}

pub fn get_text_value(conn: &Connection, name: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT text_value FROM metadata WHERE name = ?",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn update_text_value(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE metadata SET text_value = ? WHERE name = ?",
        (value, name),
    )?;
    if changed == 0 {
        return Err(VaultError::Storage(format!(
            "Metadata key missing: {}",
            name
        )));
    }
    Ok(())
}

/// Insert a metadata text value only if the key does not exist yet.
pub fn init_text_value(conn: &Connection, name: &str, value: &str) -> Result<()> {
    if get_text_value(conn, name)?.is_some() {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO metadata (name, text_value) VALUES (?, ?)",
        (name, value),
    )?;
    Ok(())
}

/// Issue the next record id.
///
/// Reads the last issued id, computes the successor and persists it.
/// Callers must run this inside the same transaction as the insert that
/// consumes the id: a crash can then skip an id but never issue one
/// twice.
pub fn next_id(conn: &Connection) -> Result<ShortId> {
    let current = get_text_value(conn, RECORD_ID_COUNTER)?
        .ok_or_else(|| VaultError::Storage("Record id counter missing".to_string()))?;
    let next = ShortId::parse(&current)?.next();
    update_text_value(conn, RECORD_ID_COUNTER, &next.to_string())?;
    Ok(next)
}
