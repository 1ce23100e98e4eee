//! SQL helpers for the working cache: an in-memory, fully decrypted
//! mirror of the sealed store used for listing and search.
//!
//! The cache holds records and a history *index* (id -> owning record),
//! never the sealed bundles. It is rebuilt from the sealed store at
//! sign-in and discarded at process end; nothing here is durable.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, VaultError};
use crate::model::{HistoryEntry, Record, RecordWithHistory, REDACTED_PASSWORD};

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE record (
            id           TEXT PRIMARY KEY,
            title        TEXT NOT NULL,
            label        TEXT NOT NULL,
            username     TEXT NOT NULL,
            password     TEXT NOT NULL,
            notes        TEXT NOT NULL,
            created_at   INT  NOT NULL,
            modified_at  INT  NOT NULL
        );

        CREATE TABLE history (
            id          TEXT PRIMARY KEY,
            record_id   TEXT NOT NULL REFERENCES record(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            username    TEXT NOT NULL,
            password    TEXT NOT NULL,
            notes       TEXT NOT NULL,
            created_at  INT  NOT NULL
        );

        CREATE INDEX history_record_id ON history(record_id);
        "#,
    )?;
    Ok(())
}

pub fn insert_record(conn: &Connection, record: &Record) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO record (id, title, label, username, password, notes, created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        (
            &record.id,
            &record.title,
            &record.label,
            &record.username,
            &record.password,
            &record.notes,
            record.created_at,
            record.modified_at,
        ),
    )?;
    Ok(())
}

pub fn insert_history(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO history (id, record_id, title, username, password, notes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        (
            &entry.id,
            &entry.record_id,
            &entry.title,
            &entry.username,
            &entry.password,
            &entry.notes,
            entry.created_at,
        ),
    )?;
    Ok(())
}

/// Insert a whole decrypted bundle: the record plus its history index.
pub fn insert_bundle(conn: &Connection, bundle: &RecordWithHistory) -> Result<()> {
    insert_record(conn, &bundle.record)?;
    for entry in &bundle.history {
        insert_history(conn, entry)?;
    }
    Ok(())
}

/// Overwrite the mutable fields of a cached record.
pub fn update_record(conn: &Connection, record: &Record) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE record
        SET title = ?, label = ?, username = ?, password = ?, notes = ?, modified_at = ?
        WHERE id = ?
        "#,
        (
            &record.title,
            &record.label,
            &record.username,
            &record.password,
            &record.notes,
            record.modified_at,
            &record.id,
        ),
    )?;
    if changed == 0 {
        return Err(VaultError::NotFound(record.id.clone()));
    }
    Ok(())
}

/// Delete a cached record; history rows cascade. Returns rows matched.
pub fn delete_record(conn: &Connection, id: &str) -> Result<usize> {
    let changed = conn.execute("DELETE FROM record WHERE id = ?", [id])?;
    Ok(changed)
}

pub fn delete_history(conn: &Connection, history_id: &str) -> Result<usize> {
    let changed = conn.execute("DELETE FROM history WHERE id = ?", [history_id])?;
    Ok(changed)
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let n = conn.query_row("SELECT COUNT(*) FROM record", [], |row| row.get(0))?;
    Ok(n)
}

/// Drop every cached row, records and history index alike.
pub fn clear(conn: &Connection) -> Result<()> {
    conn.execute_batch("DELETE FROM history; DELETE FROM record;")?;
    Ok(())
}

const SIMPLE_COLUMNS: &str = "id, title, label, username, password, created_at, modified_at";

fn scan_simple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        title: row.get(1)?,
        label: row.get(2)?,
        username: row.get(3)?,
        password: row.get(4)?,
        notes: String::new(),
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
    })
}

/// Redact the password field in place: the caller learns whether a
/// password exists, never its value.
fn redact(mut record: Record) -> Record {
    if !record.password.is_empty() {
        record.password = REDACTED_PASSWORD.to_string();
    }
    record
}

/// All cached records, most recently touched first, passwords redacted
/// and notes omitted.
pub fn all_simple(conn: &Connection) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {} FROM record ORDER BY modified_at DESC, created_at DESC, id DESC",
        SIMPLE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_simple)?;

    let mut all = Vec::new();
    for row in rows {
        all.push(redact(row?));
    }
    Ok(all)
}

/// Records whose label equals `pattern` exactly.
pub fn by_label(conn: &Connection, pattern: &str) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {} FROM record WHERE label = ? ORDER BY modified_at DESC, created_at DESC, id DESC",
        SIMPLE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([pattern], scan_simple)?;

    let mut all = Vec::new();
    for row in rows {
        all.push(redact(row?));
    }
    Ok(all)
}

/// Records whose label equals `pattern` or whose title contains it.
pub fn by_label_and_title(conn: &Connection, pattern: &str) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {} FROM record WHERE label = ? OR title LIKE ? \
         ORDER BY modified_at DESC, created_at DESC, id DESC",
        SIMPLE_COLUMNS
    );
    let like = format!("%{}%", pattern);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map((pattern, like.as_str()), scan_simple)?;

    let mut all = Vec::new();
    for row in rows {
        all.push(redact(row?));
    }
    Ok(all)
}

/// The real (unredacted) password of one record.
pub fn password_of(conn: &Connection, id: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT password FROM record WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Look up the owning record of a history entry via the cache index.
pub fn record_id_of_history(conn: &Connection, history_id: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT record_id FROM history WHERE id = ?",
            [history_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}
