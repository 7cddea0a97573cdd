//! One-shot migration from the legacy flat schema (name/phone/email columns
//! on a single `contacts` table) to the normalized two-table schema.

use chrono::Local;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::schema::SCHEMA;
use super::Database;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy store existed; an empty normalized schema was created.
    FreshInit,
    /// The store already carries the `is_favorite` marker column.
    AlreadyMigrated,
    Migrated { migrated: usize, failed: usize },
}

#[derive(Debug)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
    pub backup_path: Option<PathBuf>,
}

/// Migrate the database at `path` to the normalized schema.
///
/// The legacy file is copied to a timestamped backup before anything is
/// mutated; a failed backup aborts with the original untouched. A failure
/// during the transform restores the file from that backup. Individual bad
/// legacy rows are counted and skipped, never aborting the batch.
pub fn migrate(path: &Path) -> Result<MigrationReport> {
    if !path.exists() {
        Database::open_at(path.to_path_buf())?;
        return Ok(MigrationReport {
            outcome: MigrationOutcome::FreshInit,
            backup_path: None,
        });
    }

    // Inspect before deciding; the connection must be closed again before
    // the file is copied.
    {
        let conn = Connection::open(path)?;
        if !table_exists(&conn, "contacts")? {
            conn.execute_batch(SCHEMA)?;
            return Ok(MigrationReport {
                outcome: MigrationOutcome::FreshInit,
                backup_path: None,
            });
        }
        if table_columns(&conn, "contacts")?.iter().any(|c| c == "is_favorite") {
            return Ok(MigrationReport {
                outcome: MigrationOutcome::AlreadyMigrated,
                backup_path: None,
            });
        }
    }

    let backup_path = backup_path_for(path);
    std::fs::copy(path, &backup_path).map_err(|e| {
        Error::Backup(format!("could not back up {}: {}", path.display(), e))
    })?;

    match transform(path) {
        Ok((migrated, failed)) => Ok(MigrationReport {
            outcome: MigrationOutcome::Migrated { migrated, failed },
            backup_path: Some(backup_path),
        }),
        Err(err) => {
            eprintln!("Migration failed: {}", err);
            match std::fs::copy(&backup_path, path) {
                Ok(_) => eprintln!(
                    "Restored original database from {}",
                    backup_path.display()
                ),
                Err(restore_err) => eprintln!("Failed to restore backup: {}", restore_err),
            }
            Err(err)
        }
    }
}

fn transform(path: &Path) -> Result<(usize, usize)> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Column positions are discovered at runtime, never assumed fixed.
    let columns = table_columns(&conn, "contacts")?;
    let index_of = |name: &str| columns.iter().position(|c| c == name);

    let name_idx = index_of("name")
        .ok_or_else(|| Error::Schema("legacy contacts table has no name column".into()))?;
    let phone_idx = index_of("phone");
    let email_idx = index_of("email");

    // Contact-book scale is small; read the whole legacy table up front.
    let rows = read_legacy_rows(&conn)?;

    conn.execute_batch("DROP TABLE contacts;")?;
    conn.execute_batch(SCHEMA)?;

    let mut migrated = 0usize;
    let mut failed = 0usize;
    for cells in &rows {
        match migrate_row(&conn, cells, name_idx, phone_idx, email_idx) {
            Ok(()) => migrated += 1,
            Err(e) => {
                failed += 1;
                eprintln!("Skipping legacy row: {}", e);
            }
        }
    }

    Ok((migrated, failed))
}

/// Every cell of every legacy row, stringified. Types in the legacy table are
/// whatever the old application wrote, so integers and floats are rendered to
/// text and NULLs kept as absent.
fn read_legacy_rows(conn: &Connection) -> Result<Vec<Vec<Option<String>>>> {
    let mut stmt = conn.prepare("SELECT * FROM contacts")?;
    let column_count = stmt.column_count();

    let rows = stmt
        .query_map([], |row| {
            let mut cells = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let cell = match row.get_ref(i)? {
                    ValueRef::Null => None,
                    ValueRef::Integer(n) => Some(n.to_string()),
                    ValueRef::Real(f) => Some(f.to_string()),
                    ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => None,
                };
                cells.push(cell);
            }
            Ok(cells)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn migrate_row(
    conn: &Connection,
    cells: &[Option<String>],
    name_idx: usize,
    phone_idx: Option<usize>,
    email_idx: Option<usize>,
) -> Result<()> {
    // A row shorter than an expected index is treated as having absent values.
    let cell = |idx: usize| cells.get(idx).and_then(|c| c.as_deref());

    // Legacy ids are discarded; the insert generates a fresh one. A missing
    // name inserts NULL and fails this row, which the caller counts.
    let name = cell(name_idx);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO contacts (name, is_favorite, created_time) VALUES (?, 0, ?)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    let contact_id = tx.last_insert_rowid();

    for (idx, method_type) in [(phone_idx, "phone"), (email_idx, "email")] {
        if let Some(value) = idx.and_then(cell) {
            let value = value.trim();
            if !value.is_empty() {
                tx.execute(
                    "INSERT INTO contact_methods (contact_id, method_type, method_value) VALUES (?, ?, ?)",
                    params![contact_id, method_type, value],
                )?;
            }
        }
    }

    tx.commit()?;
    Ok(())
}

fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contacts".to_string());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    path.with_file_name(format!("{}_backup_{}.db", stem, timestamp))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}
