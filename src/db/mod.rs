use rusqlite::Connection;
use std::path::PathBuf;

use crate::error::{Error, Result};

mod contacts;
pub mod migrate;
mod schema;
pub mod transfer;

pub use contacts::attach_methods;
pub use migrate::{migrate, MigrationOutcome, MigrationReport};
pub use transfer::{ExportRow, ImportRecord, ImportReport};

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the default per-user database, creating it if needed.
    pub fn open() -> Result<Self> {
        Self::open_at(Self::default_path()?)
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;

        Ok(Self { conn })
    }

    /// Open in-memory database for testing
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;

        Ok(Self { conn })
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not find config directory",
            ))
        })?;
        Ok(config_dir.join("contactbook").join("contacts.db"))
    }

    #[allow(dead_code)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(db: &Database) -> Vec<String> {
        db.conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_open_memory_creates_both_tables() {
        let db = Database::open_memory().unwrap();
        let tables = table_names(&db);

        assert!(tables.contains(&"contacts".to_string()));
        assert!(tables.contains(&"contact_methods".to_string()));
    }

    #[test]
    fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.db");

        {
            let db = Database::open_at(path.clone()).unwrap();
            db.add_contact("Ada", false, &[]).unwrap();
        }

        // Reopening runs schema creation again; existing data survives.
        let db = Database::open_at(path).unwrap();
        assert_eq!(db.stats().unwrap().total_contacts, 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::open_memory().unwrap();
        let result = db.conn.execute(
            "INSERT INTO contact_methods (contact_id, method_type, method_value) VALUES (999, 'phone', '555')",
            [],
        );
        assert!(result.is_err());
    }
}
