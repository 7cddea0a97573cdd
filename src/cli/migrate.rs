use anyhow::Result;
use std::path::Path;

use crate::db::{migrate, MigrationOutcome};

/// Execute the one-shot migration and print the report.
pub fn run_migrate(db_path: &Path) -> Result<()> {
    println!("Migrating {}", db_path.display());

    let report = migrate(db_path)?;
    match report.outcome {
        MigrationOutcome::FreshInit => {
            println!("No legacy database found; created an empty schema");
        }
        MigrationOutcome::AlreadyMigrated => {
            println!("Database already uses the normalized schema; nothing to do");
        }
        MigrationOutcome::Migrated { migrated, failed } => {
            println!("Migrated {} contacts", migrated);
            if failed > 0 {
                println!("Failed to migrate {} rows", failed);
            }
            if let Some(backup) = report.backup_path {
                println!("Legacy database backed up to {}", backup.display());
            }
        }
    }

    Ok(())
}
