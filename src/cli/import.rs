use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;

use crate::db::Database;

/// Import contacts from a CSV file, reporting per-row failures.
pub fn run_import(db_path: &Path, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }

    let db = Database::open_at(db_path.to_path_buf())?;
    let reader = File::open(file)
        .with_context(|| format!("failed to open {}", file.display()))?;

    println!("Importing: {}", file.display());
    let report = db.import_csv(reader)?;

    println!("Imported {} contacts", report.success_count);
    if report.error_count > 0 {
        println!("Failed rows: {}", report.error_count);
        for error in &report.errors {
            eprintln!("  {}", error);
        }
    }

    Ok(())
}
