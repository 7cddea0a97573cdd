use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use crate::db::{transfer, Database};

/// Export every contact to a CSV file.
pub fn run_export(db_path: &Path, file: &Path) -> Result<()> {
    let db = Database::open_at(db_path.to_path_buf())?;
    let rows = db.export_rows()?;

    let writer = File::create(file)
        .with_context(|| format!("failed to create {}", file.display()))?;
    transfer::write_csv(&rows, writer)?;

    println!("Exported {} contacts to {}", rows.len(), file.display());
    Ok(())
}
