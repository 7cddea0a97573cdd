use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod export;
pub mod import;
pub mod migrate;
pub mod stats;

pub use export::run_export;
pub use import::run_import;
pub use migrate::run_migrate;
pub use stats::run_stats;

use crate::db::Database;

#[derive(Parser)]
#[command(name = "contactbook")]
#[command(about = "Contact book service with favorites, search, and CSV import/export")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
    /// Migrate a legacy flat database to the normalized schema
    Migrate(DbArgs),
    /// Export all contacts to a CSV file
    Export(FileArgs),
    /// Import contacts from a CSV file
    Import(FileArgs),
    /// Show aggregate contact counts
    Stats(DbArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Database file (defaults to the per-user config directory)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Args)]
pub struct DbArgs {
    /// Database file (defaults to the per-user config directory)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Args)]
pub struct FileArgs {
    /// CSV file to read or write
    pub file: PathBuf,

    /// Database file (defaults to the per-user config directory)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn resolve_db_path(db: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(Database::default_path()?),
    }
}
