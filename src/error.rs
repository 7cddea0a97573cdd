use thiserror::Error;

/// Failure taxonomy for the contact book.
///
/// Per-row import failures are collected into an `ImportReport` rather than
/// returned through this type; `ImportRow` exists so they carry a line
/// reference when they are formatted.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("contact {0} not found")]
    NotFound(i64),

    #[error("legacy schema error: {0}")]
    Schema(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("row {line}: {message}")]
    ImportRow { line: usize, message: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code this error maps to at the API edge.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }
}
