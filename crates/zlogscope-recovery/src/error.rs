use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecoveryError>;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("location '{0}' has no ':' line separator")]
    MissingLineSeparator(String),

    #[error("location '{location}' has a non-numeric line number")]
    InvalidLineNumber { location: String },

    #[error("failed to read symbol table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("symbol table line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}
