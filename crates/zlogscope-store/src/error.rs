use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested node has no index file
    #[error("node '{0}' is not indexed")]
    NodeNotIndexed(String),

    #[error("log index file {} already exists", .0.display())]
    IndexExists(PathBuf),

    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("index dir {} does not exist", .0.display())]
    IndexDirMissing(PathBuf),

    /// `search` was issued against an index that was never finalized
    #[error("node '{0}' has no full-text index")]
    NoFullTextIndex(String),

    #[error("row {id}: {reason}")]
    InvalidRow { id: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
