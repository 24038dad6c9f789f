//! Log index storage for zlogscope
//!
//! Each node's log is indexed into its own SQLite file. This crate owns the
//! schema, bulk insertion during ingestion, and the read queries used by the
//! listing, search and call-stack commands.

mod error;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use schema::ItemField;
pub use store::{ExistingIndex, LogStore, indexed_nodes};

// Re-export types used in our public API
pub use zlogscope_types::LogEntry;
