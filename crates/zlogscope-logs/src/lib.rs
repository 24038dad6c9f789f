//! Log processing for zlogscope
//!
//! This crate turns raw node log files into structured entries and feeds
//! them into per-node indexes.

mod ingest;
mod parser;
mod stats;
mod stream;

pub use ingest::{DEFAULT_BATCH_SIZE, IngestError, IngestOptions, IngestReport, index_file, index_files, node_name};
pub use parser::{Header, LogParser, ParseError};
pub use stats::{LevelCounts, StreamStats};
pub use stream::LogStream;

// Re-export types used in our public API
pub use zlogscope_types::{LogEntry, LogLevel};
