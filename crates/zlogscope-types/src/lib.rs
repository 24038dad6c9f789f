//! Shared types for zlogscope
//!
//! This crate contains data structures used across multiple zlogscope crates.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Fatal,
}

impl LogLevel {
    /// Parse the level column of a log header. Matching is exact: the
    /// logger only ever writes these four spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level string is not one of the known levels
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// A single structured log record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Storage sequence id (0 until the entry has been stored)
    pub id: u64,

    pub level: LogLevel,

    pub thread_id: u64,

    pub timestamp: NaiveDateTime,

    /// Truncated `path:line`, cut from the left by the logger
    pub location: String,

    /// Truncated function name, cut from the right by the logger
    pub function: String,

    /// First message line plus any continuation lines, newline-joined
    pub message: String,
}

impl LogEntry {
    /// Create an entry that has not been stored yet
    pub fn new(
        level: LogLevel,
        thread_id: u64,
        timestamp: NaiveDateTime,
        location: impl Into<String>,
        function: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            level,
            thread_id,
            timestamp,
            location: location.into(),
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

/// Message payload written when a traced function is entered
pub const BEGIN_MARKER: &str = "BEG";

/// Message payload written when a traced function returns
pub const END_MARKER: &str = "END";

// ============================================================================
// Symbol Types
// ============================================================================

/// One known function definition from the external symbol table
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolTag {
    pub name: String,
    pub path: String,
    pub defined_at: u32,
}

impl SymbolTag {
    pub fn new(name: impl Into<String>, path: impl Into<String>, defined_at: u32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            defined_at,
        }
    }
}

/// Canonical `(name, path, line)` recovered from a truncated pair
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveredSymbol {
    pub name: String,
    pub path: String,
    pub line: u32,
}

impl RecoveredSymbol {
    pub fn new(name: impl Into<String>, path: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            line,
        }
    }

    /// `path:line` for display
    pub fn location(&self) -> String {
        format!("{}:{}", self.path, self.line)
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Storage and display format for timestamps (microsecond precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a timestamp the way it is stored
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a user or storage supplied timestamp.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD HH:MM:SS.f`,
/// with either a space or `T` between date and time.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    let normalized = s.replacen('T', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f").ok()
}

/// Short wall-clock form used in rendered call stacks, e.g. `12:00:01.25`
pub fn short_time(ts: &NaiveDateTime) -> String {
    let full = ts.format("%H:%M:%S%.6f").to_string();
    full.trim_end_matches('0').trim_end_matches('.').to_string()
}
