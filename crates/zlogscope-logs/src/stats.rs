use zlogscope_types::LogLevel;

use crate::parser::ParseError;

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub debug: usize,
    pub info: usize,
    pub warning: usize,
    pub fatal: usize,
}

impl LevelCounts {
    pub fn increment(&mut self, level: LogLevel) {
        match level {
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warning => self.warning += 1,
            LogLevel::Fatal => self.fatal += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.debug + self.info + self.warning + self.fatal
    }

    /// Fold another file's counts into these
    pub fn add(&mut self, other: &LevelCounts) {
        self.debug += other.debug;
        self.info += other.info;
        self.warning += other.warning;
        self.fatal += other.fatal;
    }
}

/// What a `LogStream` saw while reading its input
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Physical lines read
    pub lines: u64,

    /// Entries yielded
    pub entries: u64,

    /// Header lines with fewer than five bracketed fields
    pub short_headers: u64,

    /// Headers whose fields failed coercion (entry discarded)
    pub bad_fields: u64,

    /// Continuation lines that arrived with no entry in progress
    pub orphan_lines: u64,
}

impl StreamStats {
    pub(crate) fn record_error(&mut self, err: &ParseError) {
        match err {
            ParseError::TooFewFields { .. } => self.short_headers += 1,
            ParseError::InvalidThreadId(_)
            | ParseError::InvalidTimestamp(_)
            | ParseError::InvalidLevel(_) => self.bad_fields += 1,
            ParseError::UnparsedLine => self.orphan_lines += 1,
        }
    }

    /// Total number of reported parse errors
    pub fn errors(&self) -> u64 {
        self.short_headers + self.bad_fields + self.orphan_lines
    }
}
