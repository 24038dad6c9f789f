use chrono::NaiveDateTime;
use thiserror::Error;

use zlogscope_types::LogLevel;

/// Number of bracketed fields leading every header line
pub const HEADER_FIELDS: usize = 5;

/// Prepended to the two-digit year the logger writes
const CENTURY_PREFIX: &str = "20";

/// Recoverable problems found while reading a log stream
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {HEADER_FIELDS} bracketed fields, found {found}")]
    TooFewFields { found: usize },

    #[error("invalid thread id '{0}'")]
    InvalidThreadId(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("unknown log level '{0}'")]
    InvalidLevel(String),

    /// A continuation line with no entry to attach to
    #[error("line is not part of any entry")]
    UnparsedLine,
}

/// The decomposed first line of an entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub level: LogLevel,
    pub thread_id: u64,
    pub timestamp: NaiveDateTime,
    pub location: String,
    pub function: String,
    pub first_line: String,
}

/// Parser for `[LEVEL][ TID][TIMESTAMP][PATH:LINE][FUNC()] message` headers
pub struct LogParser;

impl LogParser {
    /// Whether a line opens a new entry
    pub fn is_header(line: &str) -> bool {
        line.starts_with('[')
    }

    /// Split a header line into its five raw fields and the message text.
    /// Fields are stripped of their brackets and surrounding whitespace.
    pub fn split_header(line: &str) -> Result<([&str; HEADER_FIELDS], &str), ParseError> {
        let pieces: Vec<&str> = line.splitn(HEADER_FIELDS + 1, ']').collect();
        // One piece per closing bracket, plus the message after the last one
        if pieces.len() <= HEADER_FIELDS {
            return Err(ParseError::TooFewFields {
                found: pieces.len() - 1,
            });
        }

        let mut fields = [""; HEADER_FIELDS];
        for (slot, piece) in fields.iter_mut().zip(&pieces) {
            *slot = Self::strip_field(piece);
        }
        Ok((fields, pieces[HEADER_FIELDS].trim()))
    }

    fn strip_field(piece: &str) -> &str {
        piece.trim().trim_start_matches('[').trim()
    }

    /// Parse a complete header line, coercing each field
    pub fn parse_header(line: &str) -> Result<Header, ParseError> {
        let ([level, tid, time, location, function], message) = Self::split_header(line)?;

        let level = LogLevel::parse(level).ok_or_else(|| ParseError::InvalidLevel(level.to_string()))?;
        let thread_id = tid
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidThreadId(tid.to_string()))?;
        let timestamp = Self::normalize_timestamp(time)?;

        Ok(Header {
            level,
            thread_id,
            timestamp,
            location: location.to_string(),
            function: function.to_string(),
            first_line: message.to_string(),
        })
    }

    /// Parse the logger's `YY-MM-DDTHH:MM:SS.ffffff` timestamp. A four-digit
    /// year is accepted as is.
    pub fn normalize_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
        let short_year = raw.find('-') == Some(2);
        let mut normalized = String::with_capacity(raw.len() + CENTURY_PREFIX.len());
        if short_year {
            normalized.push_str(CENTURY_PREFIX);
        }
        normalized.push_str(&raw.replacen('T', " ", 1));

        NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
    }
}
