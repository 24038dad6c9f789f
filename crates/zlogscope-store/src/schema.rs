//! SQL schema for per-node log indexes
//!
//! Column names are part of the user surface: `query` takes a raw WHERE
//! clause over the `log` table, so they are kept short and stable.

use std::fmt;

/// Pragmas applied to a freshly created index. Ingestion is a one-shot bulk
/// load, so durability is traded for throughput.
pub const INGEST_PRAGMAS: &str = r#"
PRAGMA synchronous = OFF;
PRAGMA cache_size = -40000;
PRAGMA journal_mode = MEMORY;
"#;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS log (
    id          INTEGER  NOT NULL PRIMARY KEY AUTOINCREMENT,
    level       CHAR(8)  NOT NULL,
    tid         INTEGER  NOT NULL,
    puttime     CHAR(26) NOT NULL,
    fileline    CHAR(20),
    function    CHAR(20) NOT NULL,
    message     TEXT
);

CREATE TABLE IF NOT EXISTS items (
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (field, value)
);
"#;

/// Secondary indexes, built after bulk insertion
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS log_tid ON log (tid);
CREATE INDEX IF NOT EXISTS log_puttime ON log (puttime);
CREATE INDEX IF NOT EXISTS log_function ON log (function);
CREATE INDEX IF NOT EXISTS log_fileline ON log (fileline);
"#;

pub const CREATE_FULLTEXT: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS ftsidx USING fts5(
    message,
    content = 'log',
    content_rowid = 'id',
    tokenize = 'porter'
);
INSERT INTO ftsidx (rowid, message) SELECT id, message FROM log;
"#;

pub const INSERT_ENTRY: &str =
    "INSERT INTO log (level, tid, puttime, fileline, function, message) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

pub const SELECT_COLUMNS: &str = "SELECT id, level, tid, puttime, fileline, function, message FROM log";

/// Fields whose distinct values are materialized in the `items` table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemField {
    Level,
    Tid,
}

impl ItemField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Level => "level",
            Self::Tid => "tid",
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::Level, Self::Tid]
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
