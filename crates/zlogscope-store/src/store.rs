use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;
use tracing::{debug, info, warn};

use zlogscope_types::{BEGIN_MARKER, LogEntry, LogLevel, format_timestamp, parse_timestamp};

use crate::error::{Result, StoreError};
use crate::schema::{self, ItemField};

/// Index file extension; the file stem is the node name
const INDEX_EXTENSION: &str = "sqlite3";

/// Suffix of an index still being built
const STAGING_SUFFIX: &str = "part";

/// What to do when `create` finds an index file for the node already
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingIndex {
    #[default]
    Fail,
    Overwrite,
}

/// One node's log index
pub struct LogStore {
    node: String,
    path: Option<PathBuf>,
    /// Where a new index is built until `publish` moves it to `path`
    staging: Option<PathBuf>,
    conn: Connection,
}

/// Raw column values, converted into a `LogEntry` outside rusqlite's row
/// mapping so conversion failures carry the row id.
struct RawRow {
    id: i64,
    level: String,
    tid: i64,
    puttime: String,
    fileline: Option<String>,
    function: String,
    message: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            level: row.get(1)?,
            tid: row.get(2)?,
            puttime: row.get(3)?,
            fileline: row.get(4)?,
            function: row.get(5)?,
            message: row.get(6)?,
        })
    }

    fn into_entry(self) -> Result<LogEntry> {
        let id = self.id as u64;
        let level = LogLevel::parse(&self.level).ok_or_else(|| StoreError::InvalidRow {
            id,
            reason: format!("unknown level '{}'", self.level),
        })?;
        let timestamp = parse_timestamp(&self.puttime).ok_or_else(|| StoreError::InvalidRow {
            id,
            reason: format!("bad timestamp '{}'", self.puttime),
        })?;
        Ok(LogEntry {
            id,
            level,
            thread_id: self.tid as u64,
            timestamp,
            location: self.fileline.unwrap_or_default(),
            function: self.function,
            message: self.message.unwrap_or_default(),
        })
    }
}

impl LogStore {
    /// Path of the index file for `node` inside `dir`
    pub fn index_path(dir: &Path, node: &str) -> PathBuf {
        dir.join(format!("{node}.{INDEX_EXTENSION}"))
    }

    fn staging_path(dir: &Path, node: &str) -> PathBuf {
        dir.join(format!("{node}.{INDEX_EXTENSION}.{STAGING_SUFFIX}"))
    }

    /// Start a new, empty index for `node`, creating `dir` if needed.
    ///
    /// The index is built in a staging file that `indexed_nodes` and `open`
    /// do not see. `publish` replaces the node's index with it and `discard`
    /// throws it away; an existing index stays untouched until `publish`.
    pub fn create(dir: &Path, node: &str, existing: ExistingIndex) -> Result<Self> {
        if !dir.exists() {
            info!("creating index storage dir: {}", dir.display());
            fs::create_dir_all(dir)?;
        } else if !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir.to_path_buf()));
        }

        let path = Self::index_path(dir, node);
        if path.exists() {
            match existing {
                ExistingIndex::Fail => return Err(StoreError::IndexExists(path)),
                ExistingIndex::Overwrite => {
                    info!("existing index {} will be replaced", path.display());
                }
            }
        }

        // Left behind by an interrupted run
        let staging = Self::staging_path(dir, node);
        if staging.exists() {
            debug!("removing stale staging file {}", staging.display());
            fs::remove_file(&staging)?;
        }

        let conn = Connection::open(&staging)?;
        conn.execute_batch(schema::INGEST_PRAGMAS)?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Self {
            node: node.to_string(),
            path: Some(path),
            staging: Some(staging),
            conn,
        })
    }

    /// Close a store from `create` and move it into place as the node's
    /// index. A no-op for stores that were opened.
    pub fn publish(self) -> Result<()> {
        let Self {
            node,
            path,
            staging,
            conn,
        } = self;
        conn.close().map_err(|(_, err)| err)?;
        if let (Some(staging), Some(path)) = (staging, path) {
            fs::rename(&staging, &path)?;
            debug!(node = %node, "published {}", path.display());
        }
        Ok(())
    }

    /// Close a store from `create` and delete what was built so far
    pub fn discard(self) -> Result<()> {
        let Self {
            node,
            staging,
            conn,
            ..
        } = self;
        drop(conn);
        if let Some(staging) = staging {
            fs::remove_file(&staging)?;
            warn!(node = %node, "discarded partial index {}", staging.display());
        }
        Ok(())
    }

    /// Open the existing index for `node`
    pub fn open(dir: &Path, node: &str) -> Result<Self> {
        let path = Self::index_path(dir, node);
        if !path.is_file() {
            return Err(StoreError::NodeNotIndexed(node.to_string()));
        }
        let conn = Connection::open(&path)?;
        Ok(Self {
            node: node.to_string(),
            path: Some(path),
            staging: None,
            conn,
        })
    }

    /// In-memory index, used by tests and one-off analysis
    pub fn open_in_memory(node: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Self {
            node: node.to_string(),
            path: None,
            staging: None,
            conn,
        })
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert a batch of entries in one transaction. Returns the number of
    /// rows written.
    pub fn put_entries(&mut self, batch: &[LogEntry]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(schema::INSERT_ENTRY)?;
            for entry in batch {
                stmt.execute(params![
                    entry.level.as_str(),
                    entry.thread_id as i64,
                    format_timestamp(&entry.timestamp),
                    entry.location,
                    entry.function,
                    entry.message,
                ])?;
            }
        }
        tx.commit()?;
        debug!(node = %self.node, rows = batch.len(), "stored batch");
        Ok(batch.len())
    }

    /// Build the distinct-value table, secondary indexes and the full-text
    /// index. Called once after the last batch; indexing after insertion
    /// is much faster than maintaining indexes during the bulk load.
    pub fn finalize(&mut self) -> Result<()> {
        for field in ItemField::all() {
            let column = field.column();
            self.conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO items (field, value) SELECT DISTINCT '{column}', {column} FROM log"
                ),
                [],
            )?;
        }
        self.conn.execute_batch(schema::CREATE_INDEXES)?;
        self.conn.execute_batch(schema::CREATE_FULLTEXT)?;
        debug!(node = %self.node, "index finalized");
        Ok(())
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM log", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn select(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Entries whose timestamp lies within `[start, end]`, in storage order
    pub fn entries_in_range(
        &self,
        start: &NaiveDateTime,
        end: &NaiveDateTime,
    ) -> Result<Vec<LogEntry>> {
        self.select(
            &format!(
                "{} WHERE puttime BETWEEN ?1 AND ?2 ORDER BY id",
                schema::SELECT_COLUMNS
            ),
            params![format_timestamp(start), format_timestamp(end)],
        )
    }

    /// Entries matching a raw SQL WHERE clause over the `log` table
    pub fn query(&self, where_clause: &str) -> Result<Vec<LogEntry>> {
        self.select(
            &format!("{} WHERE {}", schema::SELECT_COLUMNS, where_clause),
            [],
        )
    }

    fn has_fulltext(&self) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'ftsidx'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Full-text search over messages. The query uses the FTS5 syntax:
    /// `AND`/`OR`/`NOT` and `*` as a prefix wildcard.
    pub fn full_text_search(&self, query: &str) -> Result<Vec<LogEntry>> {
        if !self.has_fulltext()? {
            return Err(StoreError::NoFullTextIndex(self.node.clone()));
        }
        self.select(
            &format!(
                "{} WHERE id IN (SELECT rowid FROM ftsidx WHERE ftsidx MATCH ?1) ORDER BY id",
                schema::SELECT_COLUMNS
            ),
            params![query],
        )
    }

    /// Distinct values of a materialized field
    pub fn distinct_values(&self, field: ItemField) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT value FROM items WHERE field = ?1 ORDER BY CAST(value AS INTEGER), value",
        )?;
        let values = stmt
            .query_map(params![field.column()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    /// Distinct `(function, location)` pairs that open a traced call
    pub fn begin_functions(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT function, fileline FROM log WHERE message = ?1 ORDER BY function, fileline",
        )?;
        let pairs = stmt
            .query_map(params![BEGIN_MARKER], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .map(|pair| pair.map(|(function, fileline)| (function, fileline.unwrap_or_default())))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    /// Every BEG entry of `function` on `thread_id`, in storage order
    pub fn begin_candidates(&self, thread_id: u64, function: &str) -> Result<Vec<LogEntry>> {
        self.select(
            &format!(
                "{} WHERE tid = ?1 AND function = ?2 AND message = ?3 ORDER BY id",
                schema::SELECT_COLUMNS
            ),
            params![thread_id as i64, function, BEGIN_MARKER],
        )
    }

    /// The BEG entry of `function` on `thread_id` nearest to `approx`.
    /// Equally near candidates resolve to the lowest id.
    pub fn entries_for_thread_near(
        &self,
        thread_id: u64,
        function: &str,
        approx: &NaiveDateTime,
    ) -> Result<Option<LogEntry>> {
        let candidates = self.begin_candidates(thread_id, function)?;
        Ok(candidates.into_iter().min_by_key(|entry| {
            (entry.timestamp - *approx)
                .num_microseconds()
                .map_or(i64::MAX, i64::abs)
        }))
    }

    /// Up to `limit` entries of `thread_id` starting at `start_id`, in
    /// storage order
    pub fn entries_from(&self, start_id: u64, thread_id: u64, limit: usize) -> Result<Vec<LogEntry>> {
        self.select(
            &format!(
                "{} WHERE id >= ?1 AND tid = ?2 ORDER BY id LIMIT ?3",
                schema::SELECT_COLUMNS
            ),
            params![start_id as i64, thread_id as i64, limit as i64],
        )
    }
}

/// Names of all nodes with an index file in `dir`
pub fn indexed_nodes(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(StoreError::IndexDirMissing(dir.to_path_buf()));
    }
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(INDEX_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            nodes.push(stem.to_string());
        }
    }
    nodes.sort();
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn entry(tid: u64, time: &str, function: &str, message: &str) -> LogEntry {
        LogEntry::new(
            LogLevel::Info,
            tid,
            ts(time),
            "ckProcessing.cpp:788",
            function,
            message,
        )
    }

    fn sample_store() -> LogStore {
        let mut store = LogStore::open_in_memory("lookup-0").unwrap();
        store
            .put_entries(&[
                entry(7, "2019-02-07 10:00:00", "ProcessFinalBlock", "BEG"),
                entry(7, "2019-02-07 10:00:01", "ProcessFinalBlock", "epoch 12 received"),
                entry(9, "2019-02-07 10:00:02", "GetBalance", "balance lookup"),
                entry(7, "2019-02-07 10:00:03", "ProcessFinalBlock", "END"),
                entry(7, "2019-02-07 11:00:00", "ProcessFinalBlock", "BEG"),
                entry(7, "2019-02-07 11:00:05", "ProcessFinalBlock", "END"),
            ])
            .unwrap();
        store.finalize().unwrap();
        store
    }

    #[test]
    fn test_put_and_read_back() {
        let store = sample_store();
        assert_eq!(store.len().unwrap(), 6);

        let all = store.query("1 = 1").unwrap();
        assert_eq!(all[0].id, 1);
        assert_eq!(all[1].message, "epoch 12 received");
        assert_eq!(all[2].thread_id, 9);
        assert_eq!(all[0].timestamp, ts("2019-02-07 10:00:00"));
    }

    #[test]
    fn test_range_is_inclusive() {
        let store = sample_store();
        let hits = store
            .entries_in_range(&ts("2019-02-07 10:00:01"), &ts("2019-02-07 10:00:03"))
            .unwrap();
        let ids: Vec<u64> = hits.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_distinct_values() {
        let store = sample_store();
        assert_eq!(store.distinct_values(ItemField::Level).unwrap(), vec!["INFO"]);
        assert_eq!(store.distinct_values(ItemField::Tid).unwrap(), vec!["7", "9"]);
    }

    #[test]
    fn test_full_text_search() {
        let store = sample_store();
        let hits = store.full_text_search("epoch").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);

        let prefix = store.full_text_search("bal*").unwrap();
        assert_eq!(prefix.len(), 1);
        assert_eq!(prefix[0].function, "GetBalance");
    }

    #[test]
    fn test_search_requires_finalized_index() {
        let store = LogStore::open_in_memory("raw").unwrap();
        assert!(matches!(
            store.full_text_search("anything"),
            Err(StoreError::NoFullTextIndex(_))
        ));
    }

    #[test]
    fn test_nearest_begin() {
        let store = sample_store();
        let near_first = store
            .entries_for_thread_near(7, "ProcessFinalBlock", &ts("2019-02-07 10:10:00"))
            .unwrap()
            .unwrap();
        assert_eq!(near_first.id, 1);

        let near_second = store
            .entries_for_thread_near(7, "ProcessFinalBlock", &ts("2019-02-07 10:59:00"))
            .unwrap()
            .unwrap();
        assert_eq!(near_second.id, 5);

        assert!(
            store
                .entries_for_thread_near(9, "ProcessFinalBlock", &ts("2019-02-07 10:00:00"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_nearest_begin_tie_prefers_lowest_id() {
        let store = sample_store();
        // Exactly halfway between the two BEG entries
        let hit = store
            .entries_for_thread_near(7, "ProcessFinalBlock", &ts("2019-02-07 10:30:00"))
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, 1);
    }

    #[test]
    fn test_entries_from_filters_thread_and_pages() {
        let store = sample_store();
        let page = store.entries_from(1, 7, 2).unwrap();
        let ids: Vec<u64> = page.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let rest = store.entries_from(3, 7, 10).unwrap();
        let ids: Vec<u64> = rest.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[test]
    fn test_begin_functions() {
        let store = sample_store();
        assert_eq!(
            store.begin_functions().unwrap(),
            vec![(
                "ProcessFinalBlock".to_string(),
                "ckProcessing.cpp:788".to_string()
            )]
        );
    }

    fn published(dir: &Path, node: &str, entries: &[LogEntry]) {
        let mut store = LogStore::create(dir, node, ExistingIndex::Fail).unwrap();
        store.put_entries(entries).unwrap();
        store.finalize().unwrap();
        store.publish().unwrap();
    }

    #[test]
    fn test_create_existing_index_policy() {
        let dir = TempDir::new().unwrap();
        published(
            dir.path(),
            "node-a",
            &[entry(1, "2019-02-07 10:00:00", "Execute", "hello")],
        );

        assert!(matches!(
            LogStore::create(dir.path(), "node-a", ExistingIndex::Fail),
            Err(StoreError::IndexExists(_))
        ));

        let store = LogStore::create(dir.path(), "node-a", ExistingIndex::Overwrite).unwrap();
        assert!(store.is_empty().unwrap());
        // The old index is served until the new one is published
        assert_eq!(LogStore::open(dir.path(), "node-a").unwrap().len().unwrap(), 1);
        store.publish().unwrap();
        assert!(LogStore::open(dir.path(), "node-a").unwrap().is_empty().unwrap());
    }

    #[test]
    fn test_unpublished_index_is_invisible() {
        let dir = TempDir::new().unwrap();
        let mut store = LogStore::create(dir.path(), "node-a", ExistingIndex::Fail).unwrap();
        store
            .put_entries(&[entry(1, "2019-02-07 10:00:00", "Execute", "hello")])
            .unwrap();

        assert!(indexed_nodes(dir.path()).unwrap().is_empty());
        assert!(matches!(
            LogStore::open(dir.path(), "node-a"),
            Err(StoreError::NodeNotIndexed(_))
        ));

        store.discard().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        // Nothing blocks a fresh attempt
        published(dir.path(), "node-a", &[]);
        assert_eq!(indexed_nodes(dir.path()).unwrap(), vec!["node-a"]);
    }

    #[test]
    fn test_create_replaces_stale_staging_file() {
        let dir = TempDir::new().unwrap();
        fs::write(LogStore::staging_path(dir.path(), "node-a"), "garbage").unwrap();
        published(
            dir.path(),
            "node-a",
            &[entry(1, "2019-02-07 10:00:00", "Execute", "hello")],
        );
        assert_eq!(LogStore::open(dir.path(), "node-a").unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_indexed_nodes_and_open() {
        let dir = TempDir::new().unwrap();
        published(dir.path(), "node-b", &[]);
        published(dir.path(), "node-a", &[]);
        fs::write(dir.path().join("notes.txt"), "not an index").unwrap();

        assert_eq!(indexed_nodes(dir.path()).unwrap(), vec!["node-a", "node-b"]);
        assert!(LogStore::open(dir.path(), "node-a").is_ok());
        assert!(matches!(
            LogStore::open(dir.path(), "node-c"),
            Err(StoreError::NodeNotIndexed(_))
        ));
    }

    #[test]
    fn test_indexed_nodes_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            indexed_nodes(&missing),
            Err(StoreError::IndexDirMissing(_))
        ));
    }
}
