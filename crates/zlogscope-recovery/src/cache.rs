use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use zlogscope_types::RecoveredSymbol;

use crate::error::{RecoveryError, Result};

type Memo = HashMap<String, HashMap<String, RecoveredSymbol>>;

/// On-disk form of the memo, tagged with the table it was built from
#[derive(Serialize, Deserialize)]
struct SavedCache {
    table: u64,
    entries: Memo,
}

/// Counters describing how the memo has been used
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Candidate scans over the symbol table
    pub scans: u64,
    pub entries: usize,
}

/// Append-only memo of recovered symbols, keyed by the truncated
/// `(function, location)` pair.
///
/// Shared between threads behind an `Arc`. Two threads missing on the same
/// key may both resolve it; resolution is deterministic so the second
/// insert is a no-op.
#[derive(Debug, Default)]
pub struct RecoveryCache {
    /// function -> location -> result
    entries: RwLock<Memo>,
    hits: AtomicU64,
    misses: AtomicU64,
    scans: AtomicU64,
}

impl RecoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a pair, counting the hit or miss
    pub fn get(&self, function: &str, location: &str) -> Option<RecoveredSymbol> {
        let found = self
            .entries
            .read()
            .get(function)
            .and_then(|by_location| by_location.get(location))
            .cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a result. An existing entry for the pair is kept.
    pub fn insert(&self, function: &str, location: &str, symbol: RecoveredSymbol) {
        self.entries
            .write()
            .entry(function.to_string())
            .or_default()
            .entry(location.to_string())
            .or_insert(symbol);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a memo written by `save` for the table with fingerprint
    /// `table`. A missing file, or one saved for another table, gives `None`.
    pub fn load(path: &Path, table: u64) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RecoveryError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let saved: SavedCache =
            serde_json::from_str(&content).map_err(|source| RecoveryError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if saved.table != table {
            debug!("ignoring recovery cache {} built for another table", path.display());
            return Ok(None);
        }
        Ok(Some(Self {
            entries: RwLock::new(saved.entries),
            ..Self::default()
        }))
    }

    /// Write the memo to `path`, tagged with the table fingerprint
    pub fn save(&self, path: &Path, table: u64) -> Result<()> {
        let saved = SavedCache {
            table,
            entries: self.entries.read().clone(),
        };
        let content = serde_json::to_string(&saved).map_err(|source| RecoveryError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| RecoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(entries = self.len(), "saved recovery cache to {}", path.display());
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_result() {
        let cache = RecoveryCache::new();
        assert!(cache.get("Put", "BlockStorage.cpp:50").is_none());

        cache.insert("Put", "BlockStorage.cpp:50", RecoveredSymbol::new("PutBlock", "a.cpp", 50));
        cache.insert("Put", "BlockStorage.cpp:50", RecoveredSymbol::new("PutOther", "b.cpp", 50));
        cache.insert("Put", "BlockStorage.cpp:53", RecoveredSymbol::new("PutBlock", "a.cpp", 53));

        assert_eq!(
            cache.get("Put", "BlockStorage.cpp:50").unwrap().name,
            "PutBlock"
        );
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 2);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tags.tsv.cache.json");
        assert!(RecoveryCache::load(&path, 7).unwrap().is_none());

        let cache = RecoveryCache::new();
        cache.insert("Put", "BlockStorage.cpp:50", RecoveredSymbol::new("PutBlock", "a.cpp", 50));
        cache.save(&path, 7).unwrap();

        let loaded = RecoveryCache::load(&path, 7).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("Put", "BlockStorage.cpp:50").unwrap().path, "a.cpp");
        assert_eq!(loaded.stats().hits, 1);

        // Built against a different table
        assert!(RecoveryCache::load(&path, 8).unwrap().is_none());

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RecoveryCache::load(&path, 7),
            Err(RecoveryError::Json { .. })
        ));
    }
}
