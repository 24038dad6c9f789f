use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use zlogscope_types::RecoveredSymbol;

use crate::cache::RecoveryCache;
use crate::error::{RecoveryError, Result};
use crate::table::SymbolTable;

/// Resolves truncated `(function, location)` pairs against a symbol table,
/// memoizing every successful resolution.
#[derive(Clone, Debug)]
pub struct SymbolRecovery {
    table: Arc<SymbolTable>,
    cache: Arc<RecoveryCache>,
}

impl SymbolRecovery {
    /// Recovery over `table` with a private, empty cache
    pub fn new(table: Arc<SymbolTable>) -> Self {
        Self::with_cache(table, Arc::new(RecoveryCache::new()))
    }

    /// Recovery sharing an existing cache. The cache must only ever be used
    /// with the same table.
    pub fn with_cache(table: Arc<SymbolTable>, cache: Arc<RecoveryCache>) -> Self {
        Self { table, cache }
    }

    /// Recovery whose memo starts from the one saved at `path` for this
    /// table; empty if there is none
    pub fn with_saved_cache(table: Arc<SymbolTable>, path: &Path) -> Result<Self> {
        let cache = RecoveryCache::load(path, table.fingerprint())?.unwrap_or_default();
        Ok(Self::with_cache(table, Arc::new(cache)))
    }

    /// Persist the memo for `with_saved_cache`
    pub fn save_cache(&self, path: &Path) -> Result<()> {
        self.cache.save(path, self.table.fingerprint())
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn cache(&self) -> &RecoveryCache {
        &self.cache
    }

    /// Canonical symbol for a truncated function name and `path:line`
    pub fn recover(&self, function: &str, location: &str) -> Result<RecoveredSymbol> {
        if let Some(hit) = self.cache.get(function, location) {
            return Ok(hit);
        }
        self.cache.record_scan();
        let symbol = resolve(&self.table, function, location)?;
        trace!(function, location, recovered = %symbol.name, "recovered symbol");
        self.cache.insert(function, location, symbol.clone());
        Ok(symbol)
    }
}

/// Resolve one pair without memoization.
///
/// A single prefix match wins outright, keeping the logged line. Several
/// matches are narrowed to those whose path ends with the logged path, then
/// to the definition closest to the logged line; the earliest tag in table
/// order wins equal distances. When nothing matches the input is returned
/// as is.
pub fn resolve(table: &SymbolTable, function: &str, location: &str) -> Result<RecoveredSymbol> {
    let (path, line) = location
        .rsplit_once(':')
        .ok_or_else(|| RecoveryError::MissingLineSeparator(location.to_string()))?;
    let line: u32 = line
        .trim()
        .parse()
        .map_err(|_| RecoveryError::InvalidLineNumber {
            location: location.to_string(),
        })?;

    let bare = function.strip_suffix("()").unwrap_or(function);
    let verbatim = || RecoveredSymbol::new(function, path, line);

    let candidates = table.candidates(bare);
    let symbol = match candidates.as_slice() {
        [] => verbatim(),
        [only] => RecoveredSymbol::new(&only.name, &only.path, line),
        many => many
            .iter()
            .filter(|tag| tag.path.ends_with(path))
            .min_by_key(|tag| tag.defined_at.abs_diff(line))
            .map_or_else(verbatim, |tag| RecoveredSymbol::new(&tag.name, &tag.path, line)),
    };
    Ok(symbol)
}
