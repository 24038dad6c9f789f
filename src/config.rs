//! Configuration file handling
//!
//! Settings are read from an optional TOML file. Command line flags take
//! precedence over the file, and the file over built-in defaults.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use zlogscope_logs::{DEFAULT_BATCH_SIZE, IngestOptions};
use zlogscope_recovery::{SymbolRecovery, SymbolTable};
use zlogscope_store::ExistingIndex;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "zlogscope.toml";

/// Width of the function column written by the node logger
pub const DEFAULT_FUNCTION_WIDTH: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where per-node indexes live
    pub index_dir: PathBuf,

    /// Symbol table for name recovery
    pub symbols: Option<PathBuf>,

    /// Entries per storage transaction
    pub batch_size: usize,

    /// Ingestion threads, 0 for one per CPU core
    pub workers: usize,

    pub on_existing_index: ExistingIndex,

    pub function_width: usize,

    /// Keep recovered symbols in `<symbols>.cache.json` between runs
    pub recovery_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./log-cache"),
            symbols: None,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 0,
            on_existing_index: ExistingIndex::Fail,
            function_width: DEFAULT_FUNCTION_WIDTH,
            recovery_cache: true,
        }
    }
}

impl Config {
    /// Load `explicit`, or the default file if it exists, or the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, index_dir: Option<PathBuf>, symbols: Option<PathBuf>) -> Self {
        if let Some(dir) = index_dir {
            self.index_dir = dir;
        }
        if symbols.is_some() {
            self.symbols = symbols;
        }
        self
    }

    /// Effective number of ingestion threads
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            index_dir: self.index_dir.clone(),
            batch_size: self.batch_size,
            existing: self.on_existing_index,
        }
    }

    /// Where the recovery memo is kept, when that is enabled
    pub fn recovery_cache_path(&self) -> Option<PathBuf> {
        let symbols = self.symbols.as_ref().filter(|_| self.recovery_cache)?;
        let mut name = symbols.as_os_str().to_owned();
        name.push(".cache.json");
        Some(PathBuf::from(name))
    }

    /// Recovery over the configured symbol table, if there is one
    pub fn load_recovery(&self) -> Result<Option<SymbolRecovery>> {
        let Some(path) = &self.symbols else {
            return Ok(None);
        };
        let table = Arc::new(
            SymbolTable::from_path(path)
                .with_context(|| format!("Failed to load symbol table: {}", path.display()))?,
        );
        let recovery = match self.recovery_cache_path() {
            Some(cache) => SymbolRecovery::with_saved_cache(table.clone(), &cache)
                .unwrap_or_else(|err| {
                    warn!("ignoring unreadable recovery cache: {err}");
                    SymbolRecovery::new(table)
                }),
            None => SymbolRecovery::new(table),
        };
        Ok(Some(recovery))
    }

    /// Save what `recovery` resolved during this run for the next one
    pub fn save_recovery(&self, recovery: &SymbolRecovery) {
        let Some(path) = self.recovery_cache_path() else {
            return;
        };
        if recovery.cache().stats().scans == 0 {
            return;
        }
        if let Err(err) = recovery.save_cache(&path) {
            warn!("failed to save recovery cache: {err}");
        }
    }

    /// Recovery for `--recover`, which needs a symbol table
    pub fn require_recovery(&self) -> Result<SymbolRecovery> {
        self.load_recovery()?.context(
            "--recover needs a symbol table: pass --symbols or set `symbols` in the config file",
        )
    }
}
