//! Subcommand implementations

mod callstack;
mod index;
mod list;
mod query;

use std::io::Write;

use anyhow::{Context, Result};

use zlogscope_recovery::SymbolRecovery;
use zlogscope_store::LogStore;
use zlogscope_types::LogEntry;

use crate::config::Config;
use crate::render;

pub use callstack::{CallstackArgs, callstack};
pub use index::index;
pub use list::{ListItem, list};
pub use query::{query, range, search};

/// Open the index of `node`, failing if it was never indexed
fn open_store(config: &Config, node: &str) -> Result<LogStore> {
    LogStore::open(&config.index_dir, node)
        .with_context(|| format!("Failed to open index of node '{node}'"))
}

/// Print entries as table rows, recovering symbols when asked to
fn print_rows(
    out: &mut impl Write,
    entries: &[LogEntry],
    recovery: Option<&SymbolRecovery>,
) -> Result<()> {
    for entry in entries {
        let recovered = recovery
            .map(|r| r.recover(&entry.function, &entry.location))
            .transpose()
            .with_context(|| format!("Failed to recover symbol of entry {}", entry.id))?;
        writeln!(out, "{}", render::format_row(entry, recovered.as_ref()))?;
    }
    Ok(())
}

/// Recovery for commands taking `--recover`
fn recovery_if(config: &Config, recover: bool) -> Result<Option<SymbolRecovery>> {
    if recover {
        config.require_recovery().map(Some)
    } else {
        Ok(None)
    }
}
