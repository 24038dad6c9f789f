//! Symbol recovery for zlogscope
//!
//! The logger cuts function names on the right and source paths on the
//! left. This crate maps such truncated pairs back to canonical symbols
//! using an external symbol table.

mod cache;
mod error;
mod recovery;
mod table;

pub use cache::{CacheStats, RecoveryCache};
pub use error::{RecoveryError, Result};
pub use recovery::{SymbolRecovery, resolve};
pub use table::SymbolTable;

pub use zlogscope_types::{RecoveredSymbol, SymbolTag};
