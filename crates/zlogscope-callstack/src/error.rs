use thiserror::Error;

use zlogscope_recovery::RecoveryError;
use zlogscope_store::StoreError;

use crate::reconstruct::TraceEvent;

#[derive(Debug, Error)]
pub enum CallStackError {
    #[error("no BEG entry of {function} found in thread {thread_id}")]
    EntryNotFound { thread_id: u64, function: String },

    /// An END that does not close the innermost open call, in strict mode
    #[error("unmatched function end: {}() at entry {}", .0.symbol.name, .0.entry_id)]
    Mismatch(Box<TraceEvent>),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
