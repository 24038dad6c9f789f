//! Call stack reconstruction for zlogscope
//!
//! Traced functions log a `BEG` entry on entry and an `END` entry on
//! return. Replaying one thread's entries through [`Reconstruction`]
//! rebuilds the nesting and timing of those calls.

mod error;
mod marker;
mod reconstruct;
mod walk;

pub use error::CallStackError;
pub use marker::{Marker, classify};
pub use reconstruct::{
    CallStackReconstructor, CallTrace, EventKind, MatchMode, Reconstruction, StackFrame, TraceEvent,
};
pub use walk::{EntrySource, PAGE_SIZE, TaskQuery, WalkSummary, find_entry_point, walk};
