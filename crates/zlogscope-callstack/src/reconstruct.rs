use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, warn};

use zlogscope_recovery::SymbolRecovery;
use zlogscope_types::{LogEntry, LogLevel, RecoveredSymbol};

use crate::error::CallStackError;
use crate::marker::{Marker, classify};

/// How an END that does not close the innermost open call is treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Report it and keep the stack as is
    #[default]
    Lenient,
    /// Abort the reconstruction
    Strict,
}

/// An open call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    pub symbol: RecoveredSymbol,
    pub entry_time: NaiveDateTime,
    pub entry_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Begin,
    End {
        duration: TimeDelta,
    },
    /// An END that did not match the innermost open call. `open` is that
    /// call, if any, and `since_open` the time elapsed since it began.
    MismatchedEnd {
        open: Option<RecoveredSymbol>,
        since_open: Option<TimeDelta>,
    },
    Line {
        level: LogLevel,
        message: String,
    },
}

/// One step of a reconstructed trace, positioned by nesting depth
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEvent {
    pub depth: usize,
    pub symbol: RecoveredSymbol,
    pub timestamp: NaiveDateTime,
    pub entry_id: u64,
    pub kind: EventKind,
}

/// In-progress replay of one thread's entries.
///
/// Feed entries in storage order. Once the outermost call returns the
/// reconstruction is complete and further entries are ignored.
pub struct Reconstruction<'r> {
    recovery: &'r SymbolRecovery,
    mode: MatchMode,
    stack: Vec<StackFrame>,
    complete: bool,
}

impl<'r> Reconstruction<'r> {
    pub fn new(recovery: &'r SymbolRecovery, mode: MatchMode) -> Self {
        Self {
            recovery,
            mode,
            stack: Vec::new(),
            complete: false,
        }
    }

    /// Whether the outermost call has returned
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Calls that have begun and not yet ended, innermost last
    pub fn open_frames(&self) -> &[StackFrame] {
        &self.stack
    }

    /// Apply one entry, returning the event it produces. Returns `None`
    /// once the reconstruction is complete.
    pub fn feed(&mut self, entry: &LogEntry) -> Result<Option<TraceEvent>, CallStackError> {
        if self.complete {
            return Ok(None);
        }
        let symbol = self.recovery.recover(&entry.function, &entry.location)?;
        let event = |depth, symbol, kind| TraceEvent {
            depth,
            symbol,
            timestamp: entry.timestamp,
            entry_id: entry.id,
            kind,
        };

        let traced = match classify(entry) {
            Marker::Begin => {
                self.stack.push(StackFrame {
                    symbol: symbol.clone(),
                    entry_time: entry.timestamp,
                    entry_id: entry.id,
                });
                event(self.stack.len() - 1, symbol, EventKind::Begin)
            }
            Marker::End => {
                let matched = self
                    .stack
                    .last()
                    .is_some_and(|top| top.symbol.name == symbol.name && top.symbol.path == symbol.path);
                if matched {
                    let depth = self.stack.len() - 1;
                    let duration = self
                        .stack
                        .pop()
                        .map(|top| entry.timestamp - top.entry_time)
                        .unwrap_or(TimeDelta::zero());
                    if self.stack.is_empty() {
                        debug!(entry_id = entry.id, "outermost call returned");
                        self.complete = true;
                    }
                    event(depth, symbol, EventKind::End { duration })
                } else {
                    let top = self.stack.last();
                    let mismatch = event(
                        self.stack.len(),
                        symbol,
                        EventKind::MismatchedEnd {
                            open: top.map(|frame| frame.symbol.clone()),
                            since_open: top.map(|frame| entry.timestamp - frame.entry_time),
                        },
                    );
                    if self.mode == MatchMode::Strict {
                        return Err(CallStackError::Mismatch(Box::new(mismatch)));
                    }
                    warn!(
                        entry_id = entry.id,
                        "unmatched end of {}()", mismatch.symbol.name
                    );
                    mismatch
                }
            }
            Marker::Plain => event(
                self.stack.len(),
                symbol,
                EventKind::Line {
                    level: entry.level,
                    message: entry.message.clone(),
                },
            ),
        };
        Ok(Some(traced))
    }

    pub fn into_open_frames(self) -> Vec<StackFrame> {
        self.stack
    }
}

/// A fully materialized reconstruction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallTrace {
    pub events: Vec<TraceEvent>,
    /// Calls still open when the input ran out
    pub open_frames: Vec<StackFrame>,
    /// Whether the outermost call returned
    pub returned: bool,
}

/// Rebuilds nested call stacks from BEG/END entries of a single thread
#[derive(Clone, Debug)]
pub struct CallStackReconstructor {
    recovery: SymbolRecovery,
    mode: MatchMode,
}

impl CallStackReconstructor {
    pub fn new(recovery: SymbolRecovery, mode: MatchMode) -> Self {
        Self { recovery, mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn recovery(&self) -> &SymbolRecovery {
        &self.recovery
    }

    /// Start an incremental reconstruction
    pub fn start(&self) -> Reconstruction<'_> {
        Reconstruction::new(&self.recovery, self.mode)
    }

    /// Replay a time-ordered sequence of one thread's entries
    pub fn reconstruct<I>(&self, entries: I) -> Result<CallTrace, CallStackError>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        let mut replay = self.start();
        let mut events = Vec::new();
        for entry in entries {
            match replay.feed(&entry)? {
                Some(event) => events.push(event),
                None => break,
            }
            if replay.is_complete() {
                break;
            }
        }
        Ok(CallTrace {
            events,
            returned: replay.is_complete(),
            open_frames: replay.into_open_frames(),
        })
    }
}
