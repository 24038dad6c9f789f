use chrono::NaiveDateTime;
use tracing::debug;

use zlogscope_store::{LogStore, StoreError};
use zlogscope_types::LogEntry;

use crate::error::CallStackError;
use crate::marker::{Marker, classify};
use crate::reconstruct::{CallStackReconstructor, StackFrame, TraceEvent};

/// Entries fetched per storage round trip while walking a thread
pub const PAGE_SIZE: usize = 512;

/// Read access to one node's entries, as needed by a call stack walk
pub trait EntrySource {
    /// The BEG entry of `function` on `thread_id` closest in time to
    /// `approx`; equally close entries resolve to the lowest id
    fn nearest_begin(
        &self,
        thread_id: u64,
        function: &str,
        approx: &NaiveDateTime,
    ) -> Result<Option<LogEntry>, StoreError>;

    /// Up to `limit` entries of `thread_id` with id `>= start_id`, in id order
    fn entries_from(
        &self,
        start_id: u64,
        thread_id: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError>;
}

impl EntrySource for LogStore {
    fn nearest_begin(
        &self,
        thread_id: u64,
        function: &str,
        approx: &NaiveDateTime,
    ) -> Result<Option<LogEntry>, StoreError> {
        self.entries_for_thread_near(thread_id, function, approx)
    }

    fn entries_from(
        &self,
        start_id: u64,
        thread_id: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        LogStore::entries_from(self, start_id, thread_id, limit)
    }
}

/// Entries already in memory, sorted by id
impl EntrySource for [LogEntry] {
    fn nearest_begin(
        &self,
        thread_id: u64,
        function: &str,
        approx: &NaiveDateTime,
    ) -> Result<Option<LogEntry>, StoreError> {
        Ok(self
            .iter()
            .filter(|e| e.thread_id == thread_id && e.function == function)
            .filter(|e| classify(e) == Marker::Begin)
            .min_by_key(|e| {
                (e.timestamp - *approx)
                    .num_microseconds()
                    .map_or(i64::MAX, i64::abs)
            })
            .cloned())
    }

    fn entries_from(
        &self,
        start_id: u64,
        thread_id: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .iter()
            .filter(|e| e.id >= start_id && e.thread_id == thread_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Which traced call to reconstruct
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskQuery {
    pub thread_id: u64,
    /// Function name as stored, i.e. already cut to the logger's width
    pub function: String,
    pub approx: NaiveDateTime,
}

impl TaskQuery {
    /// Build a query for a full task name, cutting it to `width` characters
    /// the way the logger does
    pub fn new(thread_id: u64, task: &str, approx: NaiveDateTime, width: usize) -> Self {
        let function = match task.char_indices().nth(width) {
            Some((cut, _)) => task[..cut].to_string(),
            None => task.to_string(),
        };
        Self {
            thread_id,
            function,
            approx,
        }
    }
}

/// Locate the BEG entry a walk starts from
pub fn find_entry_point<S>(source: &S, query: &TaskQuery) -> Result<LogEntry, CallStackError>
where
    S: EntrySource + ?Sized,
{
    source
        .nearest_begin(query.thread_id, &query.function, &query.approx)?
        .ok_or_else(|| CallStackError::EntryNotFound {
            thread_id: query.thread_id,
            function: query.function.clone(),
        })
}

/// Result of a completed walk
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub events: usize,
    pub open_frames: Vec<StackFrame>,
    pub returned: bool,
}

/// Replay the thread of `start` from `start` onwards, reading the source
/// page by page and handing each event to `sink` as soon as it is produced.
/// Stops when the outermost call returns or the thread has no more entries.
pub fn walk<S, F>(
    source: &S,
    start: &LogEntry,
    reconstructor: &CallStackReconstructor,
    mut sink: F,
) -> Result<WalkSummary, CallStackError>
where
    S: EntrySource + ?Sized,
    F: FnMut(&TraceEvent),
{
    let mut replay = reconstructor.start();
    let mut next_id = start.id;
    let mut events = 0;

    'pages: loop {
        let page = source.entries_from(next_id, start.thread_id, PAGE_SIZE)?;
        debug!(from = next_id, rows = page.len(), "fetched page");
        let Some(last) = page.last() else {
            break;
        };
        next_id = last.id + 1;

        for entry in &page {
            if let Some(event) = replay.feed(entry)? {
                sink(&event);
                events += 1;
            }
            if replay.is_complete() {
                break 'pages;
            }
        }
        if page.len() < PAGE_SIZE {
            break;
        }
    }

    Ok(WalkSummary {
        events,
        returned: replay.is_complete(),
        open_frames: replay.into_open_frames(),
    })
}
