use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use workerpool::Pool;
use workerpool::thunk::{Thunk, ThunkWorker};

use zlogscope_store::{ExistingIndex, LogStore, StoreError};
use zlogscope_types::LogEntry;

use crate::stats::{LevelCounts, StreamStats};
use crate::stream::LogStream;

/// Default number of entries written per storage transaction
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot derive a node name from {}", .0.display())]
    NoNodeName(PathBuf),

    #[error("worker indexing {} panicked", .0.display())]
    WorkerPanicked(PathBuf),

    #[error("{} maps to node '{node}', which {} already indexes", path.display(), first.display())]
    DuplicateNode {
        node: String,
        path: PathBuf,
        first: PathBuf,
    },
}

/// Settings shared by every file of one ingestion run
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub index_dir: PathBuf,
    pub batch_size: usize,
    pub existing: ExistingIndex,
}

impl IngestOptions {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            existing: ExistingIndex::default(),
        }
    }
}

/// Outcome of indexing one log file
#[derive(Clone, Debug)]
pub struct IngestReport {
    pub node: String,
    pub entries: u64,
    pub levels: LevelCounts,
    pub stream: StreamStats,
}

/// The node a log file belongs to: its file name without extension
pub fn node_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one log file into a fresh index for its node.
///
/// The node's index only changes once the whole file has been read and
/// indexed; on any failure the partial index is removed.
pub fn index_file(path: &Path, opts: &IngestOptions) -> Result<IngestReport, IngestError> {
    let node = node_name(path).ok_or_else(|| IngestError::NoNodeName(path.to_path_buf()))?;
    let span = info_span!("indexer", node = %node);
    let _guard = span.enter();

    info!("indexing {}", path.display());
    let mut stream = LogStream::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut store = LogStore::create(&opts.index_dir, &node, opts.existing)?;

    let (entries, levels) = match fill_store(&mut store, &mut stream, path, opts.batch_size) {
        Ok(counts) => counts,
        Err(err) => {
            if let Err(cleanup) = store.discard() {
                warn!("failed to remove partial index: {cleanup}");
            }
            return Err(err);
        }
    };
    store.publish()?;

    let stats = stream.stats().clone();
    info!(
        entries,
        errors = stats.errors(),
        "done indexing {}",
        path.display()
    );

    Ok(IngestReport {
        node,
        entries,
        levels,
        stream: stats,
    })
}

/// Copy every entry of `stream` into `store` and finalize it
fn fill_store<R: BufRead>(
    store: &mut LogStore,
    stream: &mut LogStream<R>,
    path: &Path,
    batch_size: usize,
) -> Result<(u64, LevelCounts), IngestError> {
    let batch_size = batch_size.max(1);
    let mut batch: Vec<LogEntry> = Vec::with_capacity(batch_size);
    let mut levels = LevelCounts::default();
    let mut entries = 0u64;

    for entry in stream.by_ref() {
        levels.increment(entry.level);
        batch.push(entry);
        if batch.len() >= batch_size {
            entries += store.put_entries(&batch)? as u64;
            batch.clear();
        }
    }
    entries += store.put_entries(&batch)? as u64;

    if let Some(source) = stream.take_io_error() {
        return Err(IngestError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    store.finalize()?;
    Ok((entries, levels))
}

type FileOutcome = (PathBuf, Result<IngestReport, IngestError>);

/// Pair each path with the first earlier path of the same node, if any
fn duplicate_nodes(paths: &[PathBuf]) -> Vec<Option<IngestError>> {
    let mut owners: HashMap<String, &PathBuf> = HashMap::new();
    paths
        .iter()
        .map(|path| {
            let node = node_name(path)?;
            match owners.get(&node) {
                Some(first) => Some(IngestError::DuplicateNode {
                    node,
                    path: path.clone(),
                    first: (*first).clone(),
                }),
                None => {
                    owners.insert(node, path);
                    None
                }
            }
        })
        .collect()
}

/// Index several files on a pool of `workers` threads, one file per task.
///
/// A failing file does not affect its siblings. Every node is written by
/// one task only: a file whose node an earlier file already covers fails
/// with `DuplicateNode` without being read. Results come back in the order
/// of `paths`.
pub fn index_files(paths: &[PathBuf], opts: &IngestOptions, workers: usize) -> Vec<FileOutcome> {
    let workers = workers.clamp(1, paths.len().max(1));
    debug!(workers, files = paths.len(), "starting ingestion pool");

    let mut rejected = duplicate_nodes(paths);
    let pool = Pool::<ThunkWorker<(usize, Result<IngestReport, IngestError>)>>::new(workers);
    let (tx, rx) = channel();
    for (slot, path) in paths.iter().enumerate() {
        if rejected[slot].is_some() {
            continue;
        }
        let path = path.clone();
        let opts = opts.clone();
        pool.execute_to(
            tx.clone(),
            Thunk::of(move || {
                let result = index_file(&path, &opts);
                if let Err(err) = &result {
                    error!("failed to index {}: {err}", path.display());
                }
                (slot, result)
            }),
        );
    }
    drop(tx);

    // A panicking task never sends, so the receiver ends once every
    // surviving task has reported
    let mut finished: HashMap<usize, Result<IngestReport, IngestError>> = rx.iter().collect();
    paths
        .iter()
        .enumerate()
        .map(|(slot, path)| {
            let result = match rejected[slot].take() {
                Some(err) => {
                    error!("not indexing {}: {err}", path.display());
                    Err(err)
                }
                None => finished
                    .remove(&slot)
                    .unwrap_or_else(|| Err(IngestError::WorkerPanicked(path.clone()))),
            };
            (path.clone(), result)
        })
        .collect()
}
