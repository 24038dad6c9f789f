use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, bail};
use tracing::info;

use zlogscope_logs::{LevelCounts, index_files, node_name};
use zlogscope_store::ExistingIndex;

use crate::config::Config;

const MIB: f64 = 1024.0 * 1024.0;

/// Index every file into `<index_dir>/<node>.sqlite3`, one worker per file
pub fn index(
    config: &Config,
    files: &[PathBuf],
    workers: Option<usize>,
    overwrite: bool,
) -> Result<()> {
    let mut paths: Vec<PathBuf> = Vec::with_capacity(files.len());
    let mut nodes: HashMap<String, &PathBuf> = HashMap::new();
    let mut total_bytes = 0u64;
    for file in files {
        if !file.is_file() {
            bail!("{} does not exist or is not a file", file.display());
        }
        if paths.contains(file) {
            continue;
        }
        let Some(node) = node_name(file) else {
            bail!("cannot derive a node name from {}", file.display());
        };
        if let Some(first) = nodes.insert(node.clone(), file) {
            bail!(
                "{} and {} are both logs of node '{node}'; index them separately",
                first.display(),
                file.display()
            );
        }
        total_bytes += fs::metadata(file)?.len();
        paths.push(file.clone());
    }

    let mut options = config.ingest_options();
    if overwrite {
        options.existing = ExistingIndex::Overwrite;
    }
    let workers = workers
        .filter(|&n| n > 0)
        .unwrap_or_else(|| config.worker_count())
        .min(paths.len());

    let started = Instant::now();
    let results = index_files(&paths, &options, workers);
    let elapsed = started.elapsed().as_secs_f64();

    let mut entries = 0;
    let mut levels = LevelCounts::default();
    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(report) => {
                entries += report.entries;
                levels.add(&report.levels);
                if report.stream.errors() > 0 {
                    info!(
                        node = %report.node,
                        errors = report.stream.errors(),
                        "skipped malformed lines"
                    );
                }
            }
            Err(_) => {
                failed += 1;
                info!("not indexed: {}", path.display());
            }
        }
    }

    let speed = if elapsed > 0.0 {
        total_bytes as f64 / elapsed / MIB
    } else {
        0.0
    };
    println!("workers:  {workers}");
    println!("files:    {}", paths.len());
    println!("entries:  {entries}");
    println!(
        "levels:   DEBUG {}  INFO {}  WARNING {}  FATAL {}",
        levels.debug, levels.info, levels.warning, levels.fatal
    );
    println!("duration: {elapsed:.1} sec");
    println!("speed:    {speed:.1} MB/s");

    if failed > 0 {
        bail!("{failed} of {} files failed to index", paths.len());
    }
    Ok(())
}
