use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{CallstackArgs, ListItem};
use config::Config;

/// zlogscope - index, search and replay call stacks from node logs
#[derive(Parser, Debug)]
#[command(name = "zlogscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file [default: ./zlogscope.toml when present]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the per-node indexes
    #[arg(long, global = true, value_name = "DIR")]
    index_dir: Option<PathBuf>,

    /// Symbol table used to recover truncated names (ctags -x, .tsv or .json)
    #[arg(long, global = true, value_name = "PATH")]
    symbols: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index log files for further analysis
    Index {
        /// Log files; each file's name (minus extension) is its node name
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Worker threads [default: one per CPU core]
        #[arg(short, long)]
        workers: Option<usize>,

        /// Replace existing indexes instead of failing
        #[arg(long)]
        overwrite: bool,
    },

    /// List nodes, fields or distinct values of a node
    Ls {
        #[arg(value_enum)]
        item: ListItem,

        /// Node to list values of (not needed for `node` and `field`)
        node: Option<String>,

        /// Show recovered function names and locations
        #[arg(short, long)]
        recover: bool,
    },

    /// Show the logs of a time range
    Range {
        node: String,

        /// Start time [default: the epoch]
        #[arg(short, long)]
        start: Option<String>,

        /// End time [default: now]
        #[arg(short, long)]
        end: Option<String>,

        #[arg(short, long)]
        recover: bool,
    },

    /// Query the logs with an SQL WHERE clause over the `log` table
    Query {
        node: String,

        /// e.g. "tid = 5386 AND level = 'WARNING'"
        where_clause: String,

        #[arg(short, long)]
        recover: bool,
    },

    /// Full-text search over log messages
    Search {
        node: String,

        /// Search terms; AND, OR, NOT and a trailing * are supported
        #[arg(required = true)]
        keywords: Vec<String>,

        #[arg(short, long)]
        recover: bool,
    },

    /// Show the call stack of a task run by a thread
    Callstack {
        node: String,

        /// Thread id of the task
        tid: u64,

        /// Task (function) name
        task: String,

        /// Approximate start time of the task [default: now]
        #[arg(short = 't', long)]
        puttime: Option<String>,

        /// Fail on an END that does not match the innermost open call
        #[arg(short, long)]
        strict: bool,

        /// Show log messages inside the stack
        #[arg(short = 'm', long)]
        show_msg: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref())?.with_overrides(args.index_dir, args.symbols);

    match args.command {
        Command::Index {
            files,
            workers,
            overwrite,
        } => commands::index(&config, &files, workers, overwrite),
        Command::Ls {
            item,
            node,
            recover,
        } => commands::list(&config, item, node.as_deref(), recover),
        Command::Range {
            node,
            start,
            end,
            recover,
        } => commands::range(&config, &node, start.as_deref(), end.as_deref(), recover),
        Command::Query {
            node,
            where_clause,
            recover,
        } => commands::query(&config, &node, &where_clause, recover),
        Command::Search {
            node,
            keywords,
            recover,
        } => commands::search(&config, &node, &keywords, recover),
        Command::Callstack {
            node,
            tid,
            task,
            puttime,
            strict,
            show_msg,
        } => commands::callstack(
            &config,
            &CallstackArgs {
                node,
                tid,
                task,
                puttime,
                strict,
                show_msg,
            },
        ),
    }
}
