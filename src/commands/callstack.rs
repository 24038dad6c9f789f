use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use tracing::warn;

use zlogscope_callstack::{
    CallStackError, CallStackReconstructor, MatchMode, TaskQuery, find_entry_point, walk,
};
use zlogscope_recovery::{SymbolRecovery, SymbolTable};
use zlogscope_types::parse_timestamp;

use super::open_store;
use crate::config::Config;
use crate::render;

#[derive(Clone, Debug)]
pub struct CallstackArgs {
    pub node: String,
    pub tid: u64,
    pub task: String,
    pub puttime: Option<String>,
    pub strict: bool,
    pub show_msg: bool,
}

/// Print the call stack of the `task` call on `tid` nearest to `puttime`
pub fn callstack(config: &Config, args: &CallstackArgs) -> Result<()> {
    let approx = match &args.puttime {
        Some(raw) => parse_timestamp(raw).with_context(|| format!("invalid puttime '{raw}'"))?,
        None => Local::now().naive_local(),
    };
    let recovery = match config.load_recovery()? {
        Some(recovery) => recovery,
        None => {
            warn!("no symbol table configured, names are shown as logged");
            SymbolRecovery::new(Arc::new(SymbolTable::default()))
        }
    };
    let mode = if args.strict {
        MatchMode::Strict
    } else {
        MatchMode::Lenient
    };

    let store = open_store(config, &args.node)?;
    let query = TaskQuery::new(args.tid, &args.task, approx, config.function_width);
    let start = match find_entry_point(&store, &query) {
        Ok(entry) => entry,
        Err(CallStackError::EntryNotFound { .. }) => {
            bail!("Stack entry not found: no call of {} in thread {}", query.function, args.tid)
        }
        Err(err) => return Err(err.into()),
    };

    let head = recovery.recover(&start.function, &start.location)?;
    let reconstructor = CallStackReconstructor::new(recovery.clone(), mode);

    let mut out = io::stdout().lock();
    writeln!(out, "Displaying Call Stack of {}() in thread {}", head.name, args.tid)?;

    let mut write_error = None;
    let walked = walk(&store, &start, &reconstructor, |event| {
        if write_error.is_none() {
            if let Err(err) = writeln!(out, "{}", render::format_event(event, args.show_msg)) {
                write_error = Some(err);
            }
        }
    });
    out.flush()?;
    config.save_recovery(&recovery);
    if let Some(err) = write_error {
        return Err(err.into());
    }

    let summary = match walked {
        Ok(summary) => summary,
        Err(CallStackError::Mismatch(event)) => {
            eprintln!("{}", render::event_text(&event, false));
            return Err(anyhow!("call stack of {}() is inconsistent", head.name));
        }
        Err(err) => return Err(err.into()),
    };
    if !summary.returned {
        warn!(
            open = summary.open_frames.len(),
            "log ends before {}() returns", head.name
        );
    }
    Ok(())
}
