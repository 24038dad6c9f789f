use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime};

use zlogscope_types::parse_timestamp;

use super::{open_store, print_rows, recovery_if};
use crate::config::Config;

fn parse_bound(raw: Option<&str>, default: NaiveDateTime, which: &str) -> Result<NaiveDateTime> {
    match raw {
        None => Ok(default),
        Some(raw) => match parse_timestamp(raw) {
            Some(ts) => Ok(ts),
            None => bail!(
                "invalid {which} time '{raw}', expected YYYY-MM-DD[ HH:MM:SS[.ffffff]]"
            ),
        },
    }
}

/// Entries of `node` between `start` (default: the epoch) and `end`
/// (default: now), inclusive
pub fn range(
    config: &Config,
    node: &str,
    start: Option<&str>,
    end: Option<&str>,
    recover: bool,
) -> Result<()> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("epoch is not representable")?;
    let start = parse_bound(start, epoch, "start")?;
    let end = parse_bound(end, Local::now().naive_local(), "end")?;
    if start > end {
        bail!("start time is after end time");
    }

    let recovery = recovery_if(config, recover)?;
    let store = open_store(config, node)?;
    let entries = store.entries_in_range(&start, &end)?;
    let mut out = io::stdout().lock();
    print_rows(&mut out, &entries, recovery.as_ref())?;
    out.flush()?;
    if let Some(recovery) = &recovery {
        config.save_recovery(recovery);
    }
    Ok(())
}

/// Entries of `node` matching a raw SQL WHERE clause
pub fn query(config: &Config, node: &str, where_clause: &str, recover: bool) -> Result<()> {
    let recovery = recovery_if(config, recover)?;
    let store = open_store(config, node)?;
    let entries = store
        .query(where_clause)
        .with_context(|| format!("Query failed: {where_clause}"))?;
    let mut out = io::stdout().lock();
    print_rows(&mut out, &entries, recovery.as_ref())?;
    out.flush()?;
    if let Some(recovery) = &recovery {
        config.save_recovery(recovery);
    }
    Ok(())
}

/// Full-text search over the messages of `node`
pub fn search(config: &Config, node: &str, keywords: &[String], recover: bool) -> Result<()> {
    let recovery = recovery_if(config, recover)?;
    let store = open_store(config, node)?;
    let terms = keywords.join(" ");
    let entries = store
        .full_text_search(&terms)
        .with_context(|| format!("Search failed: {terms}"))?;
    let mut out = io::stdout().lock();
    print_rows(&mut out, &entries, recovery.as_ref())?;
    out.flush()?;
    if let Some(recovery) = &recovery {
        config.save_recovery(recovery);
    }
    Ok(())
}
