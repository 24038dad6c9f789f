use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::ValueEnum;

use zlogscope_store::{ItemField, indexed_nodes};

use super::{open_store, recovery_if};
use crate::config::Config;
use crate::render;

const FIELD_HELP: &str = "\
Fields of the Log:
level     -   log level
tid       -   thread ID
puttime   -   datetime of the log (YYYY-MM-DD HH:MM:SS.ffffff)
fileline  -   filepath:lineno (filepath is left truncated)
function  -   right truncated function name of the log
message   -   log message";

/// Column width of the function name in `ls function` output
const FUNCTION_COLUMN: usize = 55;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListItem {
    /// Indexed nodes
    Node,
    /// Log fields usable in queries
    Field,
    /// Distinct levels of a node
    Level,
    /// Distinct thread ids of a node
    Tid,
    /// Traced functions of a node
    Function,
}

pub fn list(config: &Config, item: ListItem, node: Option<&str>, recover: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    match item {
        ListItem::Node => {
            for node in indexed_nodes(&config.index_dir)? {
                writeln!(out, "{node}")?;
            }
        }
        ListItem::Field => writeln!(out, "{FIELD_HELP}")?,
        ListItem::Level | ListItem::Tid => {
            let store = open_store(config, require_node(node)?)?;
            let field = if item == ListItem::Level {
                ItemField::Level
            } else {
                ItemField::Tid
            };
            for value in store.distinct_values(field)? {
                writeln!(out, "{value}")?;
            }
        }
        ListItem::Function => {
            let recovery = recovery_if(config, recover)?;
            let store = open_store(config, require_node(node)?)?;
            for (function, location) in store.begin_functions()? {
                let (function, location) = match &recovery {
                    Some(recovery) => {
                        let symbol = recovery.recover(&function, &location)?;
                        (
                            render::split_at_width(&symbol.name, config.function_width),
                            symbol.location(),
                        )
                    }
                    None => (function, location),
                };
                writeln!(out, "{}  {location}", render::pad(&function, FUNCTION_COLUMN))?;
            }
            if let Some(recovery) = &recovery {
                config.save_recovery(recovery);
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn require_node(node: Option<&str>) -> Result<&str> {
    node.context("a node name is required for this listing")
}
