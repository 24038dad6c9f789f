//! Plain-text rendering of entries and call stack events

use chrono::TimeDelta;
use unicode_width::UnicodeWidthStr;

use zlogscope_callstack::{EventKind, TraceEvent};
use zlogscope_types::{LogEntry, RecoveredSymbol, format_timestamp, short_time};

const INDENT: &str = "    ";
const BORDER: &str = "| ";

/// Gap between the function and the time in call stack lines
const NAME_GAP: &str = "        ";

/// Indent every line of `text` by `depth` levels. Nested lines get a `|`
/// border so sibling calls line up visually.
pub fn indent_block(text: &str, depth: usize) -> String {
    let border = if depth > 0 { BORDER } else { "" };
    let padding = INDENT.repeat(depth);
    text.lines()
        .map(|line| format!("{padding}{border}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Left-align `text` in `width` terminal columns
pub fn pad(text: &str, width: usize) -> String {
    let shown = text.width();
    if shown >= width {
        return text.to_string();
    }
    format!("{text}{}", " ".repeat(width - shown))
}

/// Recovered function name, with the part past the logger's column width
/// in brackets: `ProcessStateDeltaFro[mFinalBlock]`
pub fn split_at_width(name: &str, width: usize) -> String {
    match name.char_indices().nth(width) {
        Some((cut, _)) => format!("{}[{}]", &name[..cut], &name[cut..]),
        None => name.to_string(),
    }
}

/// One entry as a table row. With a recovered symbol the function and
/// location columns show the recovered values.
pub fn format_row(entry: &LogEntry, recovered: Option<&RecoveredSymbol>) -> String {
    let (location, function) = match recovered {
        Some(symbol) => (
            format!("{}:{:<4}", pad(&symbol.path, 50), symbol.line),
            pad(&symbol.name, 40),
        ),
        None => (entry.location.clone(), entry.function.clone()),
    };
    [
        entry.level.as_str().to_string(),
        format!("{:5}", entry.thread_id),
        format_timestamp(&entry.timestamp),
        location,
        function,
        entry.message.clone(),
    ]
    .join("  ")
}

pub fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_seconds() as f64,
    }
}

fn end_line(event: &TraceEvent, duration: Option<TimeDelta>) -> String {
    let when = match duration {
        Some(d) => format!("duration:{:.2}s  {}", seconds(d), short_time(&event.timestamp)),
        None => short_time(&event.timestamp),
    };
    format!(
        "END  {}(){NAME_GAP}[{when}]  [{}]",
        event.symbol.name,
        event.symbol.location()
    )
}

/// An event without its depth indentation
pub fn event_text(event: &TraceEvent, show_msg: bool) -> String {
    let symbol = &event.symbol;
    match &event.kind {
        EventKind::Begin => format!(
            "BEGIN  {}(){NAME_GAP}[{}]  [{}]",
            symbol.name,
            short_time(&event.timestamp),
            symbol.location()
        ),
        EventKind::End { duration } => end_line(event, Some(*duration)),
        EventKind::MismatchedEnd { since_open, .. } => {
            format!("Unmatched function end:\n{}", end_line(event, *since_open))
        }
        EventKind::Line { level, message } => {
            let head = format!(
                "[{level}]  {}(){NAME_GAP}[{}]  [{}]",
                symbol.name,
                short_time(&event.timestamp),
                symbol.location()
            );
            if show_msg && !message.is_empty() {
                let body: Vec<String> = message.lines().map(|l| format!("{INDENT}{l}")).collect();
                format!("{head}\n{}", body.join("\n"))
            } else {
                head
            }
        }
    }
}

/// An event indented by its nesting depth
pub fn format_event(event: &TraceEvent, show_msg: bool) -> String {
    indent_block(&event_text(event, show_msg), event.depth)
}
