use zlogscope_types::{BEGIN_MARKER, END_MARKER, LogEntry};

/// Role of an entry in call stack reconstruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Begin,
    End,
    Plain,
}

/// Classify an entry by its message. Markers must match exactly.
pub fn classify(entry: &LogEntry) -> Marker {
    match entry.message.as_str() {
        BEGIN_MARKER => Marker::Begin,
        END_MARKER => Marker::End,
        _ => Marker::Plain,
    }
}
