use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{error, warn};

use zlogscope_types::LogEntry;

use crate::parser::{Header, LogParser, ParseError};
use crate::stats::StreamStats;

/// Longest slice of an offending line echoed into diagnostics
const REPORTED_LINE_CHARS: usize = 120;

/// An entry whose header has been parsed and which may still receive
/// continuation lines
struct PendingEntry {
    header: Header,
    message: String,
}

impl PendingEntry {
    fn new(mut header: Header) -> Self {
        let message = std::mem::take(&mut header.first_line);
        Self { header, message }
    }

    fn push_line(&mut self, line: &str) {
        self.message.push('\n');
        self.message.push_str(line);
    }

    fn into_entry(self) -> LogEntry {
        LogEntry::new(
            self.header.level,
            self.header.thread_id,
            self.header.timestamp,
            self.header.location,
            self.header.function,
            self.message,
        )
    }
}

enum State {
    AwaitingHeader,
    Accumulating(PendingEntry),
}

/// Lazy, single-pass sequence of entries read from a log source.
///
/// Malformed lines are reported through `tracing` and counted in
/// [`StreamStats`]; they never end the stream. An I/O error ends the stream
/// early and is kept for [`LogStream::take_io_error`].
pub struct LogStream<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    state: State,
    stats: StreamStats,
    io_error: Option<io::Error>,
    exhausted: bool,
}

impl LogStream<BufReader<File>> {
    /// Open a log file for streaming
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> LogStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            state: State::AwaitingHeader,
            stats: StreamStats::default(),
            io_error: None,
            exhausted: false,
        }
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// The read error that ended the stream, if any
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.io_error.take()
    }

    fn read_line(&mut self) -> Option<String> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                self.stats.lines += 1;
                let mut end = self.buf.len();
                if self.buf[..end].ends_with(b"\n") {
                    end -= 1;
                }
                if self.buf[..end].ends_with(b"\r") {
                    end -= 1;
                }
                Some(String::from_utf8_lossy(&self.buf[..end]).into_owned())
            }
            Err(err) => {
                error!(line = self.line_no + 1, "read failed: {err}");
                self.io_error = Some(err);
                None
            }
        }
    }

    fn report(&mut self, err: ParseError, line: &str) {
        let shown: String = line.chars().take(REPORTED_LINE_CHARS).collect();
        warn!(line = self.line_no, reason = %err, "unparsed line: {shown}");
        self.stats.record_error(&err);
    }

    fn take_pending(&mut self) -> Option<LogEntry> {
        match std::mem::replace(&mut self.state, State::AwaitingHeader) {
            State::Accumulating(pending) => {
                self.stats.entries += 1;
                Some(pending.into_entry())
            }
            State::AwaitingHeader => None,
        }
    }

    /// Advance the state machine by one line, returning an entry if the
    /// line completed one
    fn feed(&mut self, line: String) -> Option<LogEntry> {
        if LogParser::is_header(&line) {
            // A header always closes the entry in progress, even when the
            // header itself turns out to be malformed
            let completed = self.take_pending();
            match LogParser::parse_header(&line) {
                Ok(header) => self.state = State::Accumulating(PendingEntry::new(header)),
                Err(err) => self.report(err, &line),
            }
            return completed;
        }

        if let State::Accumulating(pending) = &mut self.state {
            pending.push_line(&line);
            return None;
        }
        self.report(ParseError::UnparsedLine, &line);
        None
    }
}

impl<R: BufRead> Iterator for LogStream<R> {
    type Item = LogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        while let Some(line) = self.read_line() {
            if let Some(entry) = self.feed(line) {
                return Some(entry);
            }
        }
        self.exhausted = true;
        self.take_pending()
    }
}
