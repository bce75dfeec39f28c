//! Command output sinks
//!
//! Backends stream the interleaved stdout/stderr lines of a running command
//! into an [`OutputSink`]. Sinks are shared across concurrently running
//! commands, so implementations must be thread-safe.

use std::sync::Mutex;
use tracing::info;

/// Which stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Destination for command output
pub trait OutputSink: Send + Sync {
    /// Receive one line (without trailing newline) produced by a command
    fn write_line(&self, command_id: &str, stream: OutputStream, line: &str);
}

/// Forwards every line to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn write_line(&self, command_id: &str, stream: OutputStream, line: &str) {
        info!(command = command_id, stream = stream.as_str(), "{}", line);
    }
}

/// A captured output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub command_id: String,
    pub stream: OutputStream,
    pub line: String,
}

/// Collects lines in memory, in arrival order
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<OutputLine>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line received so far
    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Lines produced by one command, stream ignored
    pub fn lines_for(&self, command_id: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.command_id == command_id)
            .map(|l| l.line)
            .collect()
    }
}

impl OutputSink for BufferSink {
    fn write_line(&self, command_id: &str, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(OutputLine {
                command_id: command_id.to_string(),
                stream,
                line: line.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_keeps_order() {
        let sink = BufferSink::new();
        sink.write_line("a", OutputStream::Stdout, "one");
        sink.write_line("b", OutputStream::Stderr, "two");
        sink.write_line("a", OutputStream::Stderr, "three");

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].stream, OutputStream::Stderr);
        assert_eq!(sink.lines_for("a"), vec!["one", "three"]);
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingSink.write_line("a", OutputStream::Stdout, "hello");
        assert_eq!(OutputStream::Stdout.as_str(), "stdout");
    }
}
