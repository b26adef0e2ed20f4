//! Destinations for live subprocess output.

use parking_lot::Mutex;
use tracing::info;

/// Receives each output line of a running subprocess as soon as it is read.
///
/// Called from the task driving the process, so implementations should not
/// block for long.
pub trait LineSink: Send + Sync {
    /// Handles one line, trailing whitespace already removed.
    fn line(&self, line: &str);
}

/// Forwards lines to `tracing` at info level, tagged with a source label.
#[derive(Debug, Clone)]
pub struct TracingLineSink {
    source: String,
}

impl TracingLineSink {
    /// Creates a sink tagging every line with `source` (usually the step name).
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl LineSink for TracingLineSink {
    fn line(&self, line: &str) {
        info!(source = %self.source, "{line}");
    }
}

/// Discards every line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLineSink;

impl LineSink for NullLineSink {
    fn line(&self, _line: &str) {}
}

/// Keeps every line in memory. Used by tests.
#[derive(Debug, Default)]
pub struct CollectingLineSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingLineSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines received so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Number of lines received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// True when nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl LineSink for CollectingLineSink {
    fn line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingLineSink::new();
        assert!(sink.is_empty());
        sink.line("first");
        sink.line("second");
        assert_eq!(sink.lines(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_tracing_and_null_sinks_accept_lines() {
        TracingLineSink::new("dbt build").line("Completed successfully");
        NullLineSink.line("dropped");
    }
}
