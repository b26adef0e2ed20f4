//! External command execution.
//!
//! [`ProcessRunner`] spawns a [`CommandSpec`], merges stdout and stderr into
//! one line stream, forwards each line to a [`LineSink`] while it runs, and
//! keeps the full transcript for the result or the error.

mod runner;
mod sink;

pub use runner::{CommandSpec, OutputCapture, ProcessRunner, RunResult, DEFAULT_LINE_BUFFER};
pub use sink::{CollectingLineSink, LineSink, NullLineSink, TracingLineSink};
