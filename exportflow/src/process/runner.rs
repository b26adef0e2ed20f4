//! Subprocess execution with live, merged output streaming.

use super::sink::LineSink;
use crate::errors::ProcessExecutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use std::io::BufRead;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default capacity of the line channel between pipe readers and the caller.
pub const DEFAULT_LINE_BUFFER: usize = 256;

/// Which output streams end up in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCapture {
    /// stdout and stderr share one pipe, so lines keep their emission order.
    #[default]
    Merged,
    /// Only stdout is captured; stderr lines still reach the sink and are
    /// kept apart as diagnostics.
    StdoutOnly,
}

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Working directory; inherits the caller's when unset.
    pub working_dir: Option<PathBuf>,
    /// Environment overrides.
    #[serde(skip_serializing)]
    pub env: BTreeMap<String, String>,
    /// Start from an empty environment instead of the caller's.
    pub clear_env: bool,
    /// Kill the process when it runs longer than this.
    pub timeout: Option<Duration>,
    /// How stdout and stderr are captured.
    #[serde(default)]
    pub capture: OutputCapture,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            clear_env: false,
            timeout: None,
            capture: OutputCapture::Merged,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets one environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets several environment variables for the child.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Starts the child from an empty environment.
    #[must_use]
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Sets a timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets or clears the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keeps stderr out of the transcript, for commands whose stdout is parsed.
    #[must_use]
    pub fn stdout_only(mut self) -> Self {
        self.capture = OutputCapture::StdoutOnly;
        self
    }
}

/// Program and arguments separated by spaces. Environment values are never shown.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of a process that exited with code 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Always 0 for a returned result.
    pub exit_code: i32,
    /// Captured lines in emission order.
    pub transcript: Vec<String>,
    /// stderr lines, when stderr was kept out of the transcript.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl RunResult {
    /// Returns the transcript joined with newlines.
    #[must_use]
    pub fn output(&self) -> String {
        self.transcript.join("\n")
    }
}

/// Runs external commands, streaming their output line by line.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    line_buffer: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            line_buffer: DEFAULT_LINE_BUFFER,
        }
    }
}

impl ProcessRunner {
    /// Creates a runner with the default line buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of the channel between the pipe readers and the sink.
    #[must_use]
    pub fn with_line_buffer(mut self, capacity: usize) -> Self {
        self.line_buffer = capacity.max(1);
        self
    }

    /// Runs `spec` to completion.
    ///
    /// By default stdout and stderr are written to one shared pipe, so the
    /// transcript holds every line in the order the child wrote it. Each
    /// line is passed to `sink` as it arrives. A nonzero exit, a signal, a
    /// spawn failure or a timeout is returned as [`ProcessExecutionError`]
    /// carrying everything captured so far, diagnostics included.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        sink: &dyn LineSink,
    ) -> Result<RunResult, ProcessExecutionError> {
        let command_line = spec.to_string();
        info!(command = %command_line, cwd = ?spec.working_dir, capture = ?spec.capture, "Running command");
        let spawn_failed = |e: std::io::Error| ProcessExecutionError::spawn(command_line.clone(), e.to_string());

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null()).kill_on_drop(true);
        if spec.clear_env {
            command.env_clear();
        }
        command.envs(&spec.env);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let (tx, mut rx) = mpsc::channel::<(Stream, String)>(self.line_buffer);
        let mut child = match spec.capture {
            OutputCapture::Merged => {
                let (reader, writer) = os_pipe::pipe().map_err(spawn_failed)?;
                let stderr_writer = writer.try_clone().map_err(spawn_failed)?;
                command.stdout(writer).stderr(stderr_writer);
                let child = command.spawn().map_err(spawn_failed)?;
                // The parent's write ends must close or the reader never sees EOF.
                drop(command);
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || forward_pipe(reader, &tx));
                child
            }
            OutputCapture::StdoutOnly => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
                let mut child = command.spawn().map_err(spawn_failed)?;
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(forward_lines(stdout, Stream::Output, tx.clone()));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(forward_lines(stderr, Stream::Diagnostic, tx.clone()));
                }
                child
            }
        };
        drop(tx);

        let mut transcript = Vec::new();
        let mut diagnostics = Vec::new();
        let drain = async {
            while let Some((stream, line)) = rx.recv().await {
                sink.line(&line);
                match stream {
                    Stream::Output => transcript.push(line),
                    Stream::Diagnostic => diagnostics.push(line),
                }
            }
            child.wait().await
        };

        let waited = match spec.timeout {
            Some(limit) => {
                let bounded = tokio::time::timeout(limit, drain).await;
                if let Ok(waited) = bounded {
                    waited
                } else {
                    warn!(command = %command_line, timeout_secs = limit.as_secs_f64(), "Command timed out");
                    if let Err(e) = child.kill().await {
                        debug!(command = %command_line, error = %e, "Kill after timeout failed");
                    }
                    transcript.append(&mut diagnostics);
                    return Err(ProcessExecutionError::timed_out(command_line, limit, transcript));
                }
            }
            None => drain.await,
        };

        let status = waited.map_err(spawn_failed)?;
        match status.code() {
            Some(0) => {
                info!(command = %command_line, lines = transcript.len(), "Command completed");
                Ok(RunResult {
                    exit_code: 0,
                    transcript,
                    diagnostics,
                })
            }
            Some(code) => {
                warn!(command = %command_line, exit_code = code, "Command failed");
                transcript.append(&mut diagnostics);
                Err(ProcessExecutionError::exit(command_line, code, transcript))
            }
            None => {
                warn!(command = %command_line, "Command terminated by signal");
                transcript.append(&mut diagnostics);
                Err(ProcessExecutionError::terminated(command_line, transcript))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Output,
    Diagnostic,
}

fn decode(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_string()
}

/// Reads the shared pipe on a blocking thread until EOF or the receiver
/// goes away.
fn forward_pipe(reader: os_pipe::PipeReader, tx: &mpsc::Sender<(Stream, String)>) {
    let mut reader = std::io::BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if tx.blocking_send((Stream::Output, decode(&buf))).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Pipe read failed");
                break;
            }
        }
    }
}

/// Reads `reader` line by line into `tx` until EOF or the receiver goes away.
///
/// Lines are decoded lossily so binary noise cannot end the stream early.
async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send((stream, decode(&buf))).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Pipe read failed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::errors::ProcessFailure;
    use crate::process::CollectingLineSink;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_success_returns_transcript() {
        let sink = CollectingLineSink::new();
        let result = ProcessRunner::new()
            .run(&sh("echo one; echo two"), &sink)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.transcript, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(sink.lines(), result.transcript);
        assert_eq!(result.output(), "one\ntwo");
    }

    #[tokio::test]
    async fn test_nonzero_exit_streams_lines_and_keeps_transcript() {
        let sink = CollectingLineSink::new();
        let err = ProcessRunner::new()
            .run(&sh("echo a; echo b; echo c; exit 1"), &sink)
            .await
            .unwrap_err();

        assert_eq!(sink.lines(), vec!["a", "b", "c"]);
        assert_eq!(err.transcript, vec!["a", "b", "c"]);
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.failure, ProcessFailure::NonZeroExit);
        assert!(err.to_string().contains("failed with return code 1"));
    }

    #[tokio::test]
    async fn test_stderr_is_merged_in_emission_order() {
        let sink = CollectingLineSink::new();
        let script = "i=0; while [ $i -lt 200 ]; do echo out$i; echo err$i 1>&2; i=$((i+1)); done";
        let result = ProcessRunner::new().run(&sh(script), &sink).await.unwrap();

        let expected: Vec<String> = (0..200)
            .flat_map(|i| [format!("out{i}"), format!("err{i}")])
            .collect();
        assert_eq!(result.transcript, expected);
        assert_eq!(sink.lines(), expected);
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_stdout_only_keeps_stderr_out_of_transcript() {
        let sink = CollectingLineSink::new();
        let spec = sh("echo '[]'; echo 'ERROR : low level retry 1/10' 1>&2").stdout_only();
        let result = ProcessRunner::new().run(&spec, &sink).await.unwrap();

        assert_eq!(result.transcript, vec!["[]"]);
        assert_eq!(result.diagnostics, vec!["ERROR : low level retry 1/10"]);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_stdout_only_failure_keeps_diagnostics() {
        let sink = CollectingLineSink::new();
        let spec = sh("echo partial; echo 'bucket not found' 1>&2; exit 3").stdout_only();
        let err = ProcessRunner::new().run(&spec, &sink).await.unwrap_err();

        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.transcript, vec!["partial", "bucket not found"]);
    }

    #[tokio::test]
    async fn test_trailing_whitespace_is_trimmed() {
        let sink = CollectingLineSink::new();
        let result = ProcessRunner::new()
            .run(&sh("printf 'padded   \\r\\n'"), &sink)
            .await
            .unwrap();
        assert_eq!(result.transcript, vec!["padded"]);
    }

    #[tokio::test]
    async fn test_environment_overrides() {
        let sink = CollectingLineSink::new();
        let spec = sh("echo $EXPORTFLOW_TEST_VAR").env("EXPORTFLOW_TEST_VAR", "injected");
        let result = ProcessRunner::new().run(&spec, &sink).await.unwrap();
        assert_eq!(result.transcript, vec!["injected"]);

        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", "echo ${HOME:-unset}"])
            .clear_env();
        let result = ProcessRunner::new().run(&spec, &sink).await.unwrap();
        assert_eq!(result.transcript, vec!["unset"]);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let sink = CollectingLineSink::new();
        let result = ProcessRunner::new()
            .run(&CommandSpec::new("ls").current_dir(dir.path()), &sink)
            .await
            .unwrap();
        assert!(result.transcript.contains(&"marker.txt".to_string()));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let sink = CollectingLineSink::new();
        let err = ProcessRunner::new()
            .run(&CommandSpec::new("exportflow-no-such-binary"), &sink)
            .await
            .unwrap_err();
        assert_eq!(err.failure, ProcessFailure::Spawn);
        assert!(err.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let sink = CollectingLineSink::new();
        let spec = sh("echo started; exec sleep 5").timeout(Duration::from_millis(200));
        let err = ProcessRunner::new().run(&spec, &sink).await.unwrap_err();
        assert_eq!(err.failure, ProcessFailure::TimedOut);
        assert_eq!(err.transcript, vec!["started"]);
    }

    #[test]
    fn test_display_hides_environment() {
        let spec = CommandSpec::new("rclone")
            .args(["copy", "build/", "r2:site"])
            .env("RCLONE_CONFIG_R2_SECRET_ACCESS_KEY", "hunter2");
        assert_eq!(spec.to_string(), "rclone copy build/ r2:site");
    }
}
