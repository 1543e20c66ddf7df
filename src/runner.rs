//! Child process execution with streamed output.
//!
//! Stdout and stderr are read concurrently and merged into one channel, so
//! the consumer sees chunks in the order they arrived from the OS. The exit
//! event is only sent after both pipes are drained.

use std::env;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SpawnError;
use crate::host::LogSurface;

/// Size of a single pipe read
const READ_BUFFER_BYTES: usize = 8 * 1024;

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One unit of process output as delivered by the pipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: Stream,
    pub text: String,
}

impl OutputChunk {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stderr,
            text: text.into(),
        }
    }
}

/// Events produced by a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(OutputChunk),
    /// Exit code, `None` when the process was killed by a signal
    Exited(Option<i32>),
}

/// Receiving end of a spawned process
pub struct ProcessHandle {
    events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl ProcessHandle {
    pub fn new(events: mpsc::UnboundedReceiver<ProcessEvent>) -> Self {
        Self { events }
    }

    /// A handle that replays a fixed list of events
    pub fn from_events(events: impl IntoIterator<Item = ProcessEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event);
        }
        Self::new(rx)
    }

    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }
}

/// Starts processes
pub trait Spawner: Send + Sync {
    fn spawn(&self, command: &str, cwd: &Path) -> Result<ProcessHandle, SpawnError>;
}

/// Spawner that runs commands through the platform shell
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellSpawner;

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// First program a shell command line would execute
fn leading_program(command: &str) -> Option<&str> {
    let command = command.trim_start();
    if let Some(rest) = command.strip_prefix('"') {
        return rest.split('"').next().filter(|p| !p.is_empty());
    }
    command.split_whitespace().next()
}

/// Fail before spawning when the interpreter or compiler is not installed.
///
/// Otherwise the shell reports "not found" on stderr and exits 127, which
/// would be explained as if the program itself had failed.
fn check_program(command: &str, cwd: &Path) -> Result<(), SpawnError> {
    let Some(program) = leading_program(command) else {
        return Ok(());
    };
    match which::which_in(program, env::var_os("PATH"), cwd) {
        Ok(path) => {
            debug!(program, path = %path.display(), "program resolved");
            Ok(())
        }
        Err(e) => Err(SpawnError {
            command: command.to_string(),
            message: format!("`{program}` was not found on PATH ({e})"),
        }),
    }
}

impl Spawner for ShellSpawner {
    fn spawn(&self, command: &str, cwd: &Path) -> Result<ProcessHandle, SpawnError> {
        check_program(command, cwd)?;

        let mut child = shell_command(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpawnError {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        debug!(command, pid = ?child.id(), "process spawned");

        let (tx, rx) = mpsc::unbounded_channel();
        let readers = [
            child
                .stdout
                .take()
                .map(|pipe| tokio::spawn(pump(pipe, Stream::Stdout, tx.clone()))),
            child
                .stderr
                .take()
                .map(|pipe| tokio::spawn(pump(pipe, Stream::Stderr, tx.clone()))),
        ];

        tokio::spawn(async move {
            for reader in readers.into_iter().flatten() {
                let _ = reader.await;
            }
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "failed to wait for process");
                    None
                }
            };
            let _ = tx.send(ProcessEvent::Exited(code));
        });

        Ok(ProcessHandle::new(rx))
    }
}

/// Forward a pipe to the event channel, decoding UTF-8 across read boundaries
async fn pump<R>(mut pipe: R, stream: Stream, tx: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = encoding_rs::UTF_8.new_decoder();
    let mut buf = [0u8; READ_BUFFER_BYTES];

    loop {
        let n = match pipe.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!(?stream, error = %e, "pipe read failed");
                0
            }
        };
        let last = n == 0;

        let capacity = decoder.max_utf8_buffer_length(n).unwrap_or(n * 3 + 4);
        let mut text = String::with_capacity(capacity);
        let _ = decoder.decode_to_string(&buf[..n], &mut text, last);

        if !text.is_empty() {
            let chunk = OutputChunk { stream, text };
            if tx.send(ProcessEvent::Output(chunk)).is_err() {
                break;
            }
        }
        if last {
            break;
        }
    }
}

/// Everything captured from one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Chunks in arrival order
    pub chunks: Vec<OutputChunk>,
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn stderr_text(&self) -> String {
        self.chunks
            .iter()
            .filter(|c| c.stream == Stream::Stderr)
            .map(|c| c.text.as_str())
            .collect()
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run `command` in `cwd`, writing every chunk to `log`.
///
/// Each stderr chunk is handed to `on_stderr` before the next chunk is read.
/// A nonzero exit code is part of the outcome, not an error.
pub async fn run<F>(
    spawner: &dyn Spawner,
    command: &str,
    cwd: &Path,
    log: &dyn LogSurface,
    mut on_stderr: F,
) -> Result<RunOutcome, SpawnError>
where
    F: FnMut(&str),
{
    let mut handle = spawner.spawn(command, cwd)?;
    let mut outcome = RunOutcome::default();

    while let Some(event) = handle.next_event().await {
        match event {
            ProcessEvent::Output(chunk) => {
                log.append(&chunk.text);
                if chunk.stream == Stream::Stderr {
                    on_stderr(&chunk.text);
                }
                outcome.chunks.push(chunk);
            }
            ProcessEvent::Exited(code) => {
                outcome.exit_code = code;
                break;
            }
        }
    }

    debug!(command, exit_code = ?outcome.exit_code, chunks = outcome.chunks.len(), "process finished");
    Ok(outcome)
}

/// Informational line logged once a run is over
pub fn exit_line(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("Process exited with code {code}"),
        None => "Process exited without an exit code (terminated by signal)".to_string(),
    }
}
