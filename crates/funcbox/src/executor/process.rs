//! Child process spawning and supervision
//!
//! Runs one interpreter process per invocation, streams its output line by
//! line and races completion against the deadline and cancellation.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::executor::ExecuteError;
use crate::executor::framing::StreamLine;
use crate::runtime::Interpreter;
use crate::types::IsolationPolicy;

/// Capacity of the channel shared by the two output pumps
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Longest line forwarded from an output stream; the rest is discarded
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// How long to keep reading output after the process group was killed
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Exit information of a finished process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code if the process exited normally
    pub code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// How supervision of a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited and both output streams reached EOF
    Exited(ExitInfo),

    /// The deadline fired while the process was still running
    TimedOut,

    /// The cancellation token fired
    Cancelled,

    /// The process exited, but its output streams were still held open by a
    /// descendant when the deadline fired
    ExitedPastDeadline(ExitInfo),
}

/// A spawned interpreter process with its output pumps
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    lines: mpsc::Receiver<StreamLine>,
    pumps: Vec<JoinHandle<()>>,
    group_signalled: bool,
}

impl ChildProcess {
    /// Spawn `interpreter` with `entry` as its script, inside `workdir`.
    ///
    /// The child gets its own process group, a null stdin and piped output.
    #[instrument(skip(interpreter, workdir), fields(program = %interpreter.program.display()))]
    pub fn spawn(
        interpreter: &Interpreter,
        entry: &str,
        workdir: &Path,
        isolation: IsolationPolicy,
    ) -> Result<Self, ExecuteError> {
        let mut command = Command::new(&interpreter.program);
        command
            .args(&interpreter.args)
            .arg(entry)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        if isolation == IsolationPolicy::ScrubbedEnv {
            command.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                command.env("PATH", path);
            }
            command.env("HOME", workdir).env("LANG", "C.UTF-8");
        }

        let mut child = command.spawn().map_err(|source| ExecuteError::Spawn {
            program: interpreter.program.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(ExecuteError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecuteError::MissingPipe("stderr"))?;

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let pumps = vec![
            pump(stdout, tx.clone(), StreamLine::Stdout),
            pump(stderr, tx, StreamLine::Stderr),
        ];

        let pid = child.id();
        debug!(?pid, "spawned interpreter process");

        Ok(Self {
            child,
            pid,
            lines,
            pumps,
            group_signalled: false,
        })
    }

    /// Stream output into `on_line` until the process completes, the deadline
    /// passes or `cancel` fires.
    ///
    /// Completion means the process exited and both streams reached EOF. The
    /// process group is killed before this returns, whatever the outcome.
    pub async fn supervise<F>(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
        mut on_line: F,
    ) -> Termination
    where
        F: FnMut(StreamLine),
    {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut exit: Option<ExitInfo> = None;
        let mut streams_open = true;

        let termination = loop {
            if !streams_open && let Some(exit) = exit {
                break Termination::Exited(exit);
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("invocation cancelled");
                    break Termination::Cancelled;
                }

                _ = &mut deadline => {
                    break match exit {
                        Some(exit) => Termination::ExitedPastDeadline(exit),
                        None => Termination::TimedOut,
                    };
                }

                line = self.lines.recv(), if streams_open => match line {
                    Some(line) => on_line(line),
                    None => streams_open = false,
                },

                status = self.child.wait(), if exit.is_none() => {
                    let info = match status {
                        Ok(status) => ExitInfo::from(status),
                        Err(e) => {
                            warn!(error = %e, "failed to wait for interpreter process");
                            ExitInfo { code: None, signal: None }
                        }
                    };
                    debug!(code = ?info.code, signal = ?info.signal, "interpreter exited");
                    exit = Some(info);
                }
            }
        };

        self.kill().await;

        if !matches!(termination, Termination::Exited(_)) {
            self.drain(&mut on_line).await;
        }

        termination
    }

    /// Kill the whole process group and reap the child
    async fn kill(&mut self) {
        self.signal_group();
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "kill after exit");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "failed to reap interpreter process");
        }
    }

    /// Collect output still buffered after a kill, for a short grace period
    async fn drain<F>(&mut self, on_line: &mut F)
    where
        F: FnMut(StreamLine),
    {
        let grace = tokio::time::sleep(DRAIN_GRACE);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                biased;

                line = self.lines.recv() => match line {
                    Some(line) => on_line(line),
                    None => break,
                },

                _ = &mut grace => {
                    debug!("output still open after kill, giving up on the rest");
                    break;
                }
            }
        }
    }

    fn signal_group(&mut self) {
        if self.group_signalled {
            return;
        }
        self.group_signalled = true;

        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        self.signal_group();
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    // ESRCH just means every member is already gone
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(error = %e, "process group signal");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Forward lines from one output stream into the shared channel
fn pump<R>(
    reader: R,
    tx: mpsc::Sender<StreamLine>,
    wrap: fn(String) -> StreamLine,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await {
                Ok((0, _)) => break,
                Ok((_, truncated)) => {
                    let mut line = decode_line(&buf);
                    if truncated {
                        line.push_str(" [line truncated]");
                    }
                    if tx.send(wrap(line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// Read one line into `buf`, keeping at most `max` bytes of its content.
///
/// The newline is consumed but not stored. Returns the number of bytes read
/// from the stream and whether the line was cut short.
async fn read_line_capped<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<(usize, bool)>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let mut truncated = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((consumed, truncated));
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let content = match newline {
            Some(i) => &available[..i],
            None => available,
        };

        let room = max.saturating_sub(buf.len());
        if content.len() > room {
            truncated = true;
        }
        buf.extend_from_slice(&content[..content.len().min(room)]);

        let used = newline.map_or(content.len(), |i| i + 1);
        reader.consume(used);
        consumed += used;

        if newline.is_some() {
            return Ok((consumed, truncated));
        }
    }
}

/// Strip the line terminator and decode lossily
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
