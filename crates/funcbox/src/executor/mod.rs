//! Process execution
//!
//! Spawns the interpreter for a prepared workspace, separates logs from the
//! framed result and turns every way a run can end into an [`ExecutionResult`].

use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub use crate::executor::framing::{
    DecodedOutput, FrameDecoder, MAX_RESULT_BYTES, RESULT_END, RESULT_START, StreamLine,
};
pub use crate::executor::process::{ChildProcess, ExitInfo, Termination};
use crate::normalize::normalize;
use crate::runtime::{Interpreter, RuntimeAdapter};
use crate::types::{
    CanonicalResponse, ExecutionResult, InvocationOutcome, IsolationPolicy, ResultSource,
};
use crate::workspace::Workspace;

pub mod framing;
pub mod process;

/// Errors starting an interpreter process
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("failed to spawn interpreter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("interpreter process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Per-invocation execution settings
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Wall clock deadline
    pub timeout: Duration,

    /// Environment policy for the child process
    pub isolation: IsolationPolicy,

    /// Maximum number of log lines kept
    pub max_log_lines: usize,

    /// Upstream cancellation
    pub cancel: CancellationToken,
}

impl ExecuteOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            isolation: IsolationPolicy::default(),
            max_log_lines: usize::MAX,
            cancel: CancellationToken::new(),
        }
    }
}

/// Run the workspace's runner script and collect the result.
///
/// This never fails: spawn errors, timeouts, cancellation and malformed
/// output are all reported through the returned [`ExecutionResult`].
#[instrument(skip_all, fields(runtime = %adapter.runtime(), timeout_ms = options.timeout.as_millis() as u64))]
pub async fn execute(
    workspace: &Workspace,
    adapter: &dyn RuntimeAdapter,
    interpreter: &Interpreter,
    options: &ExecuteOptions,
) -> ExecutionResult {
    let started = Instant::now();

    let mut process = match ChildProcess::spawn(
        interpreter,
        adapter.runner_file_name(),
        workspace.path(),
        options.isolation,
    ) {
        Ok(process) => process,
        Err(e) => {
            warn!(error = %e, "failed to start interpreter");
            return ExecutionResult::failed(e.to_string(), Vec::new(), started.elapsed());
        }
    };

    let mut decoder = FrameDecoder::new(options.max_log_lines);
    let termination = process
        .supervise(options.timeout, &options.cancel, |line| decoder.push(line))
        .await;
    drop(process);

    let result = finalize(
        termination,
        decoder.finish(),
        options.timeout,
        started.elapsed(),
    );
    debug!(
        outcome = ?result.outcome,
        source = ?result.result_source,
        status = result.response.status_code,
        "execution complete"
    );
    result
}

/// Build the result for a finished run
fn finalize(
    termination: Termination,
    decoded: DecodedOutput,
    timeout: Duration,
    duration: Duration,
) -> ExecutionResult {
    let DecodedOutput {
        mut logs,
        result,
        dropped,
        oversized,
    } = decoded;

    if dropped > 0 {
        logs.push(format!(
            "[runtime] log output truncated ({dropped} lines dropped)"
        ));
    }

    let timeout_ms = timeout.as_millis();
    match termination {
        Termination::Exited(exit) => {
            completed(exit, result.as_deref(), oversized, logs, duration)
        }
        Termination::ExitedPastDeadline(exit) => {
            logs.push(format!(
                "[runtime] output still open {timeout_ms} ms after start, process group killed"
            ));
            completed(exit, result.as_deref(), oversized, logs, duration)
        }
        Termination::TimedOut => {
            logs.push(format!("[runtime] timed out after {timeout_ms} ms"));
            ExecutionResult {
                logs,
                response: CanonicalResponse::internal_error(format!(
                    "Function timed out after {timeout_ms} ms"
                )),
                exit_code: None,
                outcome: InvocationOutcome::TimedOut,
                result_source: ResultSource::Synthetic,
                duration,
            }
        }
        Termination::Cancelled => {
            logs.push("[runtime] invocation cancelled".to_owned());
            ExecutionResult::cancelled(logs, duration)
        }
    }
}

fn completed(
    exit: ExitInfo,
    blob: Option<&str>,
    oversized: bool,
    mut logs: Vec<String>,
    duration: Duration,
) -> ExecutionResult {
    match (exit.code, exit.signal) {
        (Some(0), _) => {}
        (Some(code), _) => logs.push(format!("[runtime] process exited with code {code}")),
        (None, Some(signal)) => {
            logs.push(format!("[runtime] process terminated by signal {signal}"))
        }
        (None, None) => logs.push("[runtime] process exit status unknown".to_owned()),
    }

    let (value, source) = match blob {
        None if oversized => {
            logs.push(format!(
                "[runtime] result exceeded {MAX_RESULT_BYTES} bytes, using {{}}"
            ));
            (empty_result(), ResultSource::Malformed)
        }
        None => {
            logs.push("[runtime] no result emitted, using {}".to_owned());
            (empty_result(), ResultSource::Missing)
        }
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => (value, ResultSource::Captured),
            Err(e) => {
                logs.push(format!("[runtime] malformed result ignored, using {{}}: {e}"));
                (empty_result(), ResultSource::Malformed)
            }
        },
    };

    ExecutionResult {
        logs,
        response: normalize(&value),
        exit_code: exit.code,
        outcome: InvocationOutcome::Completed,
        result_source: source,
        duration,
    }
}

fn empty_result() -> Value {
    Value::Object(serde_json::Map::new())
}
