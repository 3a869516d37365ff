use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::Runtime;

/// Handler export looked up when a request does not name one
pub const DEFAULT_HANDLER: &str = "handler";

/// An invocation request as received on the wire.
///
/// Nothing here has been validated yet; [`InvocationRequest`] is the checked form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationPayload {
    /// Runtime identifier (e.g. "javascript", "python")
    pub runtime: String,

    /// Handler source code
    pub code: String,

    /// Event passed to the handler
    #[serde(default = "empty_event")]
    pub event: Value,

    /// Name of the exported handler function
    #[serde(default)]
    pub handler: Option<String>,

    /// Wall clock deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl InvocationPayload {
    /// Create a payload with an empty event and the default handler name
    pub fn new(runtime: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            code: code.into(),
            event: empty_event(),
            handler: None,
            timeout_ms: None,
        }
    }

    /// Set the event passed to the handler
    pub fn with_event(mut self, event: Value) -> Self {
        self.event = event;
        self
    }

    /// Set the handler export name
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the wall clock deadline in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

fn empty_event() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A validated, immutable invocation request
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub(crate) runtime: Runtime,
    pub(crate) code: String,
    pub(crate) event: Value,
    pub(crate) handler_name: String,
    pub(crate) timeout: Option<Duration>,
}

impl InvocationRequest {
    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn event(&self) -> &Value {
        &self.event
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Requested deadline, before clamping to the configured maximum
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// The normalized HTTP-like response every invocation produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl CanonicalResponse {
    /// Default status when a handler does not provide a usable one
    pub const DEFAULT_STATUS: u16 = 200;

    /// Build a JSON error response of the form `{"error": message}`
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        let body = serde_json::json!({ "error": message.into() }).to_string();
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_owned(), "application/json".to_owned());
        Self {
            status_code,
            headers,
            body,
        }
    }

    /// Build a 500 response describing an internal failure
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::error(500, message)
    }

    /// Check if the status code is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl Default for CanonicalResponse {
    fn default() -> Self {
        Self {
            status_code: Self::DEFAULT_STATUS,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// The process exited and its output was drained
    Completed,

    /// The deadline fired before the process exited
    TimedOut,

    /// The caller cancelled the invocation
    Cancelled,

    /// The engine could not run the handler (workspace, interpreter or spawn failure)
    Failed,
}

/// Where the response of an invocation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// A framed result blob was captured and parsed
    Captured,

    /// No complete result blob was emitted; `{}` was used instead
    Missing,

    /// A result blob was emitted but was not valid JSON; `{}` was used instead
    Malformed,

    /// The engine produced the response itself (timeout, cancellation, failure)
    Synthetic,
}

impl ResultSource {
    /// Check if the response fell back to an empty result
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, ResultSource::Missing | ResultSource::Malformed)
    }
}

/// Result of an invocation
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Log lines from stdout and stderr, in arrival order
    pub logs: Vec<String>,

    /// Normalized response
    pub response: CanonicalResponse,

    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,

    /// How the invocation ended
    pub outcome: InvocationOutcome,

    /// Whether the response came from the handler or a fallback
    pub result_source: ResultSource,

    /// Wall clock time spent on the invocation
    pub duration: Duration,
}

impl ExecutionResult {
    /// Build the result of an invocation the engine could not run
    pub fn failed(message: impl Into<String>, logs: Vec<String>, duration: Duration) -> Self {
        Self {
            logs,
            response: CanonicalResponse::internal_error(message),
            exit_code: None,
            outcome: InvocationOutcome::Failed,
            result_source: ResultSource::Synthetic,
            duration,
        }
    }

    /// Build the result of an invocation cancelled by the caller
    pub fn cancelled(logs: Vec<String>, duration: Duration) -> Self {
        Self {
            logs,
            response: CanonicalResponse::internal_error("Invocation cancelled"),
            exit_code: None,
            outcome: InvocationOutcome::Cancelled,
            result_source: ResultSource::Synthetic,
            duration,
        }
    }

    /// Check if the process completed and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Completed) && self.exit_code == Some(0)
    }

    /// Check if the invocation hit its deadline
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::TimedOut)
    }
}

/// Wire form of an invocation response
///
/// `{ ok: true, response, logs }` on success, `{ ok: false, error, logs? }` on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<CanonicalResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl InvocationResponse {
    pub fn success(result: ExecutionResult) -> Self {
        Self {
            ok: true,
            response: Some(result.response),
            error: None,
            logs: Some(result.logs),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            response: None,
            error: Some(error.into()),
            logs: None,
        }
    }
}

/// How strongly a handler process is separated from the host.
///
/// Both policies rely on the OS process boundary only; neither applies
/// namespaces, cgroups or seccomp filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationPolicy {
    /// Separate process that inherits the host environment
    #[default]
    Process,

    /// Separate process with a cleared environment (only PATH, HOME and LANG are set)
    ScrubbedEnv,
}
