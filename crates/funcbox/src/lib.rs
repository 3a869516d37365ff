//! A library for invoking untrusted function handlers.
//!
//! Funcbox runs user-submitted handler source code in a fresh interpreter
//! process inside an ephemeral workspace, separates the handler's logs from
//! its result and normalizes whatever the handler returned into an HTTP-like
//! `{statusCode, headers, body}` response.
//!
//! # Features
//!
//! - **Multi-runtime** — JavaScript, TypeScript and Python handlers.
//! - **Deadlines and cancellation** — the whole process group is killed on timeout or abort.
//! - **Sentinel framing** — the result travels on stdout between two marker lines.
//! - **Response normalization** — one response contract regardless of runtime.
//! - **Guaranteed cleanup** — every workspace is removed, whatever the outcome.
//! - **TOML configuration** — timeouts, concurrency, isolation policy and interpreter overrides.
//!
//! Process isolation only: no namespaces, cgroups or seccomp filters are applied.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, InterpreterConfig};
pub use executor::{ExecuteError, ExecuteOptions, RESULT_END, RESULT_START, execute};
pub use invoker::{Invoker, ValidationError};
pub use normalize::normalize;
pub use runtime::{Interpreter, Runtime, RuntimeAdapter, RuntimeError, adapter_for};
pub use types::{
    CanonicalResponse, DEFAULT_HANDLER, ExecutionResult, InvocationOutcome, InvocationPayload,
    InvocationRequest, InvocationResponse, IsolationPolicy, ResultSource,
};
pub use workspace::{EVENT_FILE, Workspace, WorkspaceError};

pub mod config;
pub mod executor;
pub mod invoker;
pub mod normalize;
pub mod runtime;
pub mod types;
pub mod workspace;
