//! Invocation coordinator
//!
//! Validates requests and drives one invocation from workspace creation to
//! cleanup. Only validation failures are returned as errors; everything that
//! goes wrong after validation is reported through the [`ExecutionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, instrument, warn};

use crate::config::Config;
use crate::executor::{self, ExecuteOptions};
use crate::runtime::{Runtime, adapter_for};
use crate::types::{
    DEFAULT_HANDLER, ExecutionResult, InvocationPayload, InvocationRequest, InvocationResponse,
};
use crate::workspace::Workspace;

/// Errors that reject a request before anything is executed
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    #[error("Code must not be empty")]
    EmptyCode,

    #[error("Invalid handler name '{0}': expected an identifier")]
    InvalidHandler(String),

    #[error("timeoutMs must be greater than zero")]
    ZeroTimeout,
}

impl TryFrom<InvocationPayload> for InvocationRequest {
    type Error = ValidationError;

    fn try_from(payload: InvocationPayload) -> Result<Self, Self::Error> {
        let runtime: Runtime = payload
            .runtime
            .parse()
            .map_err(|_| ValidationError::UnsupportedRuntime(payload.runtime.clone()))?;

        if payload.code.trim().is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        let handler_name = payload
            .handler
            .unwrap_or_else(|| DEFAULT_HANDLER.to_owned());
        if !is_identifier(&handler_name) {
            return Err(ValidationError::InvalidHandler(handler_name));
        }

        let timeout = match payload.timeout_ms {
            Some(0) => return Err(ValidationError::ZeroTimeout),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        let event = if payload.event.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            payload.event
        };

        Ok(Self {
            runtime,
            code: payload.code,
            event,
            handler_name,
            timeout,
        })
    }
}

/// Check a handler name against `[A-Za-z_$][A-Za-z0-9_$]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
        _ => false,
    }
}

/// High-level entry point for running handlers
#[derive(Debug, Clone)]
pub struct Invoker {
    config: Config,
    permits: Arc<Semaphore>,
}

impl Invoker {
    /// Create a new invoker with the given configuration
    pub fn new(config: Config) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, permits }
    }

    /// Create a new invoker with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of invocations that could start right now without waiting
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Validate and run a payload
    pub async fn invoke(
        &self,
        payload: InvocationPayload,
    ) -> Result<ExecutionResult, ValidationError> {
        self.invoke_with_cancel(payload, CancellationToken::new())
            .await
    }

    /// Validate and run a payload; cancelling `cancel` kills the handler
    pub async fn invoke_with_cancel(
        &self,
        payload: InvocationPayload,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ValidationError> {
        let request = InvocationRequest::try_from(payload)?;
        Ok(self.run(&request, cancel).await)
    }

    /// Run a payload and map the outcome to the wire response
    pub async fn handle(&self, payload: InvocationPayload) -> InvocationResponse {
        self.handle_with_cancel(payload, CancellationToken::new())
            .await
    }

    /// Like [`handle`](Self::handle), with upstream cancellation
    pub async fn handle_with_cancel(
        &self,
        payload: InvocationPayload,
        cancel: CancellationToken,
    ) -> InvocationResponse {
        match self.invoke_with_cancel(payload, cancel).await {
            Ok(result) => InvocationResponse::success(result),
            Err(e) => {
                debug!(error = %e, "request rejected");
                InvocationResponse::failure(e.to_string())
            }
        }
    }

    /// Run a validated request.
    ///
    /// The workspace is reaped exactly once, whatever the outcome.
    #[instrument(
        skip_all,
        fields(runtime = %request.runtime(), handler = request.handler_name(), invocation_id = field::Empty)
    )]
    pub async fn run(&self, request: &InvocationRequest, cancel: CancellationToken) -> ExecutionResult {
        let started = Instant::now();

        let _permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("cancelled while waiting for a slot");
                return ExecutionResult::cancelled(Vec::new(), started.elapsed());
            }

            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return ExecutionResult::failed(
                        "invocation limiter closed",
                        Vec::new(),
                        started.elapsed(),
                    );
                }
            },
        };

        let adapter = adapter_for(request.runtime());
        let interpreter = match self.config.interpreter_for(adapter) {
            Ok(interpreter) => interpreter,
            Err(e) => {
                warn!(error = %e, "no interpreter available");
                return ExecutionResult::failed(e.to_string(), Vec::new(), started.elapsed());
            }
        };

        let workspace = match Workspace::create(&self.config.workspace_root()).await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "failed to provision workspace");
                return ExecutionResult::failed(e.to_string(), Vec::new(), started.elapsed());
            }
        };
        Span::current().record("invocation_id", field::display(workspace.id()));

        let options = ExecuteOptions {
            timeout: self.config.effective_timeout(request.timeout()),
            isolation: self.config.isolation,
            max_log_lines: self.config.max_log_lines,
            cancel,
        };

        let mut result = match workspace.write_artifacts(request, adapter).await {
            Ok(()) => executor::execute(&workspace, adapter, &interpreter, &options).await,
            Err(e) => {
                warn!(error = %e, "failed to prepare workspace");
                ExecutionResult::failed(e.to_string(), Vec::new(), started.elapsed())
            }
        };

        workspace.reap().await;

        result.duration = started.elapsed();
        debug!(
            outcome = ?result.outcome,
            status = result.response.status_code,
            duration_ms = result.duration.as_millis() as u64,
            "invocation finished"
        );
        result
    }
}
