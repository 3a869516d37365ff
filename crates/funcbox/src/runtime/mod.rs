//! Runtime adapters
//!
//! Each supported language has one [`RuntimeAdapter`] that knows the file
//! extension of user code, which interpreter to launch and how to render the
//! runner script that loads the handler and frames its result.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

pub use crate::runtime::javascript::JavaScript;
pub use crate::runtime::python::Python;
pub use crate::runtime::typescript::TypeScript;
use crate::executor::{RESULT_END, RESULT_START};
use crate::workspace::EVENT_FILE;

mod javascript;
mod python;
mod typescript;

/// Errors from runtime selection and interpreter lookup
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unsupported runtime '{0}' (expected one of: javascript, typescript, python)")]
    Unsupported(String),

    #[error("no interpreter found for runtime {runtime} (tried: {tried})")]
    InterpreterNotFound { runtime: Runtime, tried: String },

    #[error("interpreter '{0}' not found")]
    CommandNotFound(String),

    #[error("interpreter command is empty")]
    EmptyCommand,
}

/// The closed set of supported runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    JavaScript,
    TypeScript,
    Python,
}

impl Runtime {
    /// Every supported runtime
    pub const ALL: [Runtime; 3] = [Runtime::JavaScript, Runtime::TypeScript, Runtime::Python];

    /// Canonical identifier used on the wire and in configuration
    pub fn id(&self) -> &'static str {
        match self {
            Runtime::JavaScript => "javascript",
            Runtime::TypeScript => "typescript",
            Runtime::Python => "python",
        }
    }
}

impl FromStr for Runtime {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" => Ok(Runtime::JavaScript),
            "typescript" | "ts" => Ok(Runtime::TypeScript),
            "python" | "python3" | "py" => Ok(Runtime::Python),
            _ => Err(RuntimeError::Unsupported(s.to_owned())),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A candidate interpreter command, tried in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterCandidate {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// An interpreter resolved to a program on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Interpreter {
    /// Resolve an explicit command line such as `["python3", "-u"]`
    pub fn from_command(command: &[String]) -> Result<Self, RuntimeError> {
        let (program, args) = command.split_first().ok_or(RuntimeError::EmptyCommand)?;
        let program = resolve_program(program)
            .ok_or_else(|| RuntimeError::CommandNotFound(program.clone()))?;
        Ok(Self {
            program,
            args: args.to_vec(),
        })
    }
}

/// Language-specific knowledge needed to run a handler
pub trait RuntimeAdapter: fmt::Debug + Send + Sync {
    /// The runtime this adapter implements
    fn runtime(&self) -> Runtime;

    /// Extension of the user source file, without a dot
    fn source_extension(&self) -> &'static str;

    /// File name of the generated runner script
    fn runner_file_name(&self) -> &'static str;

    /// Interpreter commands in order of preference
    fn interpreters(&self) -> &'static [InterpreterCandidate];

    /// Render the runner script for the given handler export
    fn render_runner(&self, handler_name: &str) -> String;

    /// File name of the user source in the workspace
    fn source_file_name(&self) -> String {
        format!("handler.{}", self.source_extension())
    }
}

/// Look up the adapter for a runtime
pub fn adapter_for(runtime: Runtime) -> &'static dyn RuntimeAdapter {
    match runtime {
        Runtime::JavaScript => &JavaScript,
        Runtime::TypeScript => &TypeScript,
        Runtime::Python => &Python,
    }
}

/// Pick an interpreter for an adapter.
///
/// An explicit command (from configuration) wins; otherwise the adapter's
/// candidates are tried in order and the first found on `PATH` is used.
pub fn resolve_interpreter(
    adapter: &dyn RuntimeAdapter,
    command: Option<&[String]>,
) -> Result<Interpreter, RuntimeError> {
    if let Some(command) = command {
        return Interpreter::from_command(command);
    }

    for candidate in adapter.interpreters() {
        if let Some(program) = resolve_program(candidate.program) {
            return Ok(Interpreter {
                program,
                args: candidate.args.iter().map(|arg| (*arg).to_owned()).collect(),
            });
        }
    }

    Err(RuntimeError::InterpreterNotFound {
        runtime: adapter.runtime(),
        tried: adapter
            .interpreters()
            .iter()
            .map(|c| c.program)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Resolve a program name to a path using the host's `PATH`.
///
/// Names containing a `/` are taken as paths and only checked for existence.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Substitute the shared runner placeholders in a single pass.
///
/// Values are inserted as JSON string literals, which both JavaScript and
/// Python read as plain strings. Inserted text is never rescanned, and braces
/// that do not open a known placeholder are copied through.
pub(crate) fn render_template(template: &str, handler_name: &str, source_file: &str) -> String {
    let values = [
        ("{handler_name}", string_literal(handler_name)),
        ("{source_file}", string_literal(source_file)),
        ("{event_file}", string_literal(EVENT_FILE)),
        ("{result_start}", string_literal(RESULT_START)),
        ("{result_end}", string_literal(RESULT_END)),
    ];

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        rendered.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match values
            .iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                rendered.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                rendered.push('{');
                rest = &tail[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

fn string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}
