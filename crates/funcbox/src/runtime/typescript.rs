use crate::runtime::javascript::RUNNER_TEMPLATE;
use crate::runtime::{InterpreterCandidate, Runtime, RuntimeAdapter, render_template};

const INTERPRETERS: &[InterpreterCandidate] = &[
    InterpreterCandidate {
        program: "bun",
        args: &["run"],
    },
    InterpreterCandidate {
        program: "node",
        args: &[
            "--experimental-strip-types",
            "--disable-warning=ExperimentalWarning",
        ],
    },
];

/// TypeScript handlers, run by Bun or by Node.js with type stripping.
///
/// Shares the JavaScript runner; only the source file and interpreters differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScript;

impl RuntimeAdapter for TypeScript {
    fn runtime(&self) -> Runtime {
        Runtime::TypeScript
    }

    fn source_extension(&self) -> &'static str {
        "ts"
    }

    fn runner_file_name(&self) -> &'static str {
        "runner.mjs"
    }

    fn interpreters(&self) -> &'static [InterpreterCandidate] {
        INTERPRETERS
    }

    fn render_runner(&self, handler_name: &str) -> String {
        render_template(RUNNER_TEMPLATE, handler_name, &self.source_file_name())
    }
}
