use crate::runtime::{InterpreterCandidate, Runtime, RuntimeAdapter, render_template};

const RUNNER_TEMPLATE: &str = include_str!("templates/runner.py");

// -u keeps stdout unbuffered so log lines arrive as they are printed
const INTERPRETERS: &[InterpreterCandidate] = &[
    InterpreterCandidate {
        program: "python3",
        args: &["-u"],
    },
    InterpreterCandidate {
        program: "python",
        args: &["-u"],
    },
];

/// Python 3 handlers
#[derive(Debug, Clone, Copy, Default)]
pub struct Python;

impl RuntimeAdapter for Python {
    fn runtime(&self) -> Runtime {
        Runtime::Python
    }

    fn source_extension(&self) -> &'static str {
        "py"
    }

    fn runner_file_name(&self) -> &'static str {
        "runner.py"
    }

    fn interpreters(&self) -> &'static [InterpreterCandidate] {
        INTERPRETERS
    }

    fn render_runner(&self, handler_name: &str) -> String {
        render_template(RUNNER_TEMPLATE, handler_name, &self.source_file_name())
    }
}
