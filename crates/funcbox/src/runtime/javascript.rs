use crate::runtime::{InterpreterCandidate, Runtime, RuntimeAdapter, render_template};

pub(crate) const RUNNER_TEMPLATE: &str = include_str!("templates/runner.mjs");

const INTERPRETERS: &[InterpreterCandidate] = &[
    InterpreterCandidate {
        program: "node",
        args: &[],
    },
    InterpreterCandidate {
        program: "nodejs",
        args: &[],
    },
    InterpreterCandidate {
        program: "bun",
        args: &["run"],
    },
];

/// JavaScript handlers, run by Node.js (or Bun when Node is unavailable)
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScript;

impl RuntimeAdapter for JavaScript {
    fn runtime(&self) -> Runtime {
        Runtime::JavaScript
    }

    fn source_extension(&self) -> &'static str {
        "js"
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
