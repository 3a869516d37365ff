//! Result framing on stdout
//!
//! The runner prints its result between two sentinel lines. Everything else a
//! handler prints, on either stream, is a log line. [`FrameDecoder`] splits
//! the merged line stream back into logs and the result text.

/// Line that opens the result blob
pub const RESULT_START: &str = "___RESULT_START___";

/// Line that closes the result blob
pub const RESULT_END: &str = "___RESULT_END___";

/// Largest result blob kept, in bytes
pub const MAX_RESULT_BYTES: usize = 6 * 1024 * 1024;

/// A line read from one of the child's output streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Stdout(String),
    Stderr(String),
}

#[derive(Debug)]
enum State {
    Logging,
    Capturing(Vec<String>),
}

/// Output of a decoded process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    /// Log lines in arrival order, result blob excised
    pub logs: Vec<String>,

    /// Text of the last complete result blob, if any
    pub result: Option<String>,

    /// Number of log lines dropped because of the line cap
    pub dropped: usize,

    /// A result blob was abandoned for exceeding the size cap
    pub oversized: bool,
}

/// Incremental demultiplexer for the sentinel framing protocol.
///
/// A start sentinel while a capture is open restarts the capture and returns
/// the abandoned lines to the log. A start sentinel after a completed blob
/// demotes that blob to the log. The last complete blob therefore wins, and
/// the runner always emits its blob last.
///
/// A capture that grows past the size cap is returned to the log, where the
/// line cap bounds it, and decoding carries on outside the blob.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    result: Option<Vec<String>>,
    logs: Vec<String>,
    max_log_lines: usize,
    dropped: usize,
    captured_bytes: usize,
    max_result_bytes: usize,
    oversized: bool,
}

impl FrameDecoder {
    pub fn new(max_log_lines: usize) -> Self {
        Self {
            state: State::Logging,
            result: None,
            logs: Vec::new(),
            max_log_lines,
            dropped: 0,
            captured_bytes: 0,
            max_result_bytes: MAX_RESULT_BYTES,
            oversized: false,
        }
    }

    /// Override the result blob size cap
    pub fn with_max_result_bytes(mut self, max_result_bytes: usize) -> Self {
        self.max_result_bytes = max_result_bytes;
        self
    }

    /// Feed one line from either stream
    pub fn push(&mut self, line: StreamLine) {
        match line {
            StreamLine::Stderr(line) => self.log(line),
            StreamLine::Stdout(line) => self.push_stdout(line),
        }
    }

    fn push_stdout(&mut self, line: String) {
        if line == RESULT_START {
            if let Some(accepted) = self.result.take() {
                self.return_to_log(accepted, true);
            }
            if let State::Capturing(abandoned) =
                std::mem::replace(&mut self.state, State::Capturing(Vec::new()))
            {
                self.return_to_log(abandoned, false);
            }
            self.captured_bytes = 0;
            return;
        }

        if !self.is_capturing() {
            self.log(line);
            return;
        }

        if line == RESULT_END {
            if let State::Capturing(lines) = std::mem::replace(&mut self.state, State::Logging) {
                self.result = Some(lines);
            }
            return;
        }

        // Joined with newlines, so each line costs one extra byte
        self.captured_bytes = self.captured_bytes.saturating_add(line.len() + 1);
        if self.captured_bytes > self.max_result_bytes {
            self.oversized = true;
            if let State::Capturing(abandoned) = std::mem::replace(&mut self.state, State::Logging)
            {
                self.return_to_log(abandoned, false);
            }
            self.log(line);
            return;
        }

        if let State::Capturing(lines) = &mut self.state {
            lines.push(line);
        }
    }

    fn return_to_log(&mut self, lines: Vec<String>, terminated: bool) {
        self.log(RESULT_START.to_owned());
        for line in lines {
            self.log(line);
        }
        if terminated {
            self.log(RESULT_END.to_owned());
        }
    }

    fn log(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        if self.logs.len() >= self.max_log_lines {
            self.dropped += 1;
        } else {
            self.logs.push(line);
        }
    }

    /// Check if a result blob is currently being captured
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing(_))
    }

    /// Finish decoding; an unterminated capture is returned to the log
    pub fn finish(mut self) -> DecodedOutput {
        if let State::Capturing(abandoned) = std::mem::replace(&mut self.state, State::Logging) {
            self.return_to_log(abandoned, false);
        }

        DecodedOutput {
            logs: self.logs,
            result: self.result.map(|lines| lines.join("\n")),
            dropped: self.dropped,
            oversized: self.oversized,
        }
    }
}
