//! Run diagnostics: error and warning logs, and the null comparison tally

use std::fmt::Display;

use tracing::debug;

/// Number of messages kept per log for the end-of-run summary
pub const MAX_MESSAGES: usize = 50;

/// A counted message log that keeps only the first [`MAX_MESSAGES`]
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    count: usize,
    messages: Vec<String>,
}

impl MessageLog {
    fn push(&mut self, msg: String) {
        self.count += 1;
        if self.messages.len() < MAX_MESSAGES {
            self.messages.push(msg);
        }
    }

    /// Total number of messages, including those not kept
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// How many messages were counted but not kept
    pub fn omitted(&self) -> usize {
        self.count - self.messages.len()
    }

    /// Summary lines for this log, or nothing if it is empty
    fn summary(&self, title: &str) -> Vec<String> {
        if self.count == 0 {
            return Vec::new();
        }
        let mut lines = vec![
            String::new(),
            format!("*** {} ENCOUNTERED DURING RUN:", title),
            String::new(),
        ];
        lines.extend(self.messages.iter().cloned());
        if self.omitted() > 0 {
            lines.push(format!(
                "Limit reached; {} more error(s) not printed",
                self.omitted()
            ));
        }
        lines
    }
}

/// Everything that went wrong during a run, short of a fatal error
#[derive(Debug, Clone, Default)]
pub struct Report {
    errors: MessageLog,
    warnings: MessageLog,
    null_compares: u64,
    ignore_nulls: bool,
}

impl Report {
    pub fn new(ignore_nulls: bool) -> Self {
        Self {
            ignore_nulls,
            ..Default::default()
        }
    }

    /// Record an error and return the line to show for it
    pub fn error(&mut self, msg: impl Display) -> String {
        let line = format!("Error: {}", msg);
        debug!(message = %line, "Error recorded");
        self.errors.push(line.clone());
        line
    }

    /// Record a warning and return the line to show for it
    pub fn warning(&mut self, msg: impl Display) -> String {
        let line = format!("Warning: {}", msg);
        debug!(message = %line, "Warning recorded");
        self.warnings.push(line.clone());
        line
    }

    /// Count a comparison that involved a missing value, unless nulls are
    /// being ignored. `not_null` is the flag returned by the comparison.
    pub fn check_null_compare(&mut self, not_null: bool) {
        if !not_null {
            self.add_null_compares(1);
        }
    }

    pub fn add_null_compares(&mut self, n: u64) {
        if !self.ignore_nulls {
            self.null_compares += n;
        }
    }

    pub fn null_compares(&self) -> u64 {
        self.null_compares
    }

    /// Turn the null comparison tally into a single recorded error. Returns
    /// the line to show, if there was anything to report.
    pub fn report_null_compares(&mut self) -> Option<String> {
        match self.null_compares {
            0 => None,
            n => Some(self.error(format!("Comparison of a NULL value attempted {} time(s)", n))),
        }
    }

    pub fn errors(&self) -> &MessageLog {
        &self.errors
    }

    pub fn warnings(&self) -> &MessageLog {
        &self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors.count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.count()
    }

    /// Process exit status for a run that finished: 1 if any error was
    /// recorded, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.errors.count() > 0 {
            1
        } else {
            0
        }
    }

    /// Footer lines listing the kept warnings, then the kept errors
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = self.warnings.summary("WARNINGS");
        lines.extend(self.errors.summary("ERRORS"));
        lines
    }
}
