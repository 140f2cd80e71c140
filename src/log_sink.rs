//! Per-call diagnostic log
//!
//! Every component that hits a non-fatal problem appends a line here. The
//! accumulated text is handed back to the caller at the very end of an entry
//! point, next to the (possibly degraded) result.

use std::fmt::Display;
use tracing::warn;

use crate::error::MediaError;

const SEPARATOR: &str = "\n\n";

/// Append-only log buffer owned by a single pipeline invocation.
#[derive(Debug, Default)]
pub struct LogSink {
    text: String,
    entries: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry, separated from the previous one by a blank line.
    pub fn push(&mut self, entry: impl Display) {
        let entry = entry.to_string();
        warn!(entry = self.entries + 1, "{}", entry);

        if !self.text.is_empty() {
            self.text.push_str(SEPARATOR);
        }
        self.text.push_str(&entry);
        self.entries += 1;
    }

    /// Append a pipeline error.
    pub fn record(&mut self, err: &MediaError) {
        self.push(err);
    }

    /// Number of entries appended so far
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Hand the log over to the caller; `None` means nothing was logged.
    pub fn into_option(self) -> Option<String> {
        if self.entries == 0 {
            None
        } else {
            Some(self.text)
        }
    }
}
