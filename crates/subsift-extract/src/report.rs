//! Reporting of skipped records.
//!
//! The router never fails on a bad record; it hands a [`RecordIssue`] to an
//! [`IssueReporter`] and moves on. The binary logs issues, tests collect them.

use crate::error::RecordError;
use parking_lot::Mutex;
use std::path::PathBuf;

/// Raw text kept in log lines before truncation.
const LOG_RAW_LIMIT: usize = 256;

/// A record that was skipped.
#[derive(Debug)]
pub struct RecordIssue {
    /// File the record came from.
    pub source: PathBuf,

    /// Source position of the record's chunk.
    pub offset: u64,

    /// Why it was skipped.
    pub error: RecordError,

    /// The offending line.
    pub raw: String,
}

/// Receives skipped-record reports.
pub trait IssueReporter: Send + Sync {
    /// Handle one skipped record.
    fn report(&self, issue: RecordIssue);
}

/// Logs each issue at `warn`.
#[derive(Debug, Default)]
pub struct LogReporter;

impl IssueReporter for LogReporter {
    fn report(&self, issue: RecordIssue) {
        tracing::warn!(
            source = %issue.source.display(),
            offset = issue.offset,
            raw = %truncate(&issue.raw, LOG_RAW_LIMIT),
            "Line decoding failed: {}",
            issue.error
        );
    }
}

/// Keeps every issue in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    issues: Mutex<Vec<RecordIssue>>,
}

impl CollectingReporter {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of issues collected.
    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }

    /// Remove and return the collected issues.
    pub fn take(&self) -> Vec<RecordIssue> {
        std::mem::take(&mut *self.issues.lock())
    }
}

impl IssueReporter for CollectingReporter {
    fn report(&self, issue: RecordIssue) {
        self.issues.lock().push(issue);
    }
}

/// Cut `text` to at most `limit` bytes on a character boundary.
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
