//! Error types for every stage of a diff application.
//!
//! Expected outcomes (a malformed block, a bad line range, no good match) are
//! plain values of [`DiffError`]. Commit problems are [`CommitError`], and
//! [`ApplyError`] is the single shape returned to callers of the service.

use crate::locate::MatchDiagnostics;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons the pure locate-and-apply step can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    /// The diff text does not contain the `<<<<<<< SEARCH`, `=======` and
    /// `>>>>>>> REPLACE` markers in that order.
    #[error("Invalid diff format - missing required SEARCH/REPLACE sections")]
    InvalidFormat,
    /// The SEARCH section is empty, which is only allowed as an insertion
    /// anchored at a single line (`start_line == end_line`).
    #[error("{}", empty_search_message(.start_line, .end_line))]
    EmptySearchRequiresAnchor {
        start_line: Option<usize>,
        end_line: Option<usize>,
    },
    /// The line range hint does not fit the current file.
    #[error("Line range {start_line}-{end_line} is invalid (file has {line_count} lines)")]
    InvalidRange {
        start_line: usize,
        end_line: usize,
        line_count: usize,
    },
    /// Only one of `start_line` / `end_line` was supplied.
    #[error("Line range requires both start_line and end_line (got start: {start_line:?}, end: {end_line:?})")]
    IncompleteRange {
        start_line: Option<usize>,
        end_line: Option<usize>,
    },
    /// The fuzzy search finished without reaching the threshold.
    #[error("{}", .0.report())]
    NoSufficientMatch(Box<MatchDiagnostics>),
}

fn empty_search_message(start_line: &Option<usize>, end_line: &Option<usize>) -> String {
    match (start_line, end_line) {
        (Some(start), Some(end)) => format!(
            "Empty search content requires start_line and end_line to be the same (got {}-{})",
            start, end
        ),
        _ => "Empty search content requires start_line to be specified".to_string(),
    }
}

/// What went wrong inside a commit before rollback was attempted.
#[derive(Error, Debug)]
pub enum CommitFailureCause {
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("reading back the written content failed: {0}")]
    ReadBack(#[source] std::io::Error),
    #[error("content verification failed: read-back content differs from the written content")]
    Mismatch,
}

/// Errors from the write, verify and rollback cycle.
#[derive(Error, Debug)]
pub enum CommitError {
    /// The pre-commit snapshot could not be taken. Nothing was written.
    #[error("Failed to snapshot {path:?} before writing: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The backup copy could not be written. Nothing was written to the target.
    #[error("Failed to write backup copy {path:?}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The commit failed and the previous content was restored.
    #[error("Commit to {path:?} failed ({cause}); previous content restored")]
    RolledBack {
        path: PathBuf,
        cause: CommitFailureCause,
    },
    /// The commit failed and restoring the previous content failed too. The
    /// file may be left modified but unverified.
    #[error("Commit to {path:?} failed ({cause}) and rollback also failed: {rollback}")]
    RollbackFailed {
        path: PathBuf,
        cause: CommitFailureCause,
        rollback: std::io::Error,
    },
}

/// The error returned by [`crate::DiffApplier::apply`] and [`crate::Session::apply`].
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The target path is a directory.
    #[error("Path {path:?} is a directory. Apply-diff supports files only.")]
    NotAFile { path: PathBuf },
    /// The requested path resolves outside the session root.
    #[error("Path '{0}' resolves outside the project root. Aborting for security.")]
    PathTraversal(PathBuf),
    /// The current content of the target could not be read.
    #[error("Error accessing path {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The operation was cancelled before the commit started.
    #[error("Diff application cancelled before commit")]
    Cancelled,
    #[error(transparent)]
    Diff(#[from] DiffError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}

impl ApplyError {
    /// Returns the match diagnostics when the failure was a rejected fuzzy match.
    pub fn diagnostics(&self) -> Option<&MatchDiagnostics> {
        match self {
            ApplyError::Diff(DiffError::NoSufficientMatch(diagnostics)) => Some(&**diagnostics),
            _ => None,
        }
    }
}
