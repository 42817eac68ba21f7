//! Fuzzy application of SEARCH/REPLACE diff blocks to files that may have drifted.
//!
//! `srpatch` takes an edit proposed as a conflict-marker style block,
//!
//! ```text
//! <<<<<<< SEARCH
//! (text expected in the file)
//! =======
//! (text to put in its place)
//! >>>>>>> REPLACE
//! ```
//!
//! finds where the SEARCH text lives in the *current* content of a file, and
//! swaps in the REPLACE text. The file may have changed since the block was
//! written, the block may carry line-number prefixes echoed from a numbered
//! listing, and its indentation may not match the file's. None of that stops
//! the edit from landing, as long as the located region is similar enough.
//!
//! ## Getting Started
//!
//! ```rust
//! use srpatch::{ApplyOptions, CancellationToken, DiffApplier, DiskWorkspace, LineRange};
//! use std::fs;
//! use std::time::Duration;
//! use tempfile::tempdir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 1. A file to patch.
//! let dir = tempdir()?;
//! let path = dir.path().join("calc.py");
//! fs::write(&path, "def f(x):\n    return x + 1\n")?;
//!
//! // 2. A block whose lines were copied from a numbered listing.
//! let diff = "<<<<<<< SEARCH\n2 |     return x + 1\n=======\n2 |     return x * 2\n>>>>>>> REPLACE";
//!
//! // 3. Apply it with a line hint.
//! let options = ApplyOptions::builder().settle_delay(Duration::ZERO).build();
//! let applier = DiffApplier::new(DiskWorkspace, options);
//! let applied = applier.apply(&path, diff, Some(LineRange::new(2, 2)), &CancellationToken::new())?;
//!
//! assert_eq!(applied.score, 1.0);
//! assert_eq!(fs::read_to_string(&path)?, "def f(x):\n    return x * 2\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### The Apply Pipeline
//!
//! 1.  **Parsing:** [`parse_diff_block`] extracts the SEARCH and REPLACE
//!     bodies and strips line-number prefixes when both bodies carry them.
//! 2.  **Locating:** [`RegionLocator`] tries the hinted range first, then
//!     scans a window around it middle-out, scoring candidates with
//!     [`similarity`]. The closest region to the hint wins ties.
//! 3.  **Reconciling:** [`reconcile_indentation`] re-bases the REPLACE lines
//!     onto the matched region's indentation.
//! 4.  **Committing:** [`PatchCommitter`] snapshots, writes, verifies by
//!     reading back and rolls back on failure.
//!
//! Steps 1 to 3 are pure and available as [`apply_diff_to_content`].
//! [`DiffApplier`] adds the file I/O, and [`Session`] adds a workspace root
//! and request validation on top.
//!
//! ### Unsaved Edits
//!
//! Content comes from a [`ContentProvider`]. [`EditorBuffers`] models open
//! editor buffers over the disk: a file with unsaved edits is patched (and
//! committed) in its buffer, so those edits are never lost.
//!
//! ### Failures
//!
//! Expected failures are values. A rejected match carries
//! [`MatchDiagnostics`], whose [`report`](MatchDiagnostics::report) shows
//! the best candidate and the surrounding original lines so that the block
//! can be corrected and retried.
//!
//! ```rust
//! use srpatch::{apply_diff_to_content, ApplyOptions, DiffError};
//!
//! let original = "alpha\nbeta\ngamma\n";
//! let diff = "<<<<<<< SEARCH\nzeta\n=======\ndelta\n>>>>>>> REPLACE";
//!
//! match apply_diff_to_content(original, diff, None, &ApplyOptions::default()) {
//!     Err(DiffError::NoSufficientMatch(diagnostics)) => {
//!         assert!(diagnostics.score < 0.9);
//!         assert!(diagnostics.report().contains("Original Content:"));
//!     }
//!     other => panic!("expected a rejected match, got {:?}", other),
//! }
//! ```

mod commit;
mod error;
mod indent;
mod line_numbers;
mod locate;
mod metrics;
mod parse;
mod service;

pub use commit::{
    CommitReport, CommitSink, ContentProvider, DiskWorkspace, EditorBuffers, PatchCommitter,
    DEFAULT_SETTLE_DELAY, MAX_SETTLE_DELAY,
};
pub use error::{ApplyError, CommitError, CommitFailureCause, DiffError};
pub use indent::reconcile_indentation;
pub use line_numbers::{add_line_numbers, looks_line_numbered, strip_line_numbers, LineEnding};
pub use locate::{
    middle_out_starts, LineRange, MatchCandidate, MatchDiagnostics, RegionLocator,
    DEFAULT_BUFFER_LINES,
};
pub use metrics::{levenshtein_distance, similarity};
pub use parse::{parse_diff_block, DiffBlock, REPLACE_MARKER, SEARCH_MARKER, SEPARATOR_MARKER};
pub use service::{
    apply_diff_to_content, resolve_in_root, AppliedDiff, ApplyDiffRequest, CancellationToken,
    DiffApplier, PatchedContent, Session,
};

use std::path::PathBuf;
use std::time::Duration;

/// The similarity a located region needs by default.
pub const DEFAULT_FUZZ_THRESHOLD: f64 = 0.9;

/// Options for configuring how a diff is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptions {
    /// The minimum similarity (0.0 to 1.0) for a region to be accepted.
    /// Higher is stricter.
    pub fuzz_threshold: f64,
    /// How many lines around the hinted range are scanned when the hinted
    /// range itself does not match.
    pub buffer_lines: usize,
    /// How long to wait between writing and verifying. Clamped to
    /// [`MAX_SETTLE_DELAY`].
    pub settle_delay: Duration,
    /// If `true`, nothing is written. Instead a unified diff of the proposed
    /// change is returned in [`AppliedDiff`].
    pub dry_run: bool,
    /// If set, a timestamped copy of the previous content is written here
    /// before every commit.
    pub backup_dir: Option<PathBuf>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            fuzz_threshold: DEFAULT_FUZZ_THRESHOLD,
            buffer_lines: DEFAULT_BUFFER_LINES,
            settle_delay: DEFAULT_SETTLE_DELAY,
            dry_run: false,
            backup_dir: None,
        }
    }
}

impl ApplyOptions {
    /// Creates a new builder for `ApplyOptions`.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::ApplyOptions;
    /// # use std::time::Duration;
    /// let options = ApplyOptions::builder()
    ///     .dry_run(true)
    ///     .fuzz_threshold(0.8)
    ///     .settle_delay(Duration::from_millis(10))
    ///     .build();
    ///
    /// assert_eq!(options.dry_run, true);
    /// assert_eq!(options.fuzz_threshold, 0.8);
    /// assert_eq!(options.buffer_lines, 20);
    /// assert_eq!(options.backup_dir, None);
    /// ```
    pub fn builder() -> ApplyOptionsBuilder {
        ApplyOptionsBuilder::default()
    }
}

/// A builder for creating `ApplyOptions`.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptionsBuilder {
    fuzz_threshold: Option<f64>,
    buffer_lines: Option<usize>,
    settle_delay: Option<Duration>,
    dry_run: Option<bool>,
    backup_dir: Option<PathBuf>,
}

impl ApplyOptionsBuilder {
    /// Sets the minimum similarity (0.0 to 1.0) for a region to be accepted.
    pub fn fuzz_threshold(mut self, fuzz_threshold: f64) -> Self {
        self.fuzz_threshold = Some(fuzz_threshold);
        self
    }

    /// Sets how many lines around the hinted range the fallback scan covers.
    pub fn buffer_lines(mut self, buffer_lines: usize) -> Self {
        self.buffer_lines = Some(buffer_lines);
        self
    }

    /// Sets the wait between writing and verifying.
    pub fn settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = Some(settle_delay);
        self
    }

    /// If `true`, no files will be modified. Instead, a diff of the proposed
    /// change will be returned in [`AppliedDiff`].
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    /// Keeps a timestamped copy of the previous content in `dir`.
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Builds the `ApplyOptions`.
    pub fn build(self) -> ApplyOptions {
        let default = ApplyOptions::default();
        ApplyOptions {
            fuzz_threshold: self.fuzz_threshold.unwrap_or(default.fuzz_threshold),
            buffer_lines: self.buffer_lines.unwrap_or(default.buffer_lines),
            settle_delay: self
                .settle_delay
                .unwrap_or(default.settle_delay)
                .min(MAX_SETTLE_DELAY),
            dry_run: self.dry_run.unwrap_or(default.dry_run),
            backup_dir: self.backup_dir,
        }
    }
}
