//! The end-to-end apply operation: resolve, read, locate, reconcile, commit.

use crate::commit::{CommitSink, ContentProvider, PatchCommitter};
use crate::error::{ApplyError, DiffError};
use crate::indent::reconcile_indentation;
use crate::line_numbers::{add_line_numbers, split_lines, LineEnding};
use crate::locate::{LineRange, RegionLocator};
use crate::parse::parse_diff_block;
use crate::ApplyOptions;
use log::{debug, info, trace};
use similar::udiff::unified_diff;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag shared between a caller and an operation.
///
/// Cancellation is observed between stages of an apply and right before the
/// commit. A commit that has started always finishes.
///
/// # Example
///
/// ```
/// # use srpatch::CancellationToken;
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Checks whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &str) -> Result<(), ApplyError> {
        if self.is_cancelled() {
            info!("  Cancelled {}.", stage);
            return Err(ApplyError::Cancelled);
        }
        Ok(())
    }
}

/// The result of applying a diff block to content in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedContent {
    /// The full new content.
    pub content: String,
    /// 0-based index of the first original line that was replaced.
    pub start_index: usize,
    /// Number of original lines that were replaced (0 for an insertion).
    pub len: usize,
    /// Similarity of the replaced region to the SEARCH text.
    pub score: f64,
}

/// Applies a SEARCH/REPLACE block to `content` without touching any file.
///
/// The original is split into lines, the SEARCH region is located (using
/// `hint` when given), the REPLACE lines are re-indented to fit it, and the
/// result is joined back with the original's line ending. A trailing line
/// break in the original is kept.
///
/// # Errors
///
/// Any [`DiffError`]: a malformed block, an unusable range, an empty SEARCH
/// without a single-line anchor, or no region reaching the threshold.
///
/// # Example
///
/// ```
/// # use srpatch::{apply_diff_to_content, ApplyOptions, LineRange};
/// let original = "def f(x):\n    return x + 1\n";
/// let diff = "<<<<<<< SEARCH\n    return x + 1\n=======\n    return x * 2\n>>>>>>> REPLACE";
///
/// let patched = apply_diff_to_content(
///     original,
///     diff,
///     Some(LineRange::new(2, 2)),
///     &ApplyOptions::default(),
/// )
/// .unwrap();
///
/// assert_eq!(patched.content, "def f(x):\n    return x * 2\n");
/// assert_eq!(patched.start_index, 1);
/// assert_eq!(patched.score, 1.0);
/// ```
pub fn apply_diff_to_content(
    content: &str,
    diff_text: &str,
    hint: Option<LineRange>,
    options: &ApplyOptions,
) -> Result<PatchedContent, DiffError> {
    let block = parse_diff_block(diff_text)?;
    let ending = LineEnding::detect(content);
    let original_lines = split_lines(content);
    let search_lines = block.search_lines();
    let replace_lines = block.replace_lines();
    trace!(
        "  Original has {} lines ({}); block has {} SEARCH and {} REPLACE lines.",
        original_lines.len(),
        ending,
        search_lines.len(),
        replace_lines.len()
    );

    let locator = RegionLocator::new(options.fuzz_threshold, options.buffer_lines);
    let candidate = locator.locate(&original_lines, &search_lines, hint)?;
    let reconciled = reconcile_indentation(&candidate.lines, &search_lines, &replace_lines);

    let start = candidate.start_index;
    let end = start + candidate.len();
    let mut lines: Vec<&str> =
        Vec::with_capacity(original_lines.len() - candidate.len() + reconciled.len());
    lines.extend_from_slice(&original_lines[..start]);
    lines.extend(reconciled.iter().map(String::as_str));
    lines.extend_from_slice(&original_lines[end..]);

    Ok(PatchedContent {
        content: lines.join(ending.as_str()),
        start_index: start,
        len: candidate.len(),
        score: candidate.score,
    })
}

/// The outcome of a successful apply.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDiff {
    /// The file the diff was applied to.
    pub path: PathBuf,
    /// The verified content after the commit (or the proposed content in a dry run).
    pub new_content: String,
    /// Similarity of the replaced region to the SEARCH text.
    pub score: f64,
    /// 1-based line where the replaced region starts.
    pub start_line: usize,
    /// Number of original lines that were replaced.
    pub line_count: usize,
    /// Unified diff of the proposed change. Only set in a dry run.
    pub diff: Option<String>,
    /// Where the backup copy was written, if backups are enabled.
    pub backup_path: Option<PathBuf>,
}

impl AppliedDiff {
    /// Checks whether this result comes from a dry run.
    pub fn is_dry_run(&self) -> bool {
        self.diff.is_some()
    }

    /// The new content as a numbered listing starting at line 1.
    pub fn numbered_content(&self) -> String {
        add_line_numbers(&self.new_content, 1)
    }

    /// A one-line description of what was done.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::AppliedDiff;
    /// # use std::path::PathBuf;
    /// let applied = AppliedDiff {
    ///     path: PathBuf::from("src/lib.rs"),
    ///     new_content: String::new(),
    ///     score: 0.957,
    ///     start_line: 12,
    ///     line_count: 3,
    ///     diff: None,
    ///     backup_path: None,
    /// };
    /// assert_eq!(
    ///     applied.summary(),
    ///     "Changes applied to src/lib.rs at lines 12-14. Similarity: 95%"
    /// );
    /// ```
    pub fn summary(&self) -> String {
        let verb = if self.is_dry_run() {
            "Changes would be applied"
        } else {
            "Changes applied"
        };
        let location = if self.line_count == 0 {
            format!("before line {}", self.start_line)
        } else {
            format!(
                "at lines {}-{}",
                self.start_line,
                self.start_line + self.line_count - 1
            )
        };
        let mut summary = format!(
            "{} to {} {}. Similarity: {}%",
            verb,
            self.path.display(),
            location,
            (self.score * 100.0).floor() as u32
        );
        if let Some(backup) = &self.backup_path {
            summary.push_str(&format!(". Backup: {}", backup.display()));
        }
        summary
    }
}

/// Applies diff blocks to files of one workspace.
#[derive(Debug, Clone)]
pub struct DiffApplier<W> {
    workspace: W,
    options: ApplyOptions,
}

impl<W: ContentProvider + CommitSink> DiffApplier<W> {
    /// Creates an applier reading from and committing to `workspace`.
    pub fn new(workspace: W, options: ApplyOptions) -> Self {
        Self { workspace, options }
    }

    /// The options every apply uses.
    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// The workspace the applier reads from and commits to.
    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    /// Applies one SEARCH/REPLACE block to the file at `path`.
    ///
    /// The current content is read fresh on every call, preferring unsaved
    /// editor content. In a dry run nothing is written and the result carries
    /// a unified diff of the proposed change; otherwise the new content is
    /// committed with verification and rollback.
    ///
    /// # Errors
    ///
    /// - [`ApplyError::NotAFile`] if `path` is a directory.
    /// - [`ApplyError::Read`] if the current content cannot be read.
    /// - [`ApplyError::Cancelled`] if `cancel` fired before the commit.
    /// - [`ApplyError::Diff`] if locating or applying the block failed.
    /// - [`ApplyError::Commit`] if the commit failed.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::{ApplyOptions, CancellationToken, DiffApplier, DiskWorkspace};
    /// # use std::fs;
    /// # use std::time::Duration;
    /// # use tempfile::tempdir;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let dir = tempdir()?;
    /// let path = dir.path().join("greet.py");
    /// fs::write(&path, "def greet():\n    print('hi')\n")?;
    ///
    /// let options = ApplyOptions::builder().settle_delay(Duration::ZERO).build();
    /// let applier = DiffApplier::new(DiskWorkspace, options);
    /// let diff = "<<<<<<< SEARCH\nprint('hi')\n=======\nprint('hello')\n>>>>>>> REPLACE";
    ///
    /// let applied = applier.apply(&path, diff, None, &CancellationToken::new())?;
    /// assert_eq!(applied.start_line, 2);
    /// assert_eq!(fs::read_to_string(&path)?, "def greet():\n    print('hello')\n");
    /// # Ok(())
    /// # }
    /// ```
    pub fn apply(
        &self,
        path: &Path,
        diff_text: &str,
        hint: Option<LineRange>,
        cancel: &CancellationToken,
    ) -> Result<AppliedDiff, ApplyError> {
        info!("Applying diff to: {}", path.display());

        if path.is_dir() {
            return Err(ApplyError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        cancel.check("before reading")?;

        let original = self
            .workspace
            .current_content(path)
            .map_err(|source| ApplyError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if self.workspace.has_unsaved_changes(path) {
            debug!("  '{}' has unsaved changes; patching those.", path.display());
        }
        cancel.check("before matching")?;

        let patched = apply_diff_to_content(&original, diff_text, hint, &self.options)?;
        debug!(
            "  Replacing {} line(s) at line {} (similarity {:.3}).",
            patched.len,
            patched.start_index + 1,
            patched.score
        );
        cancel.check("before commit")?;

        if self.options.dry_run {
            info!("  DRY RUN: Would write changes to '{}'", path.display());
            let diff = unified_diff(
                similar::Algorithm::default(),
                &original,
                &patched.content,
                3,
                Some(("a", "b")),
            );
            return Ok(AppliedDiff {
                path: path.to_path_buf(),
                new_content: patched.content,
                score: patched.score,
                start_line: patched.start_index + 1,
                line_count: patched.len,
                diff: Some(diff.to_string()),
                backup_path: None,
            });
        }

        let mut committer = PatchCommitter::new(self.options.settle_delay);
        if let Some(dir) = &self.options.backup_dir {
            committer = committer.with_backup_dir(dir);
        }
        // The committer has verified the read-back against this exact content.
        let report = committer.commit(&self.workspace, path, &patched.content)?;

        Ok(AppliedDiff {
            path: path.to_path_buf(),
            new_content: patched.content,
            score: patched.score,
            start_line: patched.start_index + 1,
            line_count: patched.len,
            diff: None,
            backup_path: report.backup_path,
        })
    }
}

/// A request to apply one diff block, as a tool call would carry it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyDiffRequest {
    /// Path of the target file, relative to the session root. A leading `/`
    /// also means the root.
    pub path: String,
    /// The SEARCH/REPLACE block.
    pub diff: String,
    /// First line of the hinted range (1-based).
    pub start_line: Option<usize>,
    /// Last line of the hinted range (1-based, inclusive).
    pub end_line: Option<usize>,
}

/// Resolves `input` against `root`, refusing paths that escape it.
///
/// A leading `/` is taken as the root itself, so `"/src/a.rs"` and
/// `"src/a.rs"` name the same file. The parent directory must exist; symlinks
/// in it are resolved before the containment check.
///
/// # Errors
///
/// - [`ApplyError::PathTraversal`] if the path resolves outside `root`.
/// - [`ApplyError::Read`] if `root` or the parent directory cannot be resolved.
///
/// # Example
///
/// ```
/// # use srpatch::{resolve_in_root, ApplyError};
/// # use std::fs;
/// # use tempfile::tempdir;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempdir()?;
/// fs::create_dir(dir.path().join("src"))?;
///
/// let resolved = resolve_in_root(dir.path(), "/src/main.rs")?;
/// assert!(resolved.starts_with(fs::canonicalize(dir.path())?));
/// assert!(resolved.ends_with("src/main.rs"));
///
/// let escaped = resolve_in_root(dir.path(), "../secret.txt");
/// assert!(matches!(escaped, Err(ApplyError::PathTraversal(_))));
/// # Ok(())
/// # }
/// ```
pub fn resolve_in_root(root: &Path, input: &str) -> Result<PathBuf, ApplyError> {
    trace!(
        "  Resolving '{}' against root '{}'",
        input,
        root.display()
    );
    let relative = Path::new(input.trim_start_matches('/'));
    let canonical = |path: &Path| {
        fs::canonicalize(path).map_err(|source| ApplyError::Read {
            path: path.to_path_buf(),
            source,
        })
    };

    let base = canonical(root)?;
    let target = root.join(relative);
    let resolved = match (target.parent(), target.file_name()) {
        (Some(parent), Some(name)) => canonical(parent)?.join(name),
        _ => canonical(&target)?,
    };

    if !resolved.starts_with(&base) {
        return Err(ApplyError::PathTraversal(relative.to_path_buf()));
    }
    Ok(resolved)
}

/// A workspace root, the content source for it and the options to apply with.
///
/// # Example
///
/// ```
/// # use srpatch::{ApplyDiffRequest, ApplyOptions, CancellationToken, DiskWorkspace, Session};
/// # use std::fs;
/// # use std::time::Duration;
/// # use tempfile::tempdir;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempdir()?;
/// fs::write(dir.path().join("notes.md"), "# Title\n\nold line\n")?;
///
/// let options = ApplyOptions::builder().settle_delay(Duration::ZERO).build();
/// let session = Session::new(dir.path(), DiskWorkspace, options);
/// let request = ApplyDiffRequest {
///     path: "/notes.md".to_string(),
///     diff: "<<<<<<< SEARCH\nold line\n=======\nnew line\n>>>>>>> REPLACE".to_string(),
///     start_line: Some(3),
///     end_line: Some(3),
/// };
///
/// session.apply(&request, &CancellationToken::new())?;
/// assert_eq!(fs::read_to_string(dir.path().join("notes.md"))?, "# Title\n\nnew line\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Session<W> {
    root: PathBuf,
    applier: DiffApplier<W>,
}

impl<W: ContentProvider + CommitSink> Session<W> {
    /// Creates a session rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, workspace: W, options: ApplyOptions) -> Self {
        Self {
            root: root.into(),
            applier: DiffApplier::new(workspace, options),
        }
    }

    /// The directory every request path is resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The applier requests are dispatched to.
    pub fn applier(&self) -> &DiffApplier<W> {
        &self.applier
    }

    /// Validates `request` and applies it.
    ///
    /// The line bounds must be given together or not at all, and the path
    /// must stay inside the root.
    pub fn apply(
        &self,
        request: &ApplyDiffRequest,
        cancel: &CancellationToken,
    ) -> Result<AppliedDiff, ApplyError> {
        let hint = LineRange::from_bounds(request.start_line, request.end_line)?;
        let path = resolve_in_root(&self.root, &request.path)?;
        self.applier.apply(&path, &request.diff, hint, cancel)
    }
}
