//! Reading the authoritative content of a file and committing new content to it.
//!
//! "Authoritative" means the open editor buffer when one exists, since it
//! holds edits that are not on disk yet, and the disk otherwise. The
//! [`ContentProvider`] and [`CommitSink`] traits are the seams to whatever
//! environment hosts the files; [`DiskWorkspace`] and [`EditorBuffers`] are
//! the two implementations shipped here.

use crate::error::{CommitError, CommitFailureCause};
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long to wait after a write before verifying it.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Upper bound for the settle delay.
pub const MAX_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Source of file content for the start of an apply operation.
pub trait ContentProvider {
    /// The current content of `path`, preferring unsaved edits over disk.
    fn current_content(&self, path: &Path) -> io::Result<String>;

    /// The content of `path` as persisted on disk.
    fn disk_content(&self, path: &Path) -> io::Result<String>;

    /// Checks whether `path` has edits that are not on disk yet.
    fn has_unsaved_changes(&self, _path: &Path) -> bool {
        false
    }
}

/// Destination of a commit.
///
/// `read_back` must observe what `write` stored through the same access
/// path, so that a successful commit is visible to later reads.
pub trait CommitSink {
    /// Replaces the whole content of `path`.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Reads the content of `path` as this sink currently sees it.
    fn read_back(&self, path: &Path) -> io::Result<String>;
}

impl<T: ContentProvider + ?Sized> ContentProvider for &T {
    fn current_content(&self, path: &Path) -> io::Result<String> {
        (**self).current_content(path)
    }

    fn disk_content(&self, path: &Path) -> io::Result<String> {
        (**self).disk_content(path)
    }

    fn has_unsaved_changes(&self, path: &Path) -> bool {
        (**self).has_unsaved_changes(path)
    }
}

impl<T: CommitSink + ?Sized> CommitSink for &T {
    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        (**self).write(path, content)
    }

    fn read_back(&self, path: &Path) -> io::Result<String> {
        (**self).read_back(path)
    }
}

/// Plain filesystem access; the disk is always authoritative.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskWorkspace;

impl ContentProvider for DiskWorkspace {
    fn current_content(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn disk_content(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

impl CommitSink for DiskWorkspace {
    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        fs::write(path, content)
    }

    fn read_back(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// Open editor buffers layered over the disk.
///
/// A path with an open buffer is read from and written to that buffer; the
/// disk copy only changes on [`EditorBuffers::save`]. Paths without a buffer
/// fall through to [`DiskWorkspace`].
///
/// # Example
///
/// ```
/// # use srpatch::{ContentProvider, EditorBuffers};
/// # use std::path::Path;
/// let buffers = EditorBuffers::new();
/// buffers.open("notes.txt", "unsaved text\n");
///
/// let current = buffers.current_content(Path::new("notes.txt")).unwrap();
/// assert_eq!(current, "unsaved text\n");
/// assert!(buffers.has_unsaved_changes(Path::new("notes.txt")));
/// ```
#[derive(Debug, Default)]
pub struct EditorBuffers {
    buffers: Mutex<HashMap<PathBuf, String>>,
    disk: DiskWorkspace,
}

impl EditorBuffers {
    /// Creates an empty set of buffers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens (or replaces) a buffer for `path` holding unsaved `content`.
    pub fn open(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.lock().insert(path.into(), content.into());
    }

    /// Returns a copy of the buffer for `path`, if one is open.
    pub fn buffer(&self, path: &Path) -> Option<String> {
        self.lock().get(path).cloned()
    }

    /// Discards the buffer for `path` without saving, returning its content.
    pub fn close(&self, path: &Path) -> Option<String> {
        self.lock().remove(path)
    }

    /// Writes the buffer for `path` to disk and closes it.
    ///
    /// Returns `Ok(false)` if no buffer was open. On a write error the buffer
    /// stays open.
    pub fn save(&self, path: &Path) -> io::Result<bool> {
        let mut buffers = self.lock();
        match buffers.get(path) {
            Some(content) => {
                self.disk.write(path, content)?;
                buffers.remove(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ContentProvider for EditorBuffers {
    fn current_content(&self, path: &Path) -> io::Result<String> {
        match self.buffer(path) {
            Some(content) => {
                trace!("  Using unsaved editor buffer for '{}'.", path.display());
                Ok(content)
            }
            None => self.disk.current_content(path),
        }
    }

    fn disk_content(&self, path: &Path) -> io::Result<String> {
        self.disk.disk_content(path)
    }

    fn has_unsaved_changes(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }
}

impl CommitSink for EditorBuffers {
    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(buffer) = self.lock().get_mut(path) {
            content.clone_into(buffer);
            return Ok(());
        }
        self.disk.write(path, content)
    }

    fn read_back(&self, path: &Path) -> io::Result<String> {
        self.current_content(path)
    }
}

/// The outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// The content the file had before the commit.
    pub previous_content: String,
    /// Where the on-disk backup copy was written, if backups are enabled.
    pub backup_path: Option<PathBuf>,
}

/// Writes new content with a snapshot, verify and rollback cycle.
///
/// Once [`commit`](Self::commit) starts it always runs to completion: either
/// the new content is verified in place, or the previous content has been
/// restored, or both the failure and the failed restore are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCommitter {
    settle_delay: Duration,
    backup_dir: Option<PathBuf>,
}

impl Default for PatchCommitter {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl PatchCommitter {
    /// Creates a committer that waits `settle_delay` (at most
    /// [`MAX_SETTLE_DELAY`]) between writing and verifying.
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay: settle_delay.min(MAX_SETTLE_DELAY),
            backup_dir: None,
        }
    }

    /// Also keeps a timestamped copy of the previous content in `dir`.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// The effective settle delay.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Commits `new_content` to `path` through `sink`.
    ///
    /// # Errors
    ///
    /// - [`CommitError::Snapshot`] or [`CommitError::Backup`] if the
    ///   preparation failed; nothing was written.
    /// - [`CommitError::RolledBack`] if the write or its verification failed
    ///   and the previous content was restored.
    /// - [`CommitError::RollbackFailed`] if restoring failed as well.
    ///
    /// # Example
    ///
    /// ```
    /// # use srpatch::{PatchCommitter, DiskWorkspace};
    /// # use std::fs;
    /// # use std::time::Duration;
    /// # use tempfile::tempdir;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let dir = tempdir()?;
    /// let path = dir.path().join("a.txt");
    /// fs::write(&path, "old\n")?;
    ///
    /// let committer = PatchCommitter::new(Duration::ZERO);
    /// let report = committer.commit(&DiskWorkspace, &path, "new\n")?;
    ///
    /// assert_eq!(report.previous_content, "old\n");
    /// assert_eq!(fs::read_to_string(&path)?, "new\n");
    /// # Ok(())
    /// # }
    /// ```
    pub fn commit<S: CommitSink + ?Sized>(
        &self,
        sink: &S,
        path: &Path,
        new_content: &str,
    ) -> Result<CommitReport, CommitError> {
        let backup = sink.read_back(path).map_err(|source| CommitError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        trace!(
            "  Snapshot of '{}' taken ({} bytes).",
            path.display(),
            backup.len()
        );

        let backup_path = match &self.backup_dir {
            Some(dir) => Some(write_backup_copy(dir, path, &backup)?),
            None => None,
        };

        if let Err(e) = sink.write(path, new_content) {
            warn!("  Write to '{}' failed: {}", path.display(), e);
            return Err(rollback(sink, path, &backup, CommitFailureCause::Write(e)));
        }

        if !self.settle_delay.is_zero() {
            trace!("  Waiting {:?} before verifying.", self.settle_delay);
            thread::sleep(self.settle_delay);
        }

        match sink.read_back(path) {
            Ok(current) if current == new_content => {
                info!("  Successfully wrote changes to '{}'", path.display());
                Ok(CommitReport {
                    previous_content: backup,
                    backup_path,
                })
            }
            Ok(_) => {
                warn!("  Content mismatch after writing '{}'.", path.display());
                Err(rollback(sink, path, &backup, CommitFailureCause::Mismatch))
            }
            Err(e) => {
                warn!("  Could not read back '{}': {}", path.display(), e);
                Err(rollback(sink, path, &backup, CommitFailureCause::ReadBack(e)))
            }
        }
    }
}

/// Restores `backup` and turns the outcome into the matching error.
fn rollback<S: CommitSink + ?Sized>(
    sink: &S,
    path: &Path,
    backup: &str,
    cause: CommitFailureCause,
) -> CommitError {
    match sink.write(path, backup) {
        Ok(()) => {
            info!("  Restored previous content of '{}'.", path.display());
            CommitError::RolledBack {
                path: path.to_path_buf(),
                cause,
            }
        }
        Err(rollback) => {
            error!(
                "  Rollback of '{}' failed: {}. The file may be left modified.",
                path.display(),
                rollback
            );
            CommitError::RollbackFailed {
                path: path.to_path_buf(),
                cause,
                rollback,
            }
        }
    }
}

/// Writes `<dir>/<file name>.<unix millis>.bak` and returns its path.
fn write_backup_copy(dir: &Path, path: &Path, content: &str) -> Result<PathBuf, CommitError> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let backup_path = dir.join(format!("{}.{}.bak", file_name, millis));

    fs::create_dir_all(dir)
        .and_then(|()| fs::write(&backup_path, content))
        .map_err(|source| CommitError::Backup {
            path: backup_path.clone(),
            source,
        })?;
    debug!("  Backup written to '{}'.", backup_path.display());
    Ok(backup_path)
}
