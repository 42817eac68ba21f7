use srpatch::{
    ApplyOptions, CancellationToken, CommitError, CommitFailureCause, CommitSink, ContentProvider,
    DiffApplier, DiskWorkspace, EditorBuffers, PatchCommitter, MAX_SETTLE_DELAY,
};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::tempdir;

/// How a [`ScriptedSink`] misbehaves.
#[derive(Debug, Clone, Copy)]
enum Fault {
    /// The first write fails; later writes succeed.
    FirstWriteFails,
    /// The first write stores different content than it was given.
    FirstWriteCorrupts,
    /// The first write corrupts the content and every later write fails.
    CorruptsThenStopsWriting,
    /// Reading back fails after the first write.
    UnreadableAfterWrite,
}

/// An in-memory sink that fails in a scripted way.
#[derive(Debug)]
struct ScriptedSink {
    content: Mutex<String>,
    writes: AtomicUsize,
    fault: Fault,
}

impl ScriptedSink {
    fn new(content: &str, fault: Fault) -> Self {
        Self {
            content: Mutex::new(content.to_string()),
            writes: AtomicUsize::new(0),
            fault,
        }
    }

    fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }
}

impl CommitSink for ScriptedSink {
    fn write(&self, _path: &Path, content: &str) -> io::Result<()> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        let stored = match (self.fault, attempt) {
            (Fault::FirstWriteFails, 0) => {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
            }
            (Fault::FirstWriteCorrupts, 0) | (Fault::CorruptsThenStopsWriting, 0) => {
                format!("{}garbage", content)
            }
            (Fault::CorruptsThenStopsWriting, _) => {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            _ => content.to_string(),
        };
        *self.content.lock().unwrap() = stored;
        Ok(())
    }

    fn read_back(&self, _path: &Path) -> io::Result<String> {
        let written = self.writes.load(Ordering::SeqCst) > 0;
        if matches!(self.fault, Fault::UnreadableAfterWrite) && written {
            return Err(io::Error::new(io::ErrorKind::Other, "device gone"));
        }
        Ok(self.content())
    }
}

fn committer() -> PatchCommitter {
    PatchCommitter::new(Duration::ZERO)
}

#[test]
fn test_commit_to_disk() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    fs::write(&path, "old\n").unwrap();

    let report = committer().commit(&DiskWorkspace, &path, "new\n").unwrap();

    assert_eq!(report.previous_content, "old\n");
    assert_eq!(report.backup_path, None);
    assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
}

#[test]
fn test_settle_delay_is_clamped() {
    assert_eq!(
        PatchCommitter::new(Duration::from_secs(10)).settle_delay(),
        MAX_SETTLE_DELAY
    );
    assert_eq!(
        PatchCommitter::new(Duration::from_millis(5)).settle_delay(),
        Duration::from_millis(5)
    );
    assert_eq!(
        PatchCommitter::default().settle_delay(),
        Duration::from_millis(100)
    );
}

#[test]
fn test_missing_file_fails_snapshot_without_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.txt");

    let err = committer()
        .commit(&DiskWorkspace, &path, "new\n")
        .unwrap_err();

    assert!(matches!(err, CommitError::Snapshot { .. }));
    assert!(!path.exists());
}

#[test]
fn test_failed_write_is_rolled_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = ScriptedSink::new("old", Fault::FirstWriteFails);

    let err = committer()
        .commit(&sink, Path::new("a.txt"), "new")
        .unwrap_err();

    assert!(matches!(
        err,
        CommitError::RolledBack {
            cause: CommitFailureCause::Write(_),
            ..
        }
    ));
    assert_eq!(sink.content(), "old");
}

#[test]
fn test_verification_mismatch_is_rolled_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = ScriptedSink::new("old", Fault::FirstWriteCorrupts);

    let err = committer()
        .commit(&sink, Path::new("a.txt"), "new")
        .unwrap_err();

    assert!(matches!(
        err,
        CommitError::RolledBack {
            cause: CommitFailureCause::Mismatch,
            ..
        }
    ));
    assert_eq!(sink.content(), "old");
    assert!(err.to_string().contains("previous content restored"));
}

#[test]
fn test_unreadable_result_is_rolled_back() {
    let sink = ScriptedSink::new("old", Fault::UnreadableAfterWrite);

    let err = committer()
        .commit(&sink, Path::new("a.txt"), "new")
        .unwrap_err();

    assert!(matches!(
        err,
        CommitError::RolledBack {
            cause: CommitFailureCause::ReadBack(_),
            ..
        }
    ));
    assert_eq!(sink.content(), "old");
}

#[test]
fn test_failed_rollback_reports_both_errors() {
    let _ = env_logger::builder().is_test(true).try_init();
    let sink = ScriptedSink::new("old", Fault::CorruptsThenStopsWriting);

    let err = committer()
        .commit(&sink, Path::new("a.txt"), "new")
        .unwrap_err();

    match &err {
        CommitError::RollbackFailed {
            cause: CommitFailureCause::Mismatch,
            rollback,
            ..
        } => assert_eq!(rollback.to_string(), "disk full"),
        other => panic!("expected RollbackFailed, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("content verification failed"));
    assert!(message.contains("rollback also failed: disk full"));
    assert_eq!(sink.content(), "newgarbage");
}

#[test]
fn test_backup_copy_is_written_before_commit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, "v1\n").unwrap();
    let backups = dir.path().join("nested").join("backups");

    let report = committer()
        .with_backup_dir(&backups)
        .commit(&DiskWorkspace, &path, "v2\n")
        .unwrap();

    let backup_path = report.backup_path.unwrap();
    assert_eq!(backup_path.parent(), Some(backups.as_path()));
    assert_eq!(fs::read_to_string(&backup_path).unwrap(), "v1\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), "v2\n");
}

#[test]
fn test_commit_goes_to_open_buffer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    fs::write(&path, "on disk\n").unwrap();

    let buffers = EditorBuffers::new();
    buffers.open(path.clone(), "unsaved\n");
    assert!(buffers.has_unsaved_changes(&path));
    assert_eq!(buffers.disk_content(&path).unwrap(), "on disk\n");

    let report = committer().commit(&buffers, &path, "patched\n").unwrap();

    assert_eq!(report.previous_content, "unsaved\n");
    assert_eq!(buffers.current_content(&path).unwrap(), "patched\n");
    assert_eq!(fs::read_to_string(&path).unwrap(), "on disk\n");

    assert_eq!(buffers.close(&path).as_deref(), Some("patched\n"));
    assert!(!buffers.has_unsaved_changes(&path));
    assert_eq!(buffers.current_content(&path).unwrap(), "on disk\n");
}

#[test]
fn test_commit_without_buffer_goes_to_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    fs::write(&path, "on disk\n").unwrap();

    let buffers = EditorBuffers::new();
    committer().commit(&buffers, &path, "patched\n").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "patched\n");
    assert!(!buffers.save(&path).unwrap());
}

/// An in-memory workspace whose reads start failing after a fixed number.
#[derive(Debug)]
struct FlakyReads {
    content: Mutex<String>,
    reads: AtomicUsize,
    healthy_reads: usize,
}

impl FlakyReads {
    fn new(content: &str, healthy_reads: usize) -> Self {
        Self {
            content: Mutex::new(content.to_string()),
            reads: AtomicUsize::new(0),
            healthy_reads,
        }
    }

    fn read(&self) -> io::Result<String> {
        if self.reads.fetch_add(1, Ordering::SeqCst) >= self.healthy_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "device gone"));
        }
        Ok(self.content.lock().unwrap().clone())
    }
}

impl ContentProvider for FlakyReads {
    fn current_content(&self, _path: &Path) -> io::Result<String> {
        self.read()
    }

    fn disk_content(&self, _path: &Path) -> io::Result<String> {
        self.read()
    }
}

impl CommitSink for FlakyReads {
    fn write(&self, _path: &Path, content: &str) -> io::Result<()> {
        *self.content.lock().unwrap() = content.to_string();
        Ok(())
    }

    fn read_back(&self, _path: &Path) -> io::Result<String> {
        self.read()
    }
}

#[test]
fn test_verified_apply_does_not_read_again() {
    let _ = env_logger::builder().is_test(true).try_init();
    // Current content, snapshot and verification; a fourth read would fail.
    let workspace = FlakyReads::new("old\n", 3);
    let options = ApplyOptions::builder().settle_delay(Duration::ZERO).build();
    let applier = DiffApplier::new(&workspace, options);
    let diff = "<<<<<<< SEARCH\nold\n=======\nnew\n>>>>>>> REPLACE";

    let applied = applier
        .apply(Path::new("mem.txt"), diff, None, &CancellationToken::new())
        .unwrap();

    assert_eq!(applied.new_content, "new\n");
    assert_eq!(workspace.reads.load(Ordering::SeqCst), 3);
    assert_eq!(*workspace.content.lock().unwrap(), "new\n");
}
