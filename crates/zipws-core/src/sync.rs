//! Sync orchestration: pack the workspace back over the source archive.
//!
//! The critical section is serialized by the session's exclusive lock and
//! bracketed by the `syncing` state so an interruption is detectable. The
//! replace itself is a same-filesystem rename of a temp file created next
//! to the source, which is what makes the final step atomic. Every error
//! path restores the session state to `open`, removes the temp file, and
//! releases the lock.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive;
use crate::config::Config;
use crate::error::Error;
use crate::lock::{LockFile, DEFAULT_TIMEOUT};
use crate::paths::Layout;
use crate::session::{self, Session, SessionState};
use crate::tool::{status_unlocked, StatusReport};

/// Marker embedded in sync temp-file names, used both to create them and
/// to sweep orphans during load-time repair.
const TEMP_MARKER: &str = "zipws-tmp-";

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Path of the first-generation backup holding the pre-sync source.
    pub backup_path: PathBuf,
    /// Size of the freshly written archive.
    pub new_zip_size_bytes: u64,
    /// Files changed since open, from the pre-pack status pass.
    pub files_modified: usize,
    /// Files added since open.
    pub files_added: usize,
    /// Files deleted since open.
    pub files_deleted: usize,
    /// Set when the status pass failed; the sync itself still completed.
    pub status_note: Option<String>,
}

/// The hidden-prefix pattern for temp files belonging to `source`.
pub(crate) fn orphan_temp_prefix(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{base}.{TEMP_MARKER}")
}

/// Packs the workspace contents into a new archive and atomically replaces
/// the source, rotating the backup chain.
///
/// With `force` unset, an externally modified source (hash mismatch) fails
/// with a conflict and no other side effect; with `force` set, the
/// conflicting source is preserved as the first-generation backup.
///
/// # Errors
///
/// Returns [`Error::Locked`], [`Error::ConflictDetected`],
/// [`Error::ZipNotFound`] when the source vanished, [`Error::SyncFailed`]
/// when packing fails, or an I/O error with context. The session state is
/// restored to `open` on every error path.
pub fn sync(
    session: &mut Session,
    force: bool,
    layout: &Layout,
    config: &Config,
) -> Result<SyncReport, Error> {
    let dir_name = session.dir_name();
    let lock = LockFile::acquire_exclusive(&layout.lock_path(&dir_name), DEFAULT_TIMEOUT)?;

    require_open(session)?;

    session.state = SessionState::Syncing;
    session::update(layout, session)?;

    match run_sync(session, force, layout, config) {
        Ok(report) => {
            lock.release()?;
            info!(
                session = %session.id,
                backup = %report.backup_path.display(),
                bytes = report.new_zip_size_bytes,
                "sync complete"
            );
            Ok(report)
        }
        Err(err) => {
            session.state = SessionState::Open;
            if let Err(restore_err) = session::update(layout, session) {
                warn!(
                    session = %session.id,
                    error = %restore_err,
                    "failed to restore session state after sync error"
                );
            }
            Err(err)
        }
    }
}

/// The dry-run path: exclusive lock and state gate, then a status
/// computation only. Neither the archive nor the backup chain is touched.
///
/// # Errors
///
/// Returns [`Error::Locked`] or the status pass's error.
pub fn sync_dry_run(session: &Session, layout: &Layout) -> Result<StatusReport, Error> {
    let dir_name = session.dir_name();
    let _lock = LockFile::acquire_exclusive(&layout.lock_path(&dir_name), DEFAULT_TIMEOUT)?;
    require_open(session)?;
    status_unlocked(layout, session)
}

fn require_open(session: &Session) -> Result<(), Error> {
    if session.state != SessionState::Open {
        return Err(Error::io(
            "starting sync",
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "session state is \"syncing\", expected \"open\"",
            ),
        ));
    }
    Ok(())
}

fn run_sync(
    session: &mut Session,
    force: bool,
    layout: &Layout,
    config: &Config,
) -> Result<SyncReport, Error> {
    let source = session.source_path.clone();
    if std::fs::metadata(&source).is_err() {
        return Err(Error::ZipNotFound { path: source });
    }
    let source_dir = source.parent().ok_or_else(|| {
        Error::io(
            "resolving source directory",
            std::io::Error::other("source path has no parent directory"),
        )
    })?;
    probe_writable(source_dir)?;

    let current_hash = archive::hash_file(&source)?;
    if current_hash != session.zip_hash_sha256 && !force {
        return Err(Error::ConflictDetected { path: source });
    }

    // Change counts are advisory; a failed status pass downgrades to a
    // note rather than aborting the sync.
    let (counts, status_note) = match status_unlocked(layout, session) {
        Ok(report) => (
            (
                report.modified.len(),
                report.added.len(),
                report.deleted.len(),
            ),
            None,
        ),
        Err(err) => ((0, 0, 0), Some(format!("change tracking unavailable: {err}"))),
    };

    // The temp file lives next to the source so the final rename cannot
    // cross a filesystem boundary.
    let temp_path = tempfile::Builder::new()
        .prefix(&orphan_temp_prefix(&source))
        .tempfile_in(source_dir)
        .map_err(|err| Error::io("creating sync temp file", err))?
        .into_temp_path();

    let contents = layout.contents_dir(&session.dir_name());
    archive::pack(&contents, &temp_path).map_err(Error::sync_failed)?;

    let new_zip_size_bytes = std::fs::metadata(&temp_path)
        .map_err(|err| Error::io("reading temp archive size", err))?
        .len();

    let backup_path = rotate_backups(&source, config.defaults.backup_rotation_depth)?;

    std::fs::rename(&temp_path, &source)
        .map_err(|err| Error::io("renaming temp archive over source", err))?;
    // The file now lives at the source path; disarm the temp cleanup.
    let _ = temp_path.keep();

    session.zip_hash_sha256 = archive::hash_file(&source)?;
    session.last_synced_at = Some(Utc::now());
    session.state = SessionState::Open;
    session::update(layout, session)?;

    Ok(SyncReport {
        backup_path,
        new_zip_size_bytes,
        files_modified: counts.0,
        files_added: counts.1,
        files_deleted: counts.2,
        status_note,
    })
}

/// Shifts the backup chain by one generation and moves the current source
/// to the first-generation backup name, returning that path.
///
/// Given stem `S` and extension `.E`: the first generation is `S.bak.E`,
/// rotations are `S.bak.2.E` through `S.bak.<depth>.E`. A pre-existing
/// destination of any rename is discarded, which caps the chain.
///
/// # Errors
///
/// Returns an I/O error with context when a rename fails.
pub fn rotate_backups(source: &Path, depth: u32) -> Result<PathBuf, Error> {
    let (base, ext) = split_extension(source);

    for index in (2..=depth).rev() {
        let older = backup_name(&base, Some(index - 1), &ext);
        let newer = backup_name(&base, Some(index), &ext);
        if older.exists() {
            let _ = std::fs::remove_file(&newer);
            std::fs::rename(&older, &newer).map_err(|err| {
                Error::io(format!("rotating backup to {}", newer.display()), err)
            })?;
        }
    }

    let first = backup_name(&base, None, &ext);
    if depth >= 2 && first.exists() {
        let second = backup_name(&base, Some(2), &ext);
        let _ = std::fs::remove_file(&second);
        std::fs::rename(&first, &second).map_err(|err| {
            Error::io(format!("rotating backup to {}", second.display()), err)
        })?;
    }

    std::fs::rename(source, &first)
        .map_err(|err| Error::io(format!("creating backup {}", first.display()), err))?;
    Ok(first)
}

fn backup_name(base: &str, generation: Option<u32>, ext: &str) -> PathBuf {
    match generation {
        None => PathBuf::from(format!("{base}.bak{ext}")),
        Some(generation) => PathBuf::from(format!("{base}.bak.{generation}{ext}")),
    }
}

/// Splits a path into its stem-with-directory and dotted extension, the
/// extension being empty when the name has none.
fn split_extension(path: &Path) -> (String, String) {
    let as_str = path.to_string_lossy().into_owned();
    match path.extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy());
            let base = as_str[..as_str.len() - ext.len()].to_string();
            (base, ext)
        }
        None => (as_str, String::new()),
    }
}

fn probe_writable(dir: &Path) -> Result<(), Error> {
    // A sentinel file proves the parent accepts new names; it is removed
    // when the handle drops.
    tempfile::Builder::new()
        .prefix(".zipws-write-test-")
        .tempfile_in(dir)
        .map(|_| ())
        .map_err(|err| Error::io(format!("source directory {} not writable", dir.display()), err))
}
