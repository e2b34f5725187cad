//! On-disk session store: create, load, list, resolve, update, delete.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Session, SessionState};
use crate::archive;
use crate::config::Config;
use crate::error::Error;
use crate::paths::Layout;
use crate::security::{scan_for_bomb, validate_session_name};
use crate::sync::orphan_temp_prefix;
use crate::workspace;

/// Minimum identifier length for prefix matching.
const MIN_ID_PREFIX_LEN: usize = 4;

/// Opens a new session: validates inputs, pre-scans the archive, creates
/// the workspace, copies the source to `original.zip`, extracts the
/// contents, and persists the metadata record.
///
/// # Errors
///
/// Returns the typed cause on any failure; a partially built workspace is
/// removed before returning.
pub fn create(
    source: impl AsRef<Path>,
    name: Option<&str>,
    layout: &Layout,
    config: &Config,
) -> Result<Session, Error> {
    let source = source.as_ref();
    if std::fs::metadata(source).is_err() {
        return Err(Error::ZipNotFound {
            path: source.to_path_buf(),
        });
    }
    let source = absolutize(source)?;

    let name = name.unwrap_or_default();
    if !name.is_empty() {
        validate_session_name(name)?;
        // Names and identifier forms share the directory namespace; a name
        // that parses as an identifier would poison resolution.
        if Uuid::parse_str(name).is_ok() {
            return Err(Error::InvalidSessionName {
                name: name.to_string(),
                reason: "must not have the textual form of a session identifier".to_string(),
            });
        }
        if layout.metadata_path(name).exists() {
            return Err(Error::NameCollision {
                name: name.to_string(),
            });
        }
    }

    let existing = list(layout)?;
    if existing.len() >= config.security.max_sessions {
        return Err(Error::LimitExceeded {
            what: format!("max sessions ({})", config.security.max_sessions),
        });
    }

    let scan = scan_for_bomb(&source, &config.security_limits())?.into_result()?;

    let disk_in_use: u64 = existing.iter().map(|s| s.extracted_size_bytes).sum();
    if disk_in_use.saturating_add(scan.total_uncompressed_bytes)
        > config.security.max_total_disk_bytes
    {
        return Err(Error::LimitExceeded {
            what: format!(
                "max total disk bytes ({}) across sessions",
                config.security.max_total_disk_bytes
            ),
        });
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut session = Session {
        id,
        name: name.to_string(),
        source_path: source.clone(),
        created_at: now,
        last_accessed_at: now,
        last_synced_at: None,
        state: SessionState::Open,
        zip_hash_sha256: String::new(),
        extracted_size_bytes: 0,
        file_count: 0,
        recovery_note: None,
    };
    let dir_name = session.dir_name();

    workspace::create(layout, &dir_name)?;
    match populate_workspace(&mut session, &dir_name, layout, config) {
        Ok(()) => {
            info!(
                session = %session.id,
                name = %session.name,
                files = session.file_count,
                bytes = session.extracted_size_bytes,
                "session created"
            );
            Ok(session)
        }
        Err(err) => {
            // Leave nothing behind on failure; the error explains itself.
            let _ = workspace::remove(layout, &dir_name);
            Err(err)
        }
    }
}

fn populate_workspace(
    session: &mut Session,
    dir_name: &str,
    layout: &Layout,
    config: &Config,
) -> Result<(), Error> {
    let original = layout.original_zip(dir_name);
    std::fs::copy(&session.source_path, &original).map_err(|err| {
        Error::io(
            format!("copying source to {}", original.display()),
            err,
        )
    })?;

    session.zip_hash_sha256 = archive::hash_file(&session.source_path)?;

    let extracted = archive::extract(
        &session.source_path,
        &layout.contents_dir(dir_name),
        &config.security_limits(),
        config.security.allow_symlinks,
    )?;
    session.file_count = extracted.file_count;
    session.extracted_size_bytes = extracted.total_bytes;

    update(layout, session)
}

/// Loads the session stored in the named workspace directory.
///
/// A malformed metadata file is a wrapped error, not a silent skip. A
/// session found in `syncing` state is repaired: orphan temp files in the
/// source directory are removed, the state is reset to `open`, and a
/// diagnostic note is attached to the returned record.
///
/// # Errors
///
/// Returns [`Error::SessionNotFound`] when the metadata file is absent,
/// [`Error::Metadata`] when it cannot be parsed, or an I/O error.
pub fn load(layout: &Layout, dir_name: &str) -> Result<Session, Error> {
    let path = layout.metadata_path(dir_name);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::SessionNotFound {
                identifier: dir_name.to_string(),
            })
        }
        Err(err) => return Err(Error::io(format!("reading {}", path.display()), err)),
    };
    let mut session: Session =
        serde_json::from_slice(&bytes).map_err(|source| Error::Metadata { path, source })?;

    if session.state == SessionState::Syncing {
        repair_interrupted_sync(layout, &mut session)?;
    }
    Ok(session)
}

/// Enumerates all sessions under the workspaces root, skipping entries
/// without a valid metadata file.
///
/// # Errors
///
/// Returns an I/O error when the workspaces root exists but cannot be
/// read.
pub fn list(layout: &Layout) -> Result<Vec<Session>, Error> {
    let root = layout.workspaces_root();
    let entries = match std::fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io(format!("reading {}", root.display()), err)),
    };

    let mut sessions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(format!("reading {}", root.display()), err))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        match load(layout, &dir_name) {
            Ok(session) => sessions.push(session),
            Err(err) => {
                warn!(workspace = %dir_name, error = %err, "skipping unreadable session");
            }
        }
    }
    Ok(sessions)
}

/// Looks up a session by directory name, full identifier, or identifier
/// prefix of at least four characters.
///
/// # Errors
///
/// Returns [`Error::SessionNotFound`] when nothing matches and
/// [`Error::AmbiguousSession`] when a prefix matches several sessions.
pub fn get(layout: &Layout, identifier: &str) -> Result<Session, Error> {
    if identifier.is_empty() {
        return Err(Error::SessionNotFound {
            identifier: String::new(),
        });
    }

    // Exact directory-name match wins outright. Identifiers carrying path
    // separators or dot components never name a workspace directory and
    // must not be joined into one.
    let plain = !identifier.contains(['/', '\\']) && identifier != "." && identifier != "..";
    if plain {
        if let Ok(session) = load(layout, identifier) {
            return Ok(session);
        }
    }

    let mut prefix_matches = Vec::new();
    for session in list(layout)? {
        let id = session.id.to_string();
        if id == identifier {
            return Ok(session);
        }
        if identifier.len() >= MIN_ID_PREFIX_LEN && id.starts_with(identifier) {
            prefix_matches.push(session);
        }
    }

    match prefix_matches.len() {
        1 => Ok(prefix_matches.remove(0)),
        0 => Err(Error::SessionNotFound {
            identifier: identifier.to_string(),
        }),
        count => Err(Error::AmbiguousSession { count }),
    }
}

/// Resolves an identifier to a session, auto-selecting when exactly one
/// session exists and the identifier is empty.
///
/// # Errors
///
/// Empty identifier: [`Error::NoSessions`] with zero sessions,
/// [`Error::AmbiguousSession`] with two or more. Non-empty: as [`get`].
pub fn resolve(layout: &Layout, identifier: &str) -> Result<Session, Error> {
    if !identifier.is_empty() {
        return get(layout, identifier);
    }

    let mut sessions = list(layout)?;
    match sessions.len() {
        0 => Err(Error::NoSessions),
        1 => Ok(sessions.remove(0)),
        count => Err(Error::AmbiguousSession { count }),
    }
}

/// Re-serializes the session record to its metadata file.
///
/// # Errors
///
/// Returns an I/O error when the file cannot be written.
pub fn update(layout: &Layout, session: &Session) -> Result<(), Error> {
    let path = layout.metadata_path(&session.dir_name());
    let json = serde_json::to_vec_pretty(session).map_err(|source| Error::Metadata {
        path: path.clone(),
        source,
    })?;
    write_owner_only(&path, &json)
}

/// Sets the last-accessed timestamp to now and persists the record.
///
/// # Errors
///
/// Returns an I/O error when the metadata cannot be written.
pub fn touch(layout: &Layout, session: &mut Session) -> Result<(), Error> {
    session.last_accessed_at = Utc::now();
    update(layout, session)
}

/// Deletes the session matching the identifier, removing its workspace.
/// Holds the session's exclusive lock for the removal, so in-flight reads
/// and syncs are excluded.
///
/// # Errors
///
/// Propagates resolution failures, [`Error::Locked`] on lock timeout, and
/// removal I/O errors.
pub fn delete(layout: &Layout, identifier: &str) -> Result<(), Error> {
    let session = get(layout, identifier)?;
    remove_locked(layout, &session)?;
    info!(session = %session.id, "session deleted");
    Ok(())
}

/// Removes a session's workspace under its exclusive lock. The lock file
/// lives inside the workspace; the held descriptor stays valid while the
/// tree is unlinked.
fn remove_locked(layout: &Layout, session: &Session) -> Result<(), Error> {
    let dir_name = session.dir_name();
    let _lock = crate::lock::LockFile::acquire_exclusive(
        &layout.lock_path(&dir_name),
        crate::lock::DEFAULT_TIMEOUT,
    )?;
    workspace::remove(layout, &dir_name)
}

/// Removes every session whose last access is older than `max_age`,
/// returning the removed records.
///
/// # Errors
///
/// Returns an I/O error when a workspace cannot be removed.
pub fn prune_older_than(
    layout: &Layout,
    max_age: chrono::Duration,
) -> Result<Vec<Session>, Error> {
    let cutoff = Utc::now() - max_age;
    let mut removed = Vec::new();
    for session in list(layout)? {
        if session.last_accessed_at < cutoff {
            remove_locked(layout, &session)?;
            removed.push(session);
        }
    }
    if !removed.is_empty() {
        info!(count = removed.len(), "stale sessions pruned");
    }
    Ok(removed)
}

/// Repairs a session left in `syncing` state by an interrupted sync:
/// removes orphan temp files next to the source archive, resets the state
/// to `open`, and persists.
fn repair_interrupted_sync(layout: &Layout, session: &mut Session) -> Result<(), Error> {
    let mut cleaned = 0usize;
    if let Some(source_dir) = session.source_path.parent() {
        let prefix = orphan_temp_prefix(&session.source_path);
        if let Ok(entries) = std::fs::read_dir(source_dir) {
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                if file_name.to_string_lossy().starts_with(&prefix) {
                    let _ = std::fs::remove_file(entry.path());
                    cleaned += 1;
                }
            }
        }
    }

    session.state = SessionState::Open;
    update(layout, session)?;
    session.recovery_note = Some(format!(
        "previous sync was interrupted; state reset to open ({cleaned} orphan temp file(s) removed)"
    ));
    debug!(session = %session.id, cleaned, "interrupted sync repaired");
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf, Error> {
    if path.is_absolute() {
        return Ok(crate::security::lexical_clean(path));
    }
    let cwd = std::env::current_dir()
        .map_err(|err| Error::io("resolving current directory", err))?;
    Ok(crate::security::lexical_clean(&cwd.join(path)))
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|err| Error::io(format!("opening {}", path.display()), err))?;
    file.write_all(bytes)
        .map_err(|err| Error::io(format!("writing {}", path.display()), err))
}
