//! Change tracking against the archived original.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use walkdir::WalkDir;

use super::{fs::mtime_unix, shared_lock, StatusReport};
use crate::archive::zip_datetime_to_unix;
use crate::error::Error;
use crate::paths::Layout;
use crate::session::Session;

/// Compares the workspace contents against `original.zip`.
///
/// A file counts as modified when its size differs from the archive's
/// declared uncompressed size, or its modification time differs from the
/// recorded archive time. Symbolic links are ignored on both sides.
///
/// # Errors
///
/// Returns [`Error::ZipInvalid`] when the original archive cannot be
/// parsed and I/O errors with context otherwise.
pub fn status(layout: &Layout, session: &Session) -> Result<StatusReport, Error> {
    let _lock = shared_lock(layout, session)?;
    status_unlocked(layout, session)
}

/// Lock-free body of [`status`], for callers that already hold the
/// session's lock.
pub(crate) fn status_unlocked(layout: &Layout, session: &Session) -> Result<StatusReport, Error> {
    let dir_name = session.dir_name();
    let original = layout.original_zip(&dir_name);
    let contents = layout.contents_dir(&dir_name);

    let archived = archived_files(&original)?;
    let current = current_files(&contents)?;

    let mut report = StatusReport {
        modified: Vec::new(),
        added: Vec::new(),
        deleted: Vec::new(),
        unchanged_count: 0,
    };

    for (path, stat) in &current {
        match archived.get(path) {
            Some(record) => {
                let same_size = stat.size == record.size;
                let same_mtime = match record.mtime {
                    Some(recorded) => stat.mtime == recorded,
                    None => true,
                };
                if same_size && same_mtime {
                    report.unchanged_count += 1;
                } else {
                    report.modified.push(path.clone());
                }
            }
            None => report.added.push(path.clone()),
        }
    }
    for path in archived.keys() {
        if !current.contains_key(path) {
            report.deleted.push(path.clone());
        }
    }

    report.modified.sort();
    report.added.sort();
    report.deleted.sort();
    Ok(report)
}

struct ArchivedRecord {
    size: u64,
    mtime: Option<i64>,
}

struct CurrentStat {
    size: u64,
    mtime: i64,
}

fn archived_files(original: &Path) -> Result<HashMap<String, ArchivedRecord>, Error> {
    let file = File::open(original)
        .map_err(|err| Error::io(format!("opening {}", original.display()), err))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| Error::ZipInvalid {
        path: original.to_path_buf(),
        source,
    })?;

    let mut records = HashMap::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|source| Error::ZipInvalid {
                path: original.to_path_buf(),
                source,
            })?;
        if entry.is_dir() {
            continue;
        }
        records.insert(
            entry.name().to_string(),
            ArchivedRecord {
                size: entry.size(),
                mtime: entry
                    .last_modified()
                    .and_then(|dt| zip_datetime_to_unix(&dt)),
            },
        );
    }
    Ok(records)
}

fn current_files(contents: &Path) -> Result<HashMap<String, CurrentStat>, Error> {
    let mut files = HashMap::new();
    for entry in WalkDir::new(contents).follow_links(false) {
        let entry = entry.map_err(|err| Error::io("walking workspace contents", err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(contents)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let meta = entry
            .metadata()
            .map_err(|err| Error::io(format!("stat {}", entry.path().display()), err.into()))?;
        files.insert(
            rel,
            CurrentStat {
                size: meta.len(),
                mtime: mtime_unix(&meta),
            },
        );
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::open_fixture;
    use super::*;
    use crate::tool;

    #[test]
    fn fresh_session_reports_everything_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) =
            open_fixture(&dir, &[("a.txt", b"aa"), ("sub/b.txt", b"bb")]);

        let report = status(&layout, &session).expect("status");
        assert!(report.modified.is_empty());
        assert!(report.added.is_empty());
        assert!(report.deleted.is_empty());
        assert_eq!(report.unchanged_count, 2);
    }

    #[test]
    fn tracks_modified_added_and_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) =
            open_fixture(&dir, &[("a.txt", b"aa"), ("b.txt", b"bb"), ("c.txt", b"cc")]);

        tool::write(&layout, &session, "a.txt", b"rewritten", false).expect("modify");
        tool::write(&layout, &session, "new.txt", b"fresh", false).expect("add");
        tool::delete(&layout, &session, "c.txt", false).expect("delete");

        let report = status(&layout, &session).expect("status");
        assert_eq!(report.modified, vec!["a.txt".to_string()]);
        assert_eq!(report.added, vec!["new.txt".to_string()]);
        assert_eq!(report.deleted, vec!["c.txt".to_string()]);
        assert_eq!(report.unchanged_count, 1);
    }

    #[test]
    fn size_preserving_touch_still_counts_as_modified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"aa")]);

        // Same size, different bytes; the rewrite bumps the mtime past the
        // archive's recorded (two-second resolution) timestamp.
        let target = layout.contents_dir(&session.dir_name()).join("a.txt");
        std::fs::write(&target, b"zz").expect("rewrite");
        let future = filetime::FileTime::from_unix_time(
            chrono::Utc::now().timestamp() + 7200,
            0,
        );
        filetime::set_file_mtime(&target, future).expect("bump mtime");

        let report = status(&layout, &session).expect("status");
        assert_eq!(report.modified, vec!["a.txt".to_string()]);
    }
}
