//! File-level operations: list, read, write, delete.

use std::io::{Read, Seek, SeekFrom};

use tracing::debug;
use walkdir::WalkDir;

use super::{resolve_in_contents, shared_lock, EntryKind, FileEntry};
use crate::error::Error;
use crate::paths::Layout;
use crate::session::Session;

/// Lists entries at a relative path inside the workspace.
///
/// Listing a directory returns its immediate children by default and the
/// whole subtree when `recursive` is set; listing a single file returns
/// one entry of kind `file`.
///
/// # Errors
///
/// Returns [`Error::PathNotFound`] when the target is absent and
/// [`Error::PathTraversal`] when the path fails validation.
pub fn list(
    layout: &Layout,
    session: &Session,
    relative: &str,
    recursive: bool,
) -> Result<Vec<FileEntry>, Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, true)?;

    let meta = std::fs::symlink_metadata(&target).map_err(|err| not_found(relative, &err))?;

    if !meta.is_dir() {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.to_string());
        return Ok(vec![entry_from_metadata(name, &meta)]);
    }

    let mut entries = Vec::new();
    if recursive {
        for item in WalkDir::new(&target).follow_links(false).sort_by_file_name() {
            let item = item.map_err(|err| Error::io("walking workspace contents", err.into()))?;
            if item.path() == target {
                continue;
            }
            let rel = item
                .path()
                .strip_prefix(&target)
                .unwrap_or(item.path())
                .to_string_lossy()
                .into_owned();
            let meta = std::fs::symlink_metadata(item.path())
                .map_err(|err| Error::io(format!("stat {}", item.path().display()), err))?;
            entries.push(entry_from_metadata(rel, &meta));
        }
    } else {
        let mut children: Vec<_> = std::fs::read_dir(&target)
            .map_err(|err| Error::io(format!("reading {}", target.display()), err))?
            .collect::<Result<_, _>>()
            .map_err(|err| Error::io(format!("reading {}", target.display()), err))?;
        children.sort_by_key(std::fs::DirEntry::file_name);
        for child in children {
            let meta = std::fs::symlink_metadata(child.path())
                .map_err(|err| Error::io(format!("stat {}", child.path().display()), err))?;
            entries.push(entry_from_metadata(
                child.file_name().to_string_lossy().into_owned(),
                &meta,
            ));
        }
    }
    Ok(entries)
}

/// Reads an entire file from the workspace.
///
/// # Errors
///
/// Returns [`Error::PathNotFound`] when the file is absent and
/// [`Error::PathTraversal`] when the path fails validation.
pub fn read(layout: &Layout, session: &Session, relative: &str) -> Result<Vec<u8>, Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, false)?;
    std::fs::read(&target).map_err(|err| not_found(relative, &err))
}

/// Reads up to `limit` bytes starting at `offset`; a `limit` of zero means
/// to the end of the file. Reading past the end yields an empty buffer.
///
/// # Errors
///
/// As [`read`].
pub fn read_range(
    layout: &Layout,
    session: &Session,
    relative: &str,
    offset: u64,
    limit: u64,
) -> Result<Vec<u8>, Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, false)?;

    let mut file = std::fs::File::open(&target).map_err(|err| not_found(relative, &err))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|err| Error::io(format!("seeking in {relative:?}"), err))?;

    let mut bytes = Vec::new();
    if limit > 0 {
        file.take(limit)
            .read_to_end(&mut bytes)
            .map_err(|err| Error::io(format!("reading {relative:?}"), err))?;
    } else {
        file.read_to_end(&mut bytes)
            .map_err(|err| Error::io(format!("reading {relative:?}"), err))?;
    }
    Ok(bytes)
}

/// Writes bytes to a file in the workspace, overwriting any prior content.
/// Parent directories are created when `create_dirs` is set. New files are
/// created with mode `0o644`.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] when the path fails validation, or an
/// I/O error with context.
pub fn write(
    layout: &Layout,
    session: &Session,
    relative: &str,
    bytes: &[u8],
    create_dirs: bool,
) -> Result<(), Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, false)?;

    if create_dirs {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::io(format!("creating parents of {relative:?}"), err))?;
        }
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options
        .open(&target)
        .map_err(|err| Error::io(format!("creating {relative:?}"), err))?;
    std::io::Write::write_all(&mut file, bytes)
        .map_err(|err| Error::io(format!("writing {relative:?}"), err))?;

    debug!(path = relative, bytes = bytes.len(), "workspace file written");
    Ok(())
}

/// Deletes a file, or a directory when `recursive` is set. Deleting a
/// directory without `recursive` is refused.
///
/// # Errors
///
/// Returns [`Error::PathNotFound`] when the target is absent,
/// [`Error::PathTraversal`] when the path fails validation, or an I/O
/// error with context.
pub fn delete(
    layout: &Layout,
    session: &Session,
    relative: &str,
    recursive: bool,
) -> Result<(), Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, false)?;

    let meta = std::fs::symlink_metadata(&target).map_err(|err| not_found(relative, &err))?;

    if meta.is_dir() {
        if !recursive {
            return Err(Error::io(
                format!("deleting {relative:?}"),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path is a directory; pass recursive to delete it",
                ),
            ));
        }
        std::fs::remove_dir_all(&target)
            .map_err(|err| Error::io(format!("removing {relative:?}"), err))?;
    } else {
        std::fs::remove_file(&target)
            .map_err(|err| Error::io(format!("removing {relative:?}"), err))?;
    }

    debug!(path = relative, "workspace path deleted");
    Ok(())
}

fn entry_from_metadata(name: String, meta: &std::fs::Metadata) -> FileEntry {
    let kind = if meta.file_type().is_symlink() {
        EntryKind::Symlink
    } else if meta.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    FileEntry {
        name,
        kind,
        size_bytes: meta.len(),
        modified_at: mtime_unix(meta),
    }
}

pub(super) fn mtime_unix(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

fn not_found(relative: &str, err: &std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::PathNotFound {
            path: relative.to_string(),
        }
    } else {
        Error::io(format!("accessing {relative:?}"), std::io::Error::new(err.kind(), err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::open_fixture;
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn lists_immediate_children_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(
            &dir,
            &[("b.txt", b"bb"), ("a.txt", b"a"), ("sub/nested.txt", b"n")],
        );

        let entries = list(&layout, &session, "", false).expect("list");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size_bytes, 1);
        assert_eq!(entries[2].kind, EntryKind::Dir);
    }

    #[test]
    fn recursive_listing_spans_the_subtree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) =
            open_fixture(&dir, &[("a.txt", b"a"), ("sub/nested.txt", b"n")]);

        let entries = list(&layout, &session, "", true).expect("list");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub", "sub/nested.txt"]);
    }

    #[test]
    fn listing_a_file_yields_the_single_entry_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("only.txt", b"abc")]);

        let entries = list(&layout, &session, "only.txt", false).expect("list");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "only.txt");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size_bytes, 3);
    }

    #[test]
    fn missing_paths_surface_path_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"a")]);

        for result in [
            list(&layout, &session, "absent", false).map(|_| ()),
            read(&layout, &session, "absent").map(|_| ()),
            delete(&layout, &session, "absent", false),
        ] {
            assert_eq!(result.unwrap_err().code(), Some(ErrorCode::PathNotFound));
        }
    }

    #[test]
    fn traversal_is_rejected_on_every_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"a")]);

        for result in [
            list(&layout, &session, "../x", false).map(|_| ()),
            read(&layout, &session, "../x").map(|_| ()),
            write(&layout, &session, "../x", b"y", false),
            delete(&layout, &session, "../x", false),
        ] {
            assert_eq!(result.unwrap_err().code(), Some(ErrorCode::PathTraversal));
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"a")]);

        write(&layout, &session, "new/deep/file.bin", b"\x00\x01\x02", true).expect("write");
        assert_eq!(
            read(&layout, &session, "new/deep/file.bin").expect("read"),
            b"\x00\x01\x02"
        );

        // Overwrite truncates.
        write(&layout, &session, "a.txt", b"replaced", false).expect("overwrite");
        assert_eq!(read(&layout, &session, "a.txt").expect("read"), b"replaced");
    }

    #[cfg(unix)]
    #[test]
    fn new_files_are_created_with_0o644() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"a")]);

        write(&layout, &session, "fresh.txt", b"x", false).expect("write");
        let mode = std::fs::metadata(
            layout.contents_dir(&session.dir_name()).join("fresh.txt"),
        )
        .expect("metadata")
        .permissions()
        .mode()
            & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn read_range_bounds_the_view() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("a.txt", b"0123456789")]);

        assert_eq!(
            read_range(&layout, &session, "a.txt", 2, 3).expect("range"),
            b"234"
        );
        assert_eq!(
            read_range(&layout, &session, "a.txt", 8, 0).expect("tail"),
            b"89"
        );
        assert!(read_range(&layout, &session, "a.txt", 100, 5)
            .expect("past end")
            .is_empty());
    }

    #[test]
    fn delete_refuses_a_directory_without_recursion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (layout, _config, session) = open_fixture(&dir, &[("sub/nested.txt", b"n")]);

        assert!(delete(&layout, &session, "sub", false).is_err());
        assert!(layout
            .contents_dir(&session.dir_name())
            .join("sub/nested.txt")
            .exists());

        delete(&layout, &session, "sub", true).expect("recursive delete");
        assert!(!layout.contents_dir(&session.dir_name()).join("sub").exists());
    }
}
