//! Read and mutation operations over a session's `contents/` tree.
//!
//! Every operation takes a relative path that is validated twice before
//! any filesystem access: the structural relative-path rules, then the
//! dual containment check against the contents directory. Reads and writes
//! hold the session's shared lock for their duration; only sync and close
//! take the exclusive lock.

mod fs;
mod grep;
mod status;
mod tree;

pub use fs::{delete, list, read, read_range, write};
pub use grep::grep;
pub use status::status;
pub use tree::tree;

pub(crate) use status::status_unlocked;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::lock::{LockFile, DEFAULT_TIMEOUT};
use crate::paths::Layout;
use crate::security::{validate_entry_path, validate_relative_path};
use crate::session::Session;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link; reported but never followed.
    Symlink,
}

/// One entry returned by [`list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Name relative to the listed path (or the bare file name for
    /// immediate children).
    pub name: String,
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time, unix seconds.
    pub modified_at: i64,
}

/// One match returned by [`grep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// File path relative to the contents root, forward slashes.
    pub file: String,
    /// One-based line number.
    pub line_number: usize,
    /// The matching line.
    pub line_content: String,
}

/// Rendered tree plus counts, returned by [`tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeView {
    /// The formatted tree, one entry per line.
    pub rendered: String,
    /// Number of files encountered.
    pub file_count: usize,
    /// Number of directories encountered.
    pub dir_count: usize,
}

/// Workspace changes relative to `original.zip`, returned by [`status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Files present in both whose size or mtime differs from the archive
    /// record.
    pub modified: Vec<String>,
    /// Files present only in the workspace.
    pub added: Vec<String>,
    /// Files present only in the archive.
    pub deleted: Vec<String>,
    /// Files present in both and unchanged.
    pub unchanged_count: usize,
}

/// Resolves a user-supplied relative path inside the session's contents
/// directory, running both validators. An empty path (or `.`) addresses
/// the contents root itself when `allow_root` is set.
fn resolve_in_contents(
    layout: &Layout,
    session: &Session,
    relative: &str,
    allow_root: bool,
) -> Result<PathBuf, Error> {
    let contents = layout.contents_dir(&session.dir_name());
    if allow_root && (relative.is_empty() || relative == ".") {
        return Ok(contents);
    }
    validate_relative_path(relative)?;
    validate_entry_path(&contents, relative)?;
    Ok(contents.join(relative))
}

/// Takes the session's shared lock for the duration of a read or
/// non-archive-touching write.
fn shared_lock(layout: &Layout, session: &Session) -> Result<LockFile, Error> {
    LockFile::acquire_shared(&layout.lock_path(&session.dir_name()), DEFAULT_TIMEOUT)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use crate::config::Config;
    use crate::paths::Layout;
    use crate::session::{self, Session};

    /// Builds a zip fixture at `dir/name` from `(entry, bytes)` pairs.
    pub fn write_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (entry, bytes) in entries {
            writer.start_file(*entry, options).expect("start file");
            writer.write_all(bytes).expect("write entry");
        }
        writer.finish().expect("finish");
        path
    }

    /// Creates a sandboxed session over a small fixture archive.
    pub fn open_fixture(
        dir: &tempfile::TempDir,
        entries: &[(&str, &[u8])],
    ) -> (Layout, Config, Session) {
        let layout = Layout::at(dir.path().join("data"));
        let config = Config::default();
        let zip = write_zip(dir.path(), "fixture.zip", entries);
        let session = session::create(&zip, Some("fixture"), &layout, &config).expect("create");
        (layout, config, session)
    }
}
