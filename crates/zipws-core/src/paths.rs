//! Data-root and per-session path layout.
//!
//! The environment is consulted exactly once, at [`Layout::discover`] time;
//! every accessor after that is a pure function over the resolved root.
//! Deeper components never read environment variables themselves.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Environment variable overriding the data root entirely.
pub const DATA_DIR_ENV: &str = "ZIPWS_DATA_DIR";

/// Directory name joined under `$XDG_DATA_HOME` (or its fallback).
const TOOL_DIR: &str = "zipws";

/// Resolved on-disk layout rooted at the data directory.
///
/// ```text
/// <data-root>/
/// ├─ config.json
/// └─ workspaces/
///    └─ <session-directory-name>/
///       ├─ contents/
///       ├─ original.zip
///       ├─ metadata.json
///       └─ metadata.json.lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    data_root: PathBuf,
}

impl Layout {
    /// Resolves the data root from the environment.
    ///
    /// Priority: `$ZIPWS_DATA_DIR`, else `$XDG_DATA_HOME/zipws`, else
    /// `<home>/.local/share/zipws`.
    ///
    /// # Errors
    ///
    /// Returns an error when no home directory can be determined and
    /// neither override variable is set.
    pub fn discover() -> Result<Self, Error> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(Self::at(PathBuf::from(dir)));
            }
        }

        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return Ok(Self::at(PathBuf::from(xdg).join(TOOL_DIR)));
            }
        }

        let base = directories::BaseDirs::new().ok_or_else(|| {
            Error::io(
                "resolving data directory",
                std::io::Error::other("no home directory for the current user"),
            )
        })?;
        Ok(Self::at(
            base.home_dir().join(".local").join("share").join(TOOL_DIR),
        ))
    }

    /// Creates a layout rooted at an explicit directory.
    #[must_use]
    pub fn at(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// The data root itself.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.data_root.join("config.json")
    }

    /// Directory holding every session workspace.
    #[must_use]
    pub fn workspaces_root(&self) -> PathBuf {
        self.data_root.join("workspaces")
    }

    /// Workspace directory for one session.
    #[must_use]
    pub fn workspace(&self, dir_name: &str) -> PathBuf {
        self.workspaces_root().join(dir_name)
    }

    /// The materialized tree exposed to external consumers.
    #[must_use]
    pub fn contents_dir(&self, dir_name: &str) -> PathBuf {
        self.workspace(dir_name).join("contents")
    }

    /// Byte-identical copy of the source archive captured at open time.
    #[must_use]
    pub fn original_zip(&self, dir_name: &str) -> PathBuf {
        self.workspace(dir_name).join("original.zip")
    }

    /// Serialized session record.
    #[must_use]
    pub fn metadata_path(&self, dir_name: &str) -> PathBuf {
        self.workspace(dir_name).join("metadata.json")
    }

    /// Rendezvous file for the lock manager.
    #[must_use]
    pub fn lock_path(&self, dir_name: &str) -> PathBuf {
        self.workspace(dir_name).join("metadata.json.lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_deterministic_over_the_root() {
        let layout = Layout::at("/data/zipws");
        assert_eq!(layout.config_path(), Path::new("/data/zipws/config.json"));
        assert_eq!(
            layout.workspaces_root(),
            Path::new("/data/zipws/workspaces")
        );
        assert_eq!(
            layout.workspace("report"),
            Path::new("/data/zipws/workspaces/report")
        );
        assert_eq!(
            layout.contents_dir("report"),
            Path::new("/data/zipws/workspaces/report/contents")
        );
        assert_eq!(
            layout.original_zip("report"),
            Path::new("/data/zipws/workspaces/report/original.zip")
        );
        assert_eq!(
            layout.metadata_path("report"),
            Path::new("/data/zipws/workspaces/report/metadata.json")
        );
        assert_eq!(
            layout.lock_path("report"),
            Path::new("/data/zipws/workspaces/report/metadata.json.lock")
        );
    }

    #[test]
    fn every_session_path_stays_under_the_root() {
        let layout = Layout::at("/data/zipws");
        for path in [
            layout.workspace("a"),
            layout.contents_dir("a"),
            layout.original_zip("a"),
            layout.metadata_path("a"),
            layout.lock_path("a"),
        ] {
            assert!(path.starts_with(layout.data_root()));
        }
    }
}
