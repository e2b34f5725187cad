//! Scoped creation and teardown of per-session workspace directories.

use std::path::Path;

use tracing::debug;

use crate::error::Error;
use crate::paths::Layout;

/// Creates the workspace directory and its empty `contents/` subdirectory
/// with owner-only permissions. Idempotent for the same session.
///
/// # Errors
///
/// Returns an I/O error with context when a directory cannot be created.
pub fn create(layout: &Layout, dir_name: &str) -> Result<(), Error> {
    create_dir_owner_only(&layout.workspaces_root())?;
    create_dir_owner_only(&layout.workspace(dir_name))?;
    create_dir_owner_only(&layout.contents_dir(dir_name))?;
    debug!(workspace = dir_name, "workspace created");
    Ok(())
}

/// Removes the entire workspace subtree. A missing workspace is success.
///
/// # Errors
///
/// Returns an I/O error with context when removal fails for a reason other
/// than non-existence.
pub fn remove(layout: &Layout, dir_name: &str) -> Result<(), Error> {
    let workspace = layout.workspace(dir_name);
    match std::fs::remove_dir_all(&workspace) {
        Ok(()) => {
            debug!(workspace = dir_name, "workspace removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(
            format!("removing workspace {}", workspace.display()),
            err,
        )),
    }
}

fn create_dir_owner_only(path: &Path) -> Result<(), Error> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(path)
        .map_err(|err| Error::io(format!("creating directory {}", path.display()), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_builds_the_owner_only_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::at(dir.path());

        create(&layout, "r").expect("create");
        assert!(layout.contents_dir("r").is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in [
                layout.workspaces_root(),
                layout.workspace("r"),
                layout.contents_dir("r"),
            ] {
                let mode = std::fs::metadata(&path)
                    .expect("metadata")
                    .permissions()
                    .mode()
                    & 0o777;
                assert_eq!(mode, 0o700, "{}", path.display());
            }
        }
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::at(dir.path());
        create(&layout, "r").expect("first");
        create(&layout, "r").expect("second");
    }

    #[test]
    fn remove_is_total() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::at(dir.path());

        create(&layout, "r").expect("create");
        std::fs::write(layout.contents_dir("r").join("f"), b"x").expect("seed");
        remove(&layout, "r").expect("remove");
        assert!(!layout.workspace("r").exists());

        // Absent workspace is not an error.
        remove(&layout, "r").expect("remove again");
    }
}
