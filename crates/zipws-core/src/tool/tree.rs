//! Rendered tree view of the workspace.

use std::path::Path;

use super::{resolve_in_contents, shared_lock, TreeView};
use crate::error::Error;
use crate::paths::Layout;
use crate::session::Session;

/// Renders a tree of the workspace below a relative path.
///
/// `max_depth` of zero means unlimited depth.
///
/// # Errors
///
/// Returns [`Error::PathNotFound`] when the target is absent and
/// [`Error::PathTraversal`] when the path fails validation.
pub fn tree(
    layout: &Layout,
    session: &Session,
    relative: &str,
    max_depth: usize,
) -> Result<TreeView, Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, true)?;

    if !target.exists() {
        return Err(Error::PathNotFound {
            path: relative.to_string(),
        });
    }

    let mut view = TreeView {
        rendered: String::new(),
        file_count: 0,
        dir_count: 0,
    };
    render_level(&target, "", 0, max_depth, &mut view)?;
    Ok(view)
}

fn render_level(
    path: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    view: &mut TreeView,
) -> Result<(), Error> {
    if max_depth > 0 && depth >= max_depth {
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(path)
        .map_err(|err| Error::io(format!("reading {}", path.display()), err))?
        .collect::<Result<_, _>>()
        .map_err(|err| Error::io(format!("reading {}", path.display()), err))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let last = entries.len().saturating_sub(1);
    for (index, entry) in entries.iter().enumerate() {
        let (connector, child_prefix) = if index == last {
            ("└── ", format!("{prefix}    "))
        } else {
            ("├── ", format!("{prefix}│   "))
        };

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if is_dir {
            name.push('/');
            view.dir_count += 1;
        } else {
            view.file_count += 1;
        }

        view.rendered.push_str(prefix);
        view.rendered.push_str(connector);
        view.rendered.push_str(&name);
        view.rendered.push('\n');

        if is_dir {
            render_level(&entry.path(), &child_prefix, depth + 1, max_depth, view)?;
        }
    }
    Ok(())
}
