//! Fail-closed archive extraction.
//!
//! Every entry path is validated before any byte is written; any rejection
//! aborts the whole extraction. During materialization the declared sizes
//! from the central directory are treated as untrusted: an entry that
//! streams more than 10% past its declared uncompressed size, or pushes the
//! cumulative written total past the configured cap, aborts with a bomb
//! error and the destination is reset to empty.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::Error;
use crate::security::{
    lexical_clean, scan_for_bomb, validate_all_entry_paths, SecurityLimits,
};

/// Tolerated overshoot of actual bytes past the declared uncompressed
/// size, as a fraction denominator: declared + declared/10.
const DECLARED_SIZE_SLACK_DIVISOR: u64 = 10;

/// Result of a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted {
    /// Number of file entries written.
    pub file_count: usize,
    /// Total uncompressed bytes written.
    pub total_bytes: u64,
}

/// Extracts `archive_path` into `dest`, which must already exist.
///
/// Per-entry modes are preserved masked to `0o755` (set-id bits cleared)
/// and modification times are restored where the archive records them.
/// Symlink entries are skipped unless `allow_symlinks` is set, in which
/// case the target must be relative and resolve inside `dest`.
///
/// # Errors
///
/// Returns [`Error::ZipBombDetected`] from the pre-scan or the runtime
/// guards, [`Error::PathTraversal`] when any entry path fails validation
/// (nothing is written in that case), and I/O or parse errors otherwise.
/// On any failure after path validation the destination is reset to an
/// empty directory.
pub fn extract(
    archive_path: &Path,
    dest: &Path,
    limits: &SecurityLimits,
    allow_symlinks: bool,
) -> Result<Extracted, Error> {
    scan_for_bomb(archive_path, limits)?.into_result()?;

    let file = File::open(archive_path).map_err(|_| Error::ZipNotFound {
        path: archive_path.to_path_buf(),
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| Error::ZipInvalid {
        path: archive_path.to_path_buf(),
        source,
    })?;

    // Fail closed: every entry path must validate before any byte lands.
    let names: Vec<String> = (0..archive.len())
        .map(|index| {
            archive
                .by_index_raw(index)
                .map(|entry| entry.name().to_string())
                .map_err(|source| Error::ZipInvalid {
                    path: archive_path.to_path_buf(),
                    source,
                })
        })
        .collect::<Result<_, _>>()?;
    validate_all_entry_paths(dest, names.iter().map(String::as_str))?;

    match materialize(&mut archive, dest, limits, allow_symlinks) {
        Ok(extracted) => {
            debug!(
                archive = %archive_path.display(),
                files = extracted.file_count,
                bytes = extracted.total_bytes,
                "extraction complete"
            );
            Ok(extracted)
        }
        Err(err) => {
            reset_dest(dest);
            Err(err)
        }
    }
}

fn materialize(
    archive: &mut zip::ZipArchive<File>,
    dest: &Path,
    limits: &SecurityLimits,
    allow_symlinks: bool,
) -> Result<Extracted, Error> {
    let mut file_count = 0usize;
    let mut total_bytes = 0u64;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|source| Error::ZipInvalid {
            path: dest.to_path_buf(),
            source,
        })?;
        let name = entry.name().to_string();
        let target = dest.join(&name);

        if entry.is_dir() {
            create_dir_all_mode(&target, dir_mode(entry.unix_mode()))?;
            continue;
        }

        if is_symlink(entry.unix_mode()) {
            if allow_symlinks {
                write_symlink(&mut entry, dest, &target, &name)?;
            }
            continue;
        }

        if let Some(parent) = target.parent() {
            create_dir_all_mode(parent, 0o755)?;
        }

        let declared = entry.size();
        let written = copy_entry_guarded(&mut entry, &target, &name, declared, total_bytes, limits)?;
        total_bytes = total_bytes.saturating_add(written);
        file_count += 1;

        apply_mode(&target, entry.unix_mode())?;
        if let Some(unix) = entry.last_modified().and_then(|dt| super::zip_datetime_to_unix(&dt)) {
            let mtime = filetime::FileTime::from_unix_time(unix, 0);
            filetime::set_file_mtime(&target, mtime)
                .map_err(|err| Error::io(format!("restoring mtime of {name:?}"), err))?;
        }
    }

    Ok(Extracted {
        file_count,
        total_bytes,
    })
}

/// Streams one entry to disk, enforcing the per-entry and cumulative
/// runtime size guards.
fn copy_entry_guarded(
    entry: &mut impl Read,
    target: &Path,
    name: &str,
    declared: u64,
    written_so_far: u64,
    limits: &SecurityLimits,
) -> Result<u64, Error> {
    let allowed = declared.saturating_add(declared / DECLARED_SIZE_SLACK_DIVISOR);

    let mut out = open_for_write(target)
        .map_err(|err| Error::io(format!("creating {}", target.display()), err))?;

    let mut buf = [0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = entry
            .read(&mut buf)
            .map_err(|err| Error::io(format!("reading entry {name:?}"), err))?;
        if n == 0 {
            break;
        }
        written = written.saturating_add(n as u64);
        if written > allowed {
            return Err(Error::ZipBombDetected {
                reason: format!(
                    "entry {name:?} streams past its declared size ({written} > {declared} bytes + 10%)"
                ),
            });
        }
        if written_so_far.saturating_add(written) > limits.max_extracted_size_bytes {
            return Err(Error::ZipBombDetected {
                reason: format!(
                    "cumulative written bytes exceed limit ({} bytes)",
                    limits.max_extracted_size_bytes
                ),
            });
        }
        std::io::Write::write_all(&mut out, &buf[..n])
            .map_err(|err| Error::io(format!("writing {}", target.display()), err))?;
    }
    Ok(written)
}

/// Materializes a symlink entry after validating its target stays inside
/// the extraction base.
#[cfg(unix)]
fn write_symlink(
    entry: &mut impl Read,
    dest: &Path,
    target: &Path,
    name: &str,
) -> Result<(), Error> {
    let mut link_target = String::new();
    entry
        .read_to_string(&mut link_target)
        .map_err(|err| Error::io(format!("reading symlink entry {name:?}"), err))?;

    if Path::new(&link_target).is_absolute() {
        return Err(Error::PathTraversal {
            path: link_target,
            reason: "symlink target must be relative".to_string(),
        });
    }
    // Resolve the target relative to the link's own directory and require
    // the result to stay inside the extraction base.
    let link_dir = target.parent().unwrap_or(dest);
    let resolved = lexical_clean(&link_dir.join(&link_target));
    if resolved.strip_prefix(dest).is_err() {
        return Err(Error::PathTraversal {
            path: link_target,
            reason: "symlink target resolves outside the extraction base".to_string(),
        });
    }

    if let Some(parent) = target.parent() {
        create_dir_all_mode(parent, 0o755)?;
    }
    std::os::unix::fs::symlink(&link_target, target)
        .map_err(|err| Error::io(format!("creating symlink {name:?}"), err))
}

#[cfg(not(unix))]
fn write_symlink(
    _entry: &mut impl Read,
    _dest: &Path,
    _target: &Path,
    _name: &str,
) -> Result<(), Error> {
    // Symlink entries are not materialized on platforms without them.
    Ok(())
}

fn is_symlink(unix_mode: Option<u32>) -> bool {
    unix_mode.is_some_and(|mode| mode & 0o170_000 == 0o120_000)
}

fn dir_mode(unix_mode: Option<u32>) -> u32 {
    unix_mode.map_or(0o755, |mode| mode & 0o755)
}

fn create_dir_all_mode(path: &Path, mode: u32) -> Result<(), Error> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(path)
        .map_err(|err| Error::io(format!("creating directory {}", path.display()), err))
}

fn open_for_write(path: &Path) -> std::io::Result<File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    options.open(path)
}

/// Preserves the entry mode masked to `0o755`; set-id bits never survive.
fn apply_mode(path: &Path, unix_mode: Option<u32>) -> Result<(), Error> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = unix_mode.map_or(0o644, |m| m & 0o755);
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|err| Error::io(format!("setting mode on {}", path.display()), err))?;
    }
    #[cfg(not(unix))]
    let _ = (path, unix_mode);
    Ok(())
}

/// Restores the destination to an empty directory after a failed
/// extraction; best effort, the original error wins.
fn reset_dest(dest: &Path) {
    let _ = std::fs::remove_dir_all(dest);
    let _ = create_dir_all_mode(dest, 0o700);
}
