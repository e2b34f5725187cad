//! Repacking a workspace tree into a fresh archive.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::error::Error;

/// Packs the current files and directories under `source_dir` into a new
/// archive at `dest`, truncating any prior content there.
///
/// Stored paths use forward slashes relative to `source_dir`. Directories
/// are explicit entries using the store method; files use deflate. Unix
/// permissions and modification times are recorded where available.
/// Symbolic links are never followed and never stored.
///
/// # Errors
///
/// Returns an I/O error with context when the walk or any write fails.
pub fn pack(source_dir: &Path, dest: &Path) -> Result<(), Error> {
    let out =
        File::create(dest).map_err(|err| Error::io(format!("creating {}", dest.display()), err))?;
    let mut writer = zip::ZipWriter::new(out);

    let mut entries = 0usize;
    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry =
            entry.map_err(|err| Error::io("walking workspace contents", err.into()))?;
        if entry.path() == source_dir {
            continue;
        }
        // lstat via walkdir: symlinks are reported as symlinks, not targets.
        if entry.path_is_symlink() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| Error::io(
                "walking workspace contents",
                std::io::Error::other(format!(
                    "entry {} is not under {}",
                    entry.path().display(),
                    source_dir.display()
                )),
            ))?;
        let name = to_forward_slashes(rel);
        let options = entry_options(&entry)?;

        if entry.file_type().is_dir() {
            writer
                .add_directory(&name, options.compression_method(CompressionMethod::Stored))
                .map_err(|err| pack_error(&name, err))?;
        } else {
            writer
                .start_file(
                    &name,
                    options.compression_method(CompressionMethod::Deflated),
                )
                .map_err(|err| pack_error(&name, err))?;
            let file = File::open(entry.path())
                .map_err(|err| Error::io(format!("opening {}", entry.path().display()), err))?;
            let mut reader = BufReader::new(file);
            std::io::copy(&mut reader, &mut writer)
                .map_err(|err| Error::io(format!("deflating {name:?}"), err))?;
        }
        entries += 1;
    }

    let mut out = writer
        .finish()
        .map_err(|err| pack_error("central directory", err))?;
    out.flush()
        .map_err(|err| Error::io(format!("flushing {}", dest.display()), err))?;

    debug!(dest = %dest.display(), entries, "workspace packed");
    Ok(())
}

fn entry_options(entry: &walkdir::DirEntry) -> Result<SimpleFileOptions, Error> {
    let metadata = entry
        .metadata()
        .map_err(|err| Error::io(format!("stat {}", entry.path().display()), err.into()))?;

    let mut options = SimpleFileOptions::default();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o777);
    }

    if let Ok(modified) = metadata.modified() {
        let stamp: chrono::DateTime<chrono::Utc> = modified.into();
        if let Some(dt) = zip_datetime_from(&stamp) {
            options = options.last_modified_time(dt);
        }
    }
    Ok(options)
}

/// Maps a wall-clock timestamp into the archive's calendar; `None` when it
/// falls outside the representable 1980..=2107 range.
fn zip_datetime_from(stamp: &chrono::DateTime<chrono::Utc>) -> Option<zip::DateTime> {
    use chrono::{Datelike, Timelike};
    zip::DateTime::from_date_and_time(
        u16::try_from(stamp.year()).ok()?,
        u8::try_from(stamp.month()).ok()?,
        u8::try_from(stamp.day()).ok()?,
        u8::try_from(stamp.hour()).ok()?,
        u8::try_from(stamp.minute()).ok()?,
        u8::try_from(stamp.second()).ok()?,
    )
    .ok()
}

fn to_forward_slashes(rel: &Path) -> String {
    let mut name = String::new();
    for component in rel.components() {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

fn pack_error(name: &str, err: zip::result::ZipError) -> Error {
    Error::io(
        format!("writing archive entry {name:?}"),
        std::io::Error::other(err),
    )
}
