//! Dual validation of archive entry paths against an extraction base.
//!
//! Two independent checks must both pass before any byte is written: a
//! lexical relation check (the cleaned join of base and entry, related
//! back to the base, must not begin with `..`) and a literal string-prefix
//! check (the cleaned join must start with the cleaned base). Either alone
//! catches the known zip-slip shapes; requiring both keeps a bug in one
//! from becoming an escape.

use std::path::Path;

use crate::error::Error;
use crate::security::lexical_clean;

/// Validates one archive entry path against the extraction base.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] when the entry is empty, carries a NUL
/// byte, is absolute, or fails either containment check. Performs no I/O.
pub fn validate_entry_path(base: &Path, entry: &str) -> Result<(), Error> {
    if entry.is_empty() {
        return Err(traversal(entry, "entry path must not be empty"));
    }
    if entry.bytes().any(|b| b == 0) {
        return Err(traversal(entry, "entry path contains a NUL byte"));
    }
    if Path::new(entry).is_absolute() {
        return Err(traversal(entry, "entry path must be relative"));
    }

    let clean_base = lexical_clean(base);
    let clean_entry = lexical_clean(Path::new(entry));

    // A cleaned entry that still begins with ".." can only escape.
    if clean_entry.starts_with("..") {
        return Err(traversal(entry, "escapes the extraction base"));
    }

    let target = lexical_clean(&clean_base.join(&clean_entry));

    // Check one: the relation of the join back to the base must not begin
    // with a parent-directory component.
    if target.strip_prefix(&clean_base).is_err() {
        return Err(traversal(entry, "resolves outside the extraction base"));
    }

    // Check two: the cleaned join must carry the base as a string prefix.
    let target_str = target.to_string_lossy();
    let base_str = clean_base.to_string_lossy();
    if !target_str.starts_with(base_str.as_ref()) {
        return Err(traversal(entry, "resolves outside the extraction base"));
    }

    Ok(())
}

/// Validates every entry path, rejecting the whole set on the first
/// failure. Nothing may be written when any entry is invalid.
///
/// # Errors
///
/// Returns the first [`Error::PathTraversal`] encountered.
pub fn validate_all_entry_paths<'a, I>(base: &Path, entries: I) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a str>,
{
    for entry in entries {
        validate_entry_path(base, entry)?;
    }
    Ok(())
}

fn traversal(path: &str, reason: &str) -> Error {
    Error::PathTraversal {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
