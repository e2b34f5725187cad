//! Regex search over workspace files.
//!
//! The engine is linear-time (no catastrophic backtracking), and the whole
//! operation, pattern compile plus scan, runs under a wall-clock budget
//! from the configuration.

use std::path::Path;
use std::time::{Duration, Instant};

use regex::RegexBuilder;
use walkdir::WalkDir;

use super::{resolve_in_contents, shared_lock, GrepMatch};
use crate::config::Config;
use crate::error::Error;
use crate::paths::Layout;
use crate::session::Session;

/// Upper bound on the compiled pattern size.
const PATTERN_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Searches workspace files for a regex pattern.
///
/// `glob` filters by file name when non-empty. Matches are capped at
/// `max_results` (zero means unlimited); the returned count is the number
/// of matches found before the cap stopped the walk.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] when the pattern does not compile,
/// [`Error::PathTraversal`] for invalid paths or globs, and
/// [`Error::LimitExceeded`] when the `regex_timeout_ms` budget expires.
#[allow(clippy::too_many_arguments)]
pub fn grep(
    layout: &Layout,
    session: &Session,
    relative: &str,
    pattern: &str,
    glob: &str,
    ignore_case: bool,
    max_results: usize,
    config: &Config,
) -> Result<(Vec<GrepMatch>, usize), Error> {
    let _lock = shared_lock(layout, session)?;
    let target = resolve_in_contents(layout, session, relative, true)?;
    if !glob.is_empty() {
        crate::security::validate_glob_pattern(glob)?;
    }

    let deadline = Instant::now() + Duration::from_millis(config.security.regex_timeout_ms);

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

    let name_filter = if glob.is_empty() {
        None
    } else {
        Some(glob::Pattern::new(glob).map_err(|err| Error::PathTraversal {
            path: glob.to_string(),
            reason: format!("invalid glob pattern: {err}"),
        })?)
    };

    let contents = layout.contents_dir(&session.dir_name());
    let mut matches = Vec::new();
    let mut total = 0usize;

    'walk: for entry in WalkDir::new(&target).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            if err.io_error().map(std::io::Error::kind) == Some(std::io::ErrorKind::NotFound) {
                Error::PathNotFound {
                    path: relative.to_string(),
                }
            } else {
                Error::io("walking workspace contents", err.into())
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        check_deadline(deadline, config)?;

        if let Some(filter) = &name_filter {
            let base = entry.file_name().to_string_lossy();
            if !filter.matches(&base) {
                continue;
            }
        }

        let rel = relative_name(&contents, entry.path());
        // Unreadable or non-text files are skipped, not fatal.
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);

        for (index, line) in text.lines().enumerate() {
            if index % 1024 == 0 {
                check_deadline(deadline, config)?;
            }
            if regex.is_match(line) {
                total += 1;
                matches.push(GrepMatch {
                    file: rel.clone(),
                    line_number: index + 1,
                    line_content: line.to_string(),
                });
                if max_results > 0 && matches.len() >= max_results {
                    break 'walk;
                }
            }
        }
    }

    Ok((matches, total))
}

fn check_deadline(deadline: Instant, config: &Config) -> Result<(), Error> {
    if Instant::now() >= deadline {
        return Err(Error::LimitExceeded {
            what: format!(
                "grep exceeded its {}ms budget",
                config.security.regex_timeout_ms
            ),
        });
    }
    Ok(())
}

fn relative_name(contents: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(contents).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
