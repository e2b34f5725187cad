//! Pure validators for user-supplied names, paths, and glob patterns.

use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// Maximum length of a session name.
pub const MAX_SESSION_NAME_LEN: usize = 64;

/// Validates a session name: non-empty, at most 64 characters, every
/// character in `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns [`Error::InvalidSessionName`] naming the broken rule. Performs
/// no I/O.
pub fn validate_session_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(invalid_name(name, "must not be empty"));
    }
    if name.len() > MAX_SESSION_NAME_LEN {
        return Err(invalid_name(
            name,
            format!("exceeds maximum length of {MAX_SESSION_NAME_LEN} characters"),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(invalid_name(
            name,
            "must contain only alphanumeric characters, hyphens, and underscores",
        ));
    }
    Ok(())
}

/// Validates a user-supplied path relative to a workspace `contents/`
/// tree: non-empty, relative, free of NUL and control characters, and,
/// after lexical normalization, neither beginning with `..` nor holding a
/// `..` component anywhere.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] naming the failed check. Performs no
/// I/O.
pub fn validate_relative_path(path: &str) -> Result<(), Error> {
    structural_checks(path)?;

    if lexical_clean(Path::new(path)).starts_with("..") {
        return Err(traversal(path, "escapes the workspace after normalization"));
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(traversal(path, "contains a \"..\" component"));
    }
    Ok(())
}

/// Validates a glob pattern with the same structural rules as a relative
/// path; wildcard metacharacters are ordinary characters here.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] naming the failed check. Performs no
/// I/O.
pub fn validate_glob_pattern(pattern: &str) -> Result<(), Error> {
    structural_checks(pattern)?;

    if Path::new(pattern)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(traversal(pattern, "contains a \"..\" component"));
    }
    if pattern.starts_with("../") || pattern.starts_with("..\\") {
        return Err(traversal(pattern, "escapes the workspace"));
    }
    Ok(())
}

/// Lexically normalizes a relative path: drops `.` components and resolves
/// `..` against preceding normal components, keeping any unmatched leading
/// `..` so callers can detect escapes.
#[must_use]
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn structural_checks(path: &str) -> Result<(), Error> {
    if path.is_empty() {
        return Err(traversal(path, "must not be empty"));
    }
    if Path::new(path).is_absolute() {
        return Err(traversal(path, "must be relative"));
    }
    if path.bytes().any(|b| b == 0) {
        return Err(traversal(path, "contains a NUL byte"));
    }
    if path.chars().any(|c| c < '\u{20}' || c == '\u{7f}') {
        return Err(traversal(path, "contains a control character"));
    }
    Ok(())
}

fn traversal(path: &str, reason: impl Into<String>) -> Error {
    Error::PathTraversal {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn invalid_name(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidSessionName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for name in ["r", "report", "a-b_c", "A0", &"x".repeat(64)] {
            assert!(validate_session_name(name).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn rejects_bad_names_before_any_io() {
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("name with spaces").is_err());
        assert!(validate_session_name(&"x".repeat(65)).is_err());
        assert!(validate_session_name("a/b").is_err());
        assert!(validate_session_name("dot.dot").is_err());
    }

    #[test]
    fn accepts_ordinary_relative_paths() {
        for path in ["a.txt", "data/records.csv", "deep/er/still", "./ok"] {
            assert!(validate_relative_path(path).is_ok(), "{path:?}");
        }
    }

    #[test]
    fn rejects_structural_hazards() {
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("has\u{0}nul").is_err());
        assert!(validate_relative_path("has\nnewline").is_err());
        assert!(validate_relative_path("del\u{7f}ete").is_err());
    }

    #[test]
    fn rejects_traversal_in_any_position() {
        for path in ["..", "../x", "a/../../x", "a/..", "a/../b/.."] {
            let err = validate_relative_path(path).unwrap_err();
            assert_eq!(
                err.code(),
                Some(crate::error::ErrorCode::PathTraversal),
                "{path:?}"
            );
        }
    }

    #[test]
    fn glob_metacharacters_are_ordinary() {
        for pattern in ["*.csv", "data/**/*.txt", "file?.rs", "[ab]*"] {
            assert!(validate_glob_pattern(pattern).is_ok(), "{pattern:?}");
        }
        assert!(validate_glob_pattern("../*.csv").is_err());
        assert!(validate_glob_pattern("a/../*.csv").is_err());
        assert!(validate_glob_pattern("/abs/*.csv").is_err());
    }

    #[test]
    fn lexical_clean_resolves_inner_dots() {
        assert_eq!(lexical_clean(Path::new("a/./b")), Path::new("a/b"));
        assert_eq!(lexical_clean(Path::new("a/x/../b")), Path::new("a/b"));
        assert_eq!(lexical_clean(Path::new("../a")), Path::new("../a"));
        assert_eq!(lexical_clean(Path::new("a/../../b")), Path::new("../b"));
    }
}
