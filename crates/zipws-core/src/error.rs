//! Typed error surface for the workspace lifecycle engine.
//!
//! Every fallible operation in this crate returns [`Error`]. The variants
//! that participate in the adapter contract expose a stable [`ErrorCode`]
//! via [`Error::code`]; plumbing failures (I/O context, malformed metadata,
//! invalid user input caught before any side effect) carry no code and are
//! rendered through their `Display` chain instead.
//!
//! The core never logs and never prints; it propagates typed errors upward
//! and attaches lower-level causes as sources for diagnostics.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes forming the adapter contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No session matches the given identifier.
    SessionNotFound,
    /// Multiple sessions match; the caller must disambiguate.
    AmbiguousSession,
    /// An empty identifier was given and no sessions exist.
    NoSessions,
    /// The source archive is missing or unreadable.
    ZipNotFound,
    /// The source archive is malformed.
    ZipInvalid,
    /// A pre-scan or runtime extraction limit was exceeded.
    ZipBombDetected,
    /// The source archive hash differs at sync time.
    ConflictDetected,
    /// A non-recoverable sync error occurred.
    SyncFailed,
    /// An input path resolves outside its base.
    PathTraversal,
    /// The path is absent from the workspace.
    PathNotFound,
    /// A lock could not be acquired before the timeout.
    Locked,
    /// A configured limit (session count, disk, scan budget) was exceeded.
    LimitExceeded,
    /// The session name is already in use.
    NameCollision,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::AmbiguousSession => "AMBIGUOUS_SESSION",
            Self::NoSessions => "NO_SESSIONS",
            Self::ZipNotFound => "ZIP_NOT_FOUND",
            Self::ZipInvalid => "ZIP_INVALID",
            Self::ZipBombDetected => "ZIP_BOMB_DETECTED",
            Self::ConflictDetected => "CONFLICT_DETECTED",
            Self::SyncFailed => "SYNC_FAILED",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::PathNotFound => "PATH_NOT_FOUND",
            Self::Locked => "LOCKED",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::NameCollision => "NAME_COLLISION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the workspace lifecycle engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No session matches the given identifier.
    #[error("session {identifier:?} not found")]
    SessionNotFound {
        /// The identifier that failed to resolve.
        identifier: String,
    },

    /// Multiple sessions match the identifier (or no identifier was given
    /// while several sessions are open).
    #[error("{count} sessions match, please specify which one")]
    AmbiguousSession {
        /// Number of candidate sessions.
        count: usize,
    },

    /// An empty identifier was given and no sessions exist.
    #[error("no sessions are open")]
    NoSessions,

    /// The source archive is missing or unreadable.
    #[error("zip file {} not found or not readable", path.display())]
    ZipNotFound {
        /// The missing source path.
        path: PathBuf,
    },

    /// The file is not a parseable zip archive.
    #[error("file {} is not a valid zip archive", path.display())]
    ZipInvalid {
        /// The offending file.
        path: PathBuf,
        /// The underlying parse failure.
        #[source]
        source: zip::result::ZipError,
    },

    /// A pre-scan or runtime extraction limit was exceeded.
    #[error("zip bomb detected: {reason}")]
    ZipBombDetected {
        /// Which limit tripped, with observed and configured values.
        reason: String,
    },

    /// The source archive was modified externally since it was opened.
    #[error("source zip {} has been modified externally since it was opened", path.display())]
    ConflictDetected {
        /// The source archive path.
        path: PathBuf,
    },

    /// A non-recoverable error occurred while syncing the workspace back
    /// over the source archive.
    #[error("failed to sync workspace to zip")]
    SyncFailed {
        /// The underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// An input path resolves outside its base, or fails a structural
    /// safety check (absolute, NUL byte, control characters, `..`).
    #[error("path {path:?} rejected: {reason}")]
    PathTraversal {
        /// The offending path as supplied.
        path: String,
        /// Which check rejected it.
        reason: String,
    },

    /// The path does not exist inside the workspace.
    #[error("path {path:?} not found in workspace")]
    PathNotFound {
        /// The relative path that was looked up.
        path: String,
    },

    /// The session lock is held by another operation.
    #[error("lock on {} is held by another operation", path.display())]
    Locked {
        /// The lock file path.
        path: PathBuf,
    },

    /// A configured limit was exceeded.
    #[error("limit exceeded: {what}")]
    LimitExceeded {
        /// Which limit, with values.
        what: String,
    },

    /// The session name is already used by another workspace directory.
    #[error("session name {name:?} is already in use")]
    NameCollision {
        /// The colliding name.
        name: String,
    },

    /// The session name fails the naming rules. Rejected before any I/O.
    #[error("invalid session name {name:?}: {reason}")]
    InvalidSessionName {
        /// The rejected name.
        name: String,
        /// Which rule it broke.
        reason: String,
    },

    /// A metadata or configuration file exists but cannot be parsed.
    #[error("malformed JSON in {}", path.display())]
    Metadata {
        /// The unparseable file.
        path: PathBuf,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The search pattern does not compile.
    #[error("invalid search pattern {pattern:?}")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// The compile failure.
        #[source]
        source: regex::Error,
    },

    /// An I/O failure with the operation that produced it.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Convenience constructor for I/O errors with context.
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps an error as the cause of a failed sync.
    pub(crate) fn sync_failed(source: Error) -> Self {
        Self::SyncFailed {
            source: Box::new(source),
        }
    }

    /// Returns the contract code for this error, if it carries one.
    ///
    /// Plumbing variants (`Io`, `Metadata`, `InvalidSessionName`,
    /// `InvalidPattern`) return `None`; adapters render those through the
    /// `Display` chain.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::SessionNotFound { .. } => Some(ErrorCode::SessionNotFound),
            Self::AmbiguousSession { .. } => Some(ErrorCode::AmbiguousSession),
            Self::NoSessions => Some(ErrorCode::NoSessions),
            Self::ZipNotFound { .. } => Some(ErrorCode::ZipNotFound),
            Self::ZipInvalid { .. } => Some(ErrorCode::ZipInvalid),
            Self::ZipBombDetected { .. } => Some(ErrorCode::ZipBombDetected),
            Self::ConflictDetected { .. } => Some(ErrorCode::ConflictDetected),
            Self::SyncFailed { .. } => Some(ErrorCode::SyncFailed),
            Self::PathTraversal { .. } => Some(ErrorCode::PathTraversal),
            Self::PathNotFound { .. } => Some(ErrorCode::PathNotFound),
            Self::Locked { .. } => Some(ErrorCode::Locked),
            Self::LimitExceeded { .. } => Some(ErrorCode::LimitExceeded),
            Self::NameCollision { .. } => Some(ErrorCode::NameCollision),
            Self::InvalidSessionName { .. }
            | Self::Metadata { .. }
            | Self::InvalidPattern { .. }
            | Self::Io { .. } => None,
        }
    }

    /// Checks whether this error carries the given contract code.
    #[must_use]
    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.code() == Some(code)
    }
}
