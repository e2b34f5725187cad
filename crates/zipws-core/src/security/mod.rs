//! Input validation and archive pre-scanning.
//!
//! Everything here is fail-closed: a validator either proves an input safe
//! or rejects it with a typed error, and the bomb scan inspects only the
//! central directory; no entry stream is ever decompressed here.

mod bomb;
mod entry_path;
mod sanitize;

pub use bomb::{scan_for_bomb, BombScan, SecurityLimits};
pub use entry_path::{validate_all_entry_paths, validate_entry_path};
pub use sanitize::{
    lexical_clean, validate_glob_pattern, validate_relative_path, validate_session_name,
};
