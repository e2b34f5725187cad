//! Process-wide configuration.
//!
//! Loaded once at adapter startup from `<data-root>/config.json`, overlaid
//! with environment overrides, and treated as immutable afterwards. Every
//! function that consults a limit receives the configuration explicitly;
//! nothing deeper reads the environment.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::paths::Layout;
use crate::security::SecurityLimits;

/// Environment override for `security.max_extracted_size_bytes`.
pub const MAX_EXTRACTED_SIZE_ENV: &str = "ZIPWS_MAX_EXTRACTED_SIZE";
/// Environment override for `security.max_sessions`.
pub const MAX_SESSIONS_ENV: &str = "ZIPWS_MAX_SESSIONS";
/// Environment override for `security.max_file_count`.
pub const MAX_FILE_COUNT_ENV: &str = "ZIPWS_MAX_FILE_COUNT";
/// Environment override for `security.allow_symlinks`.
pub const ALLOW_SYMLINKS_ENV: &str = "ZIPWS_ALLOW_SYMLINKS";

/// Global configuration: security limits plus operation defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Security limits and constraints.
    pub security: SecurityConfig,
    /// Default values for operations.
    pub defaults: DefaultsConfig,
}

/// Security limits and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Upper bound on total declared and written uncompressed bytes.
    pub max_extracted_size_bytes: u64,
    /// Upper bound on archive entry count.
    pub max_file_count: usize,
    /// Upper bound on any single entry's uncompressed/compressed ratio.
    pub max_compression_ratio: f64,
    /// Upper bound on extracted bytes summed across all live sessions.
    pub max_total_disk_bytes: u64,
    /// Upper bound on concurrent sessions.
    pub max_sessions: usize,
    /// Whether symlink entries are materialized (validated) or skipped.
    pub allow_symlinks: bool,
    /// Wall-clock budget for a grep pattern compile plus scan.
    pub regex_timeout_ms: u64,
}

/// Default values for operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Number of backup generations kept by sync.
    pub backup_rotation_depth: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_extracted_size_bytes: 1024 * 1024 * 1024,
            max_file_count: 100_000,
            max_compression_ratio: 100.0,
            max_total_disk_bytes: 10 * 1024 * 1024 * 1024,
            max_sessions: 32,
            allow_symlinks: false,
            regex_timeout_ms: 5000,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            backup_rotation_depth: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `config.json` under the layout's data root,
    /// falling back to defaults when the file is absent, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed,
    /// or when an override variable holds an unparseable value.
    pub fn load(layout: &Layout) -> Result<Self, Error> {
        let path = layout.config_path();
        let mut config = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::Metadata {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(Error::io(format!("reading {}", path.display()), err)),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Projects the limits consulted by the bomb pre-scan and extractor.
    #[must_use]
    pub fn security_limits(&self) -> SecurityLimits {
        SecurityLimits {
            max_extracted_size_bytes: self.security.max_extracted_size_bytes,
            max_file_count: self.security.max_file_count,
            max_compression_ratio: self.security.max_compression_ratio,
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), Error> {
        if let Some(val) = env_string(MAX_EXTRACTED_SIZE_ENV) {
            self.security.max_extracted_size_bytes =
                parse_env(MAX_EXTRACTED_SIZE_ENV, &val)?;
        }
        if let Some(val) = env_string(MAX_SESSIONS_ENV) {
            self.security.max_sessions = parse_env(MAX_SESSIONS_ENV, &val)?;
        }
        if let Some(val) = env_string(MAX_FILE_COUNT_ENV) {
            self.security.max_file_count = parse_env(MAX_FILE_COUNT_ENV, &val)?;
        }
        if let Some(val) = env_string(ALLOW_SYMLINKS_ENV) {
            self.security.allow_symlinks = match val.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::io(
                        format!("parsing {ALLOW_SYMLINKS_ENV}"),
                        std::io::Error::other(format!("expected a boolean, got {other:?}")),
                    ))
                }
            };
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|err| {
        Error::io(
            format!("parsing {name}"),
            std::io::Error::other(format!("invalid value {val:?}: {err}")),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_schema() {
        let config = Config::default();
        assert_eq!(config.security.max_extracted_size_bytes, 1_073_741_824);
        assert_eq!(config.security.max_file_count, 100_000);
        assert!((config.security.max_compression_ratio - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.security.max_total_disk_bytes, 10_737_418_240);
        assert_eq!(config.security.max_sessions, 32);
        assert!(!config.security.allow_symlinks);
        assert_eq!(config.security.regex_timeout_ms, 5000);
        assert_eq!(config.defaults.backup_rotation_depth, 3);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::at(dir.path());
        let config = Config::load(&layout).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_values_overlay_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "security": { "max_sessions": 4 }, "defaults": { "backup_rotation_depth": 5 } }"#,
        )
        .expect("write config");
        let layout = Layout::at(dir.path());
        let config = Config::load(&layout).expect("load");
        assert_eq!(config.security.max_sessions, 4);
        assert_eq!(config.defaults.backup_rotation_depth, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.security.max_file_count, 100_000);
    }

    #[test]
    fn malformed_file_is_an_error_not_a_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), b"{ not json").expect("write config");
        let layout = Layout::at(dir.path());
        assert!(Config::load(&layout).is_err());
    }

    #[test]
    fn limits_projection_carries_the_security_fields() {
        let mut config = Config::default();
        config.security.max_extracted_size_bytes = 7;
        config.security.max_file_count = 3;
        config.security.max_compression_ratio = 9.0;
        let limits = config.security_limits();
        assert_eq!(limits.max_extracted_size_bytes, 7);
        assert_eq!(limits.max_file_count, 3);
        assert!((limits.max_compression_ratio - 9.0).abs() < f64::EPSILON);
    }
}
