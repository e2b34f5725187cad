//! Session records and their on-disk store.
//!
//! A session is exclusively owned by its workspace directory; in-memory
//! handles are transient and re-read `metadata.json` after any operation
//! that may have persisted changes concurrently.

mod store;

pub use store::{
    create, delete, get, list, load, prune_older_than, resolve, touch, update,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a session.
///
/// `Syncing` observed by a new operation means a prior sync was
/// interrupted; loading such a session triggers automatic repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Normal state; reads, writes, and sync may proceed.
    Open,
    /// A sync is in flight (or was interrupted).
    Syncing,
}

/// The central session record, serialized as `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable unique identifier.
    pub id: Uuid,
    /// Optional human name; empty string when unnamed.
    pub name: String,
    /// Absolute path of the source archive.
    pub source_path: std::path::PathBuf,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-accessed timestamp, bumped by any read/write/sync.
    pub last_accessed_at: DateTime<Utc>,
    /// Timestamp of the last successful sync, if any.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Lifecycle state.
    pub state: SessionState,
    /// Hex-encoded SHA-256 of the source archive captured at open time.
    pub zip_hash_sha256: String,
    /// Total uncompressed bytes materialized at open time.
    pub extracted_size_bytes: u64,
    /// Number of file entries materialized at open time.
    pub file_count: usize,
    /// Diagnostic note attached by load-time repair of an interrupted
    /// sync. Never serialized.
    #[serde(skip)]
    pub recovery_note: Option<String>,
}

impl Session {
    /// The workspace directory name: the human name when present,
    /// otherwise the textual form of the identifier.
    #[must_use]
    pub fn dir_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Session {
        Session {
            id: Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").expect("uuid"),
            name: String::new(),
            source_path: "/tmp/report.zip".into(),
            created_at: "2026-01-05T10:00:00Z".parse().expect("ts"),
            last_accessed_at: "2026-01-05T10:05:00Z".parse().expect("ts"),
            last_synced_at: None,
            state: SessionState::Open,
            zip_hash_sha256: "00".repeat(32),
            extracted_size_bytes: 11,
            file_count: 2,
            recovery_note: None,
        }
    }

    #[test]
    fn dir_name_prefers_the_human_name() {
        let mut session = sample();
        assert_eq!(session.dir_name(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
        session.name = "report".to_string();
        assert_eq!(session.dir_name(), "report");
    }

    #[test]
    fn wire_format_matches_the_metadata_schema() {
        let json = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(json["id"], "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert_eq!(json["name"], "");
        assert_eq!(json["source_path"], "/tmp/report.zip");
        assert_eq!(json["state"], "open");
        assert_eq!(json["last_synced_at"], serde_json::Value::Null);
        assert_eq!(json["extracted_size_bytes"], 11);
        assert_eq!(json["file_count"], 2);
        assert!(json["created_at"].as_str().expect("str").contains('T'));
        assert!(json.get("recovery_note").is_none(), "never serialized");
    }

    #[test]
    fn state_round_trips_through_its_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionState::Open).expect("ser"),
            "\"open\""
        );
        assert_eq!(
            serde_json::from_str::<SessionState>("\"syncing\"").expect("de"),
            SessionState::Syncing
        );
    }
}
