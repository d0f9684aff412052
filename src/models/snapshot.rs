//! Snapshot references encoded in blob names.

use chrono::{DateTime, Utc};

const SNAPSHOT_PARAM: &str = "?snapshot=";

/// A blob name split into its base name and snapshot token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub name: String,
    pub snapshot: String,
}

impl SnapshotRef {
    /// Splits `name?snapshot=<timestamp>`. The token must parse as a timestamp.
    pub fn parse(name: &str) -> Option<Self> {
        let (base, token) = name.rsplit_once(SNAPSHOT_PARAM)?;
        if base.contains(SNAPSHOT_PARAM) || parse_snapshot_time(token).is_none() {
            return None;
        }
        Some(Self {
            name: base.to_string(),
            snapshot: token.to_string(),
        })
    }
}

/// Whether the name carries a snapshot reference.
pub fn blob_is_snapshot(name: &str) -> bool {
    SnapshotRef::parse(name).is_some()
}

/// Splits a name into `(base name, snapshot)`; the snapshot is `None` for
/// plain names.
pub fn split_snapshot(name: &str) -> (String, Option<String>) {
    match SnapshotRef::parse(name) {
        Some(r) => (r.name, Some(r.snapshot)),
        None => (name.to_string(), None),
    }
}

fn parse_snapshot_time(token: &str) -> Option<DateTime<Utc>> {
    // Azure snapshot format: 2024-01-27T12:34:56.1234567Z
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S%.fZ")
                .ok()
                .map(|dt| dt.and_utc())
        })
}
