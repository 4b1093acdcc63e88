//! Durable state under `<root>/logs/<project>/`.
//!
//! Every record is a pretty-printed JSON file. Writes go to a sibling
//! temporary file first and are renamed into place, so readers only ever
//! see a complete record.

pub mod logs;
pub mod projects;
pub mod threads;

use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub use logs::{LogCompletion, LogProgress, SessionLog, SessionLogStore, SessionStatus};
pub use projects::{create_project, list_projects};
pub use threads::{ThreadDetail, ThreadMeta, ThreadRegistry};

/// Reject names that are unsafe as a single path segment.
///
/// Projects, log ids and thread ids all share the `[A-Za-z0-9_-]+` shape.
pub fn validate_name(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidName(format!("{kind} cannot be empty")));
    }
    if name
        .chars()
        .any(|ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
    {
        return Err(StoreError::InvalidName(format!(
            "{kind} `{name}` can only contain ASCII letters, numbers, '-', '_'"
        )));
    }
    Ok(())
}

/// ISO-8601 UTC timestamp with millisecond precision (`...T12:00:00.123Z`).
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}

/// Serialize `value` and move it into place at `path`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read and parse a JSON file. A missing file is `Ok(None)`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Per-process counter to avoid temp-dir name collisions in fast test runs.
    static NEXT_TMP_ID: AtomicU64 = AtomicU64::new(1);

    /// Fresh, empty directory under the system temp dir.
    pub(crate) fn temp_root(label: &str) -> PathBuf {
        let unique = NEXT_TMP_ID.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "agentbox-{label}-{}-{unique}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).expect("temp root should be creatable");
        root
    }
}
