//! Thread registry: the per-project `threads.json` collection.
//!
//! Every mutation reads the whole collection, edits one thread and writes
//! the whole collection back. Writers inside this process are serialized;
//! separate processes writing the same project are last-write-wins.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

use super::logs::{SessionLog, SessionLogStore, THREADS_FILE};
use super::{now_iso, read_json, validate_name, write_json_atomic};

/// A conversation: an ordered list of session logs sharing one resumption
/// token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMeta {
    pub id: String,
    pub title: String,
    /// Opaque resumption token, not a log id.
    pub session_id: Option<String>,
    pub log_ids: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A thread with every log it references that could still be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadDetail {
    pub thread: ThreadMeta,
    pub logs: Vec<SessionLog>,
}

#[derive(Debug)]
pub struct ThreadRegistry {
    logs: SessionLogStore,
    write_lock: Mutex<()>,
}

impl ThreadRegistry {
    pub fn new(logs: SessionLogStore) -> Self {
        Self {
            logs,
            write_lock: Mutex::new(()),
        }
    }

    /// Threads sorted by most recently updated first.
    pub fn list(&self, project: &str) -> Result<Vec<ThreadMeta>, StoreError> {
        let mut threads = self.read_threads(project)?;
        threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(threads)
    }

    pub fn get(&self, project: &str, id: &str) -> Result<Option<ThreadMeta>, StoreError> {
        Ok(self
            .read_threads(project)?
            .into_iter()
            .find(|thread| thread.id == id))
    }

    /// Create an empty thread with a fresh `thr_<millis>` id.
    pub fn create(&self, project: &str, title: &str) -> Result<ThreadMeta, StoreError> {
        let _guard = self.lock();
        let mut threads = self.read_threads(project)?;

        let base_id = format!("thr_{}", Utc::now().timestamp_millis());
        let mut id = base_id.clone();
        let mut suffix = 1;
        while threads.iter().any(|thread| thread.id == id) {
            id = format!("{base_id}-{suffix}");
            suffix += 1;
        }

        let now = now_iso();
        let thread = ThreadMeta {
            id,
            title: title.to_string(),
            session_id: None,
            log_ids: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        threads.push(thread.clone());
        self.write_threads(project, &threads)?;
        Ok(thread)
    }

    /// Append a log reference and bump `updatedAt`.
    pub fn append_log(
        &self,
        project: &str,
        id: &str,
        log_id: &str,
    ) -> Result<ThreadMeta, StoreError> {
        validate_name("log id", log_id)?;
        self.update(project, id, |thread| {
            thread.log_ids.push(log_id.to_string());
            thread.updated_at = now_iso();
        })
    }

    /// Replace the resumption token. Does not bump `updatedAt`.
    pub fn set_token(
        &self,
        project: &str,
        id: &str,
        token: &str,
    ) -> Result<ThreadMeta, StoreError> {
        self.update(project, id, |thread| {
            thread.session_id = Some(token.to_string());
        })
    }

    pub fn rename(&self, project: &str, id: &str, title: &str) -> Result<ThreadMeta, StoreError> {
        self.update(project, id, |thread| {
            thread.title = title.to_string();
            thread.updated_at = now_iso();
        })
    }

    /// The thread plus its logs in conversation order. Logs that are
    /// missing or unreadable are left out.
    pub fn detail(&self, project: &str, id: &str) -> Result<Option<ThreadDetail>, StoreError> {
        let Some(thread) = self.get(project, id)? else {
            return Ok(None);
        };
        let logs = thread
            .log_ids
            .iter()
            .filter_map(|log_id| match self.logs.get(project, log_id) {
                Ok(log) => log,
                Err(err) => {
                    tracing::debug!(project, log_id = %log_id, error = %err, "omitting unreadable log");
                    None
                }
            })
            .collect();
        Ok(Some(ThreadDetail { thread, logs }))
    }

    fn update<F>(&self, project: &str, id: &str, edit: F) -> Result<ThreadMeta, StoreError>
    where
        F: FnOnce(&mut ThreadMeta),
    {
        let _guard = self.lock();
        let mut threads = self.read_threads(project)?;
        let thread = threads
            .iter_mut()
            .find(|thread| thread.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("thread {project}/{id}")))?;
        edit(thread);
        let updated = thread.clone();
        self.write_threads(project, &threads)?;
        Ok(updated)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn threads_path(&self, project: &str) -> Result<PathBuf, StoreError> {
        Ok(self.logs.project_dir(project)?.join(THREADS_FILE))
    }

    fn read_threads(&self, project: &str) -> Result<Vec<ThreadMeta>, StoreError> {
        Ok(read_json(&self.threads_path(project)?)?.unwrap_or_default())
    }

    fn write_threads(&self, project: &str, threads: &[ThreadMeta]) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.logs.project_dir(project)?)?;
        write_json_atomic(&self.threads_path(project)?, &threads)
    }
}
