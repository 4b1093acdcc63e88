//! Session log records: one file per prompt/response exchange.
//!
//! A record is created `pending` before the agent starts, moves to
//! `streaming` on the first progress flush and ends `completed` or `error`.
//! Terminal records are never written again.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::events::AgentEvent;

use super::{iso_timestamp, read_json, validate_name, write_json_atomic};

/// Per-project file holding the thread collection; never a log record.
pub(super) const THREADS_FILE: &str = "threads.json";
const LOG_FILE_EXT: &str = "json";
/// Collision suffixes tried for one millisecond before giving up.
const MAX_ID_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Streaming,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one prompt and the agent run it triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub id: String,
    pub project: String,
    pub prompt: String,
    /// JSON text of the terminal result event, or empty.
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<AgentEvent>>,
    pub exit_code: i32,
    /// Wall-clock run time in milliseconds.
    pub duration: u64,
    pub timestamp: String,
    pub status: SessionStatus,
}

impl SessionLog {
    /// Move to the terminal state described by `completion`. Earlier
    /// assistant text is kept when the completion carries none.
    pub fn apply_completion(&mut self, completion: LogCompletion) {
        self.response = completion.response;
        if completion.assistant_text.is_some() {
            self.assistant_text = completion.assistant_text;
        }
        self.events = Some(completion.events);
        self.exit_code = completion.exit_code;
        self.duration = completion.duration;
        self.status = if completion.completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Error
        };
    }
}

/// Snapshot written by an opportunistic flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogProgress {
    pub assistant_text: Option<String>,
    pub events: Vec<AgentEvent>,
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LogCompletion {
    pub response: String,
    pub assistant_text: Option<String>,
    pub events: Vec<AgentEvent>,
    pub exit_code: i32,
    pub duration: u64,
    pub completed: bool,
}

/// Filesystem-backed session log storage rooted at `<root>/logs`.
#[derive(Debug, Clone)]
pub struct SessionLogStore {
    logs_dir: PathBuf,
}

impl SessionLogStore {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Directory holding one project's logs and thread collection.
    pub fn project_dir(&self, project: &str) -> Result<PathBuf, StoreError> {
        validate_name("project", project)?;
        Ok(self.logs_dir.join(project))
    }

    /// Create the `pending` record for a new run.
    pub fn create_pending(&self, project: &str, prompt: &str) -> Result<SessionLog, StoreError> {
        self.create_pending_at(project, prompt, Utc::now())
    }

    /// Like [`Self::create_pending`] with an explicit creation time.
    ///
    /// Ids derive from the timestamp; a record already holding that id gets
    /// a zero-padded `-NNN` suffix so ids stay unique and sort in creation
    /// order.
    pub fn create_pending_at(
        &self,
        project: &str,
        prompt: &str,
        at: DateTime<Utc>,
    ) -> Result<SessionLog, StoreError> {
        let dir = self.project_dir(project)?;
        fs::create_dir_all(&dir)?;

        let timestamp = iso_timestamp(at);
        let base_id = timestamp.replace([':', '.'], "-");
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = if attempt == 0 {
                base_id.clone()
            } else {
                format!("{base_id}-{attempt:03}")
            };
            let path = dir.join(format!("{id}.{LOG_FILE_EXT}"));
            // `create_new` reserves the id even against a concurrent writer.
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            };
            let log = SessionLog {
                id,
                project: project.to_string(),
                prompt: prompt.to_string(),
                response: String::new(),
                assistant_text: None,
                events: None,
                exit_code: 0,
                duration: 0,
                timestamp,
                status: SessionStatus::Pending,
            };
            file.write_all(&serde_json::to_vec_pretty(&log)?)?;
            file.sync_all()?;
            return Ok(log);
        }
        Err(StoreError::InvalidName(format!(
            "no free log id for {base_id} in project {project}"
        )))
    }

    /// Record streaming progress and mark the log `streaming`.
    ///
    /// A snapshot holding fewer events than the stored one is ignored, so
    /// the persisted event list only ever grows.
    pub fn flush_progress(
        &self,
        project: &str,
        id: &str,
        progress: &LogProgress,
    ) -> Result<(), StoreError> {
        let path = self.log_path(project, id)?;
        let mut log = self.load_existing(project, id)?;
        if log.status.is_terminal() {
            return Err(StoreError::Finalized(id.to_string()));
        }
        let stored_events = log.events.as_ref().map_or(0, Vec::len);
        if progress.events.len() < stored_events {
            return Ok(());
        }
        log.assistant_text = progress.assistant_text.clone();
        log.events = Some(progress.events.clone());
        log.status = SessionStatus::Streaming;
        write_json_atomic(&path, &log)
    }

    /// Write the terminal state of a run.
    pub fn finalize(
        &self,
        project: &str,
        id: &str,
        completion: LogCompletion,
    ) -> Result<SessionLog, StoreError> {
        let path = self.log_path(project, id)?;
        let mut log = self.load_existing(project, id)?;
        if log.status.is_terminal() {
            return Err(StoreError::Finalized(id.to_string()));
        }
        log.apply_completion(completion);
        write_json_atomic(&path, &log)?;
        Ok(log)
    }

    pub fn get(&self, project: &str, id: &str) -> Result<Option<SessionLog>, StoreError> {
        let path = self.log_path(project, id)?;
        read_json(&path)
    }

    /// Log ids of a project in ascending (creation) order.
    pub fn list(&self, project: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.project_dir(project)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_FILE_EXT) {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(THREADS_FILE) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Records still `pending` or `streaming`: runs that ended abnormally or
    /// are in flight. Unreadable records are skipped.
    pub fn list_unfinished(&self, project: &str) -> Result<Vec<SessionLog>, StoreError> {
        let mut unfinished = Vec::new();
        for id in self.list(project)? {
            match self.get(project, &id) {
                Ok(Some(log)) if !log.status.is_terminal() => unfinished.push(log),
                Ok(_) => {}
                Err(err) => tracing::warn!(project, id = %id, error = %err, "skipping unreadable log"),
            }
        }
        Ok(unfinished)
    }

    fn log_path(&self, project: &str, id: &str) -> Result<PathBuf, StoreError> {
        validate_name("log id", id)?;
        Ok(self.project_dir(project)?.join(format!("{id}.{LOG_FILE_EXT}")))
    }

    fn load_existing(&self, project: &str, id: &str) -> Result<SessionLog, StoreError> {
        self.get(project, id)?
            .ok_or_else(|| StoreError::NotFound(format!("log {project}/{id}")))
    }
}
