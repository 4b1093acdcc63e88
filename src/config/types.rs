//! Configuration data model.
//!
//! Struct/enum definitions plus default values. Loading and precedence live
//! in `loader`, `sources`, and `env`.

use serde::Deserialize;
use std::path::PathBuf;

use super::defaults::{
    DEFAULT_CONTAINER_COMMAND, DEFAULT_CPUS, DEFAULT_FLUSH_CHAR_THRESHOLD,
    DEFAULT_FLUSH_EVENT_THRESHOLD, DEFAULT_IMAGE, DEFAULT_LOG_LEVEL, DEFAULT_MEMORY,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub container: ContainerConfig,
    pub run: RunDefaults,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Host directory layout. Every path is derived from `root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

impl PathsConfig {
    /// The same layout with `root` resolved against the working directory.
    /// Bind mounts need absolute host paths.
    pub fn absolute(&self) -> std::io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(&self.root)?,
        })
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.root.join("notes")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Build context holding the agent image's `Dockerfile`.
    pub fn container_context_dir(&self) -> PathBuf {
        self.root.join("container")
    }

    /// Local secret file consulted when the credential is not in the environment.
    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn project_workspace(&self, project: &str) -> PathBuf {
        self.workspace_dir().join(project)
    }

    pub fn project_notes(&self, project: &str) -> PathBuf {
        self.notes_dir().join(project)
    }

    pub fn project_state(&self, project: &str) -> PathBuf {
        self.state_dir().join(project)
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Runtime CLI invoked for `system`, `image`, `build`, and `run`.
    pub command: String,
    pub image: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CONTAINER_COMMAND.to_string(),
            image: DEFAULT_IMAGE.to_string(),
        }
    }
}

/// Per-run defaults applied when a request leaves an option unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    pub cpus: u32,
    pub memory: String,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_CPUS,
            memory: DEFAULT_MEMORY.to_string(),
            model: None,
            timeout_secs: None,
        }
    }
}

/// Opportunistic flush thresholds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub flush_char_threshold: usize,
    pub flush_event_threshold: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            flush_char_threshold: DEFAULT_FLUSH_CHAR_THRESHOLD,
            flush_event_threshold: DEFAULT_FLUSH_EVENT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Configuration payload plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: super::ConfigSource,
}
