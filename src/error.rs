//! Unified error types for the session engine.

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the session log store and thread registry.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A project, log, or thread name that is unsafe to use as a path segment.
    InvalidName(String),
    /// The referenced record does not exist.
    NotFound(String),
    /// The record already reached a terminal status and cannot change.
    Finalized(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "json: {e}"),
            Self::InvalidName(msg) => write!(f, "invalid name: {msg}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Finalized(id) => write!(f, "log {id} is already finalized"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

// ---------------------------------------------------------------------------
// SetupError
// ---------------------------------------------------------------------------

/// Fatal errors raised while preparing or launching an agent process.
#[derive(Debug)]
pub enum SetupError {
    /// No agent credential in the environment or the local secret file.
    MissingCredential(String),
    /// The container runtime is not running and could not be started.
    RuntimeUnavailable(String),
    /// Building the agent image failed.
    ImageBuild(String),
    /// The subprocess could not be spawned.
    Spawn(String),
    Io(std::io::Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential(msg) => write!(f, "missing credential: {msg}"),
            Self::RuntimeUnavailable(msg) => write!(f, "container runtime unavailable: {msg}"),
            Self::ImageBuild(msg) => write!(f, "image build failed: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn failed: {msg}"),
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for SetupError {}

impl From<std::io::Error> for SetupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Top-level error for a run request.
///
/// Only raised before streaming begins; everything after that is reflected
/// in the persisted record's status instead.
#[derive(Debug)]
pub enum EngineError {
    Setup(SetupError),
    Store(StoreError),
    /// The request itself was malformed (empty prompt, unknown thread, ...).
    InvalidRequest(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(e) => write!(f, "setup: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<SetupError> for EngineError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
