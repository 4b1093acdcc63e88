//! Version metadata embedded by `build.rs`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_COMMIT: &str = env!("AGENTBOX_BUILD_GIT_HASH");

pub const BUILD_TIMESTAMP: &str = env!("AGENTBOX_BUILD_TIMESTAMP");

/// Multi-line block printed by `agentbox --version`.
pub fn version_text() -> String {
    format!("agentbox {VERSION}\ncommit: {GIT_COMMIT}\nbuilt: {BUILD_TIMESTAMP}")
}

/// One-line form used in the startup log record.
pub fn short_version() -> String {
    format!("{VERSION} ({GIT_COMMIT})")
}
