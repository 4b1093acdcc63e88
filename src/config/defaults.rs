//! Default configuration constants.
//!
//! Keeping defaults in one module means tests, loader, and engine share the
//! same literals.

/// Config file name looked up locally and under the user config dir.
pub(super) const CONFIG_FILE_NAME: &str = "agentbox.toml";
/// Per-user config directory name.
pub(super) const CONFIG_DIR_NAME: &str = "agentbox";
/// Container runtime CLI.
pub(super) const DEFAULT_CONTAINER_COMMAND: &str = "container";
/// Image the agent runs in.
pub(super) const DEFAULT_IMAGE: &str = "claude-dev-env";
/// CPU count handed to each agent container.
pub(super) const DEFAULT_CPUS: u32 = 4;
/// Memory ceiling handed to each agent container.
pub(super) const DEFAULT_MEMORY: &str = "4g";
/// New assistant characters that trigger an opportunistic flush.
pub(super) const DEFAULT_FLUSH_CHAR_THRESHOLD: usize = 500;
/// New events that trigger an opportunistic flush.
pub(super) const DEFAULT_FLUSH_EVENT_THRESHOLD: usize = 10;
/// Fallback tracing filter when `RUST_LOG` is unset.
pub(super) const DEFAULT_LOG_LEVEL: &str = "info";
