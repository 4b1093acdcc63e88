//! Environment overrides.
//!
//! `AGENTBOX_*` variables win over every file-based source.

use std::path::PathBuf;

use crate::error::ConfigError;

use super::Config;

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(root) = non_empty(env_lookup, "AGENTBOX_ROOT") {
        config.paths.root = PathBuf::from(root);
    }
    if let Some(command) = non_empty(env_lookup, "AGENTBOX_CONTAINER_COMMAND") {
        config.container.command = command;
    }
    if let Some(image) = non_empty(env_lookup, "AGENTBOX_IMAGE") {
        config.container.image = image;
    }
    if let Some(model) = non_empty(env_lookup, "AGENTBOX_MODEL") {
        config.run.model = Some(model);
    }
    if let Some(timeout) = non_empty(env_lookup, "AGENTBOX_TIMEOUT_SECS") {
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid AGENTBOX_TIMEOUT_SECS value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        // Zero would kill every run immediately; treat it as "no timeout".
        config.run.timeout_secs = (parsed > 0).then_some(parsed);
    }
    if let Some(level) = non_empty(env_lookup, "AGENTBOX_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

/// Reject values that would leave the engine unable to run.
pub(super) fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.container.command.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "container.command must not be empty".to_string(),
        ));
    }
    if config.container.image.trim().is_empty() {
        return Err(ConfigError::Invalid("container.image must not be empty".to_string()));
    }
    if config.run.cpus == 0 {
        return Err(ConfigError::Invalid("run.cpus must be at least 1".to_string()));
    }
    if config.run.memory.trim().is_empty() {
        return Err(ConfigError::Invalid("run.memory must not be empty".to_string()));
    }
    if config.persistence.flush_char_threshold == 0 || config.persistence.flush_event_threshold == 0
    {
        return Err(ConfigError::Invalid(
            "persistence flush thresholds must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn non_empty<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
