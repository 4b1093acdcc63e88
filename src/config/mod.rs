//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`AGENTBOX_ROOT`, `AGENTBOX_CONTAINER_COMMAND`,
//!    `AGENTBOX_IMAGE`, `AGENTBOX_MODEL`, `AGENTBOX_TIMEOUT_SECS`,
//!    `AGENTBOX_LOG_LEVEL`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./agentbox.toml in the current directory
//! 4. $XDG_CONFIG_HOME/agentbox/agentbox.toml (or ~/.config/agentbox/agentbox.toml)
//! 5. Built-in defaults

mod defaults;
mod env;
mod loader;
mod sources;
mod types;

pub use loader::{load_config, load_config_with_source};
pub use sources::{config_root_dir, ConfigSource};
pub use types::{
    Config, ContainerConfig, LoadedConfig, LoggingConfig, PathsConfig, PersistenceConfig,
    RunDefaults,
};

#[cfg(test)]
mod tests {
    use super::defaults::{DEFAULT_FLUSH_CHAR_THRESHOLD, DEFAULT_FLUSH_EVENT_THRESHOLD};
    use super::loader::load_config_from_sources;
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn load_with(
        files: &[(&str, &str)],
        env: &[(&str, &str)],
        path_override: Option<&str>,
    ) -> Result<LoadedConfig, crate::error::ConfigError> {
        let files: HashMap<PathBuf, String> = files
            .iter()
            .map(|(path, text)| (PathBuf::from(path), text.to_string()))
            .collect();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_config_from_sources(
            path_override,
            |path: &Path| {
                files.get(path).cloned().ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing")
                })
            },
            |name| env.get(name).cloned(),
            || Some(PathBuf::from("/home/test/.config")),
        )
    }

    #[test]
    fn defaults_are_sensible() {
        let c = Config::default();
        assert_eq!(c.paths.root, PathBuf::from("."));
        assert_eq!(c.container.command, "container");
        assert_eq!(c.container.image, "claude-dev-env");
        assert_eq!(c.run.cpus, 4);
        assert_eq!(c.run.memory, "4g");
        assert!(c.run.model.is_none());
        assert!(c.run.timeout_secs.is_none());
        assert_eq!(c.persistence.flush_char_threshold, DEFAULT_FLUSH_CHAR_THRESHOLD);
        assert_eq!(c.persistence.flush_event_threshold, DEFAULT_FLUSH_EVENT_THRESHOLD);
        assert_eq!(c.logging.level, "info");
    }

    #[test]
    fn directory_layout_derives_from_root() {
        let paths = PathsConfig {
            root: PathBuf::from("/srv/box"),
        };
        assert_eq!(paths.project_workspace("demo"), PathBuf::from("/srv/box/workspace/demo"));
        assert_eq!(paths.project_notes("demo"), PathBuf::from("/srv/box/notes/demo"));
        assert_eq!(paths.project_state("demo"), PathBuf::from("/srv/box/state/demo"));
        assert_eq!(paths.logs_dir(), PathBuf::from("/srv/box/logs"));
        assert_eq!(paths.env_file(), PathBuf::from("/srv/box/.env"));
        assert_eq!(paths.container_context_dir(), PathBuf::from("/srv/box/container"));
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let loaded = load_with(&[], &[], None).expect("load");
        assert_eq!(loaded.source, ConfigSource::BuiltInDefaults);
        assert_eq!(loaded.config.run.cpus, 4);
    }

    #[test]
    fn loaded_root_is_absolute() {
        let cwd = std::env::current_dir().expect("cwd");
        let loaded = load_with(&[], &[], None).expect("load");
        assert!(loaded.config.paths.root.is_absolute());
        assert!(loaded.config.paths.root.starts_with(&cwd));

        let loaded = load_with(&[("agentbox.toml", "[paths]\nroot = \"data/box\"\n")], &[], None)
            .expect("load");
        assert_eq!(loaded.config.paths.root, cwd.join("data/box"));
    }

    #[test]
    fn local_file_beats_global_file() {
        let loaded = load_with(
            &[
                ("agentbox.toml", "[run]\ncpus = 2\n"),
                (
                    "/home/test/.config/agentbox/agentbox.toml",
                    "[run]\ncpus = 8\n",
                ),
            ],
            &[],
            None,
        )
        .expect("load");
        assert_eq!(loaded.source, ConfigSource::Local);
        assert_eq!(loaded.config.run.cpus, 2);
    }

    #[test]
    fn global_file_is_used_when_no_local_file() {
        let loaded = load_with(
            &[(
                "/home/test/.config/agentbox/agentbox.toml",
                "[container]\nimage = \"custom\"\n",
            )],
            &[],
            None,
        )
        .expect("load");
        assert!(matches!(loaded.source, ConfigSource::Global(_)));
        assert_eq!(loaded.config.container.image, "custom");
        assert_eq!(loaded.config.container.command, "container");
    }

    #[test]
    fn explicit_path_must_exist() {
        let err = load_with(&[], &[], Some("/nope/agentbox.toml")).expect_err("must fail");
        assert!(err.to_string().starts_with("io:"), "got: {err}");
    }

    #[test]
    fn env_overrides_win_over_file() {
        let loaded = load_with(
            &[(
                "agentbox.toml",
                "[paths]\nroot = \"/from/file\"\n[run]\nmodel = \"file-model\"\n",
            )],
            &[
                ("AGENTBOX_ROOT", "/from/env"),
                ("AGENTBOX_MODEL", "env-model"),
                ("AGENTBOX_TIMEOUT_SECS", "90"),
                ("AGENTBOX_CONTAINER_COMMAND", "docker"),
            ],
            None,
        )
        .expect("load");
        let c = loaded.config;
        assert_eq!(c.paths.root, PathBuf::from("/from/env"));
        assert_eq!(c.run.model.as_deref(), Some("env-model"));
        assert_eq!(c.run.timeout_secs, Some(90));
        assert_eq!(c.container.command, "docker");
    }

    #[test]
    fn zero_timeout_env_means_no_timeout() {
        let loaded = load_with(&[], &[("AGENTBOX_TIMEOUT_SECS", "0")], None).expect("load");
        assert!(loaded.config.run.timeout_secs.is_none());
    }

    #[test]
    fn invalid_timeout_env_is_rejected() {
        let err = load_with(&[], &[("AGENTBOX_TIMEOUT_SECS", "soon")], None).expect_err("must fail");
        assert!(err.to_string().contains("AGENTBOX_TIMEOUT_SECS"), "got: {err}");
    }

    #[test]
    fn zero_flush_threshold_is_rejected() {
        let err = load_with(
            &[("agentbox.toml", "[persistence]\nflush_event_threshold = 0\n")],
            &[],
            None,
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("flush thresholds"), "got: {err}");
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = load_with(&[("agentbox.toml", "[run\n")], &[], None).expect_err("must fail");
        assert!(err.to_string().starts_with("toml:"), "got: {err}");
    }
}
