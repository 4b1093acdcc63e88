//! Process supervision for containerized agent runs.
//!
//! [`ContainerSupervisor`] turns a run request into a `container run`
//! invocation, makes sure the runtime and the agent image are ready, and
//! hands back the live output streams plus a completion signal. The
//! [`AgentLauncher`] trait is the seam the engine drives, so tests can stand
//! in any local process for the container.

pub mod credential;
pub mod invocation;
pub mod process;
pub mod readiness;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;

use crate::config::{Config, ContainerConfig, PathsConfig, RunDefaults};
use crate::error::SetupError;

pub use credential::{load_credential, Credential, CREDENTIAL_ENV};
pub use invocation::{Mounts, RunInvocation};
pub use process::{spawn_supervised, AgentProcess, ExitOutcome, KillReason};
pub use readiness::ReadinessGate;

/// Settle time after starting the container system service.
const SYSTEM_START_SETTLE: Duration = Duration::from_secs(2);

/// Per-run options. Unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub model: Option<String>,
    pub resume: Option<String>,
    pub timeout: Option<Duration>,
    pub cpus: Option<u32>,
    pub memory: Option<String>,
}

impl RunOptions {
    /// Fill unset fields from `defaults`.
    pub fn with_defaults(mut self, defaults: &RunDefaults) -> Self {
        self.cpus = self.cpus.or(Some(defaults.cpus));
        if self.memory.is_none() {
            self.memory = Some(defaults.memory.clone());
        }
        if self.model.is_none() {
            self.model = defaults.model.clone();
        }
        if self.timeout.is_none() {
            self.timeout = defaults.timeout_secs.map(Duration::from_secs);
        }
        self
    }
}

/// Starts one agent process for a prompt.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Launch the agent. Errors are setup failures; a process that starts and
    /// later fails is reported through [`AgentProcess::done`] instead.
    async fn launch(
        &self,
        project: &str,
        prompt: &str,
        options: &RunOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<AgentProcess, SetupError>;
}

/// Launches the agent inside a container via the runtime CLI.
///
/// Runtime and image readiness are remembered per process: supervisors built
/// from the same runtime command (and image) share their gates, so the image
/// is built at most once however many engines are created.
#[derive(Debug)]
pub struct ContainerSupervisor {
    paths: PathsConfig,
    container: ContainerConfig,
    defaults: RunDefaults,
    system_ready: Arc<ReadinessGate>,
    image_ready: Arc<ReadinessGate>,
}

impl ContainerSupervisor {
    pub fn new(config: &Config) -> Self {
        let paths = config.paths.absolute().unwrap_or_else(|_| config.paths.clone());
        let container = config.container.clone();
        let system_key = format!("system:{}", container.command);
        let image_key = format!(
            "image:{}:{}:{}",
            container.command,
            container.image,
            paths.container_context_dir().display()
        );
        Self {
            paths,
            defaults: config.run.clone(),
            system_ready: ReadinessGate::shared(&system_key),
            image_ready: ReadinessGate::shared(&image_key),
            container,
        }
    }

    /// Make sure the container system service is running, starting it once
    /// if `system info` fails.
    pub async fn ensure_runtime(&self) -> Result<(), SetupError> {
        self.system_ready
            .ensure(|| async {
                let command = &self.container.command;
                let info = process::run_process(command, &invocation::system_info_args()).await;
                if matches!(&info, Ok(output) if output.exit_code == 0) {
                    return Ok(());
                }
                tracing::info!(command = %command, "container system not running; starting it");
                let started = process::run_process(command, &invocation::system_start_args())
                    .await
                    .map_err(|e| SetupError::RuntimeUnavailable(e.to_string()))?;
                process::ensure_success(started, "system start")
                    .map_err(SetupError::RuntimeUnavailable)?;
                tokio::time::sleep(SYSTEM_START_SETTLE).await;
                Ok(())
            })
            .await
    }

    /// Make sure the agent image exists, building it once if it does not.
    pub async fn ensure_image(&self) -> Result<(), SetupError> {
        self.image_ready
            .ensure(|| async {
                let command = &self.container.command;
                let image = &self.container.image;
                let listing = process::run_process(command, &invocation::image_list_args()).await?;
                let listing = process::ensure_success(listing, "image ls")
                    .map_err(SetupError::RuntimeUnavailable)?;
                if invocation::image_listed(&listing.stdout, image) {
                    tracing::debug!(image = %image, "agent image present");
                    return Ok(());
                }

                let context = self.paths.container_context_dir();
                tracing::info!(image = %image, context = %context.display(), "building agent image");
                let built = process::run_process(
                    command,
                    &invocation::image_build_args(image, &context),
                )
                .await?;
                process::ensure_success(built, "build").map_err(SetupError::ImageBuild)?;
                tracing::info!(image = %image, "agent image built");
                Ok(())
            })
            .await
    }

    fn mounts(&self, project: &str) -> Mounts {
        Mounts {
            workspace: self.paths.project_workspace(project),
            notes: self.paths.project_notes(project),
            state: self.paths.project_state(project),
        }
    }
}

#[async_trait]
impl AgentLauncher for ContainerSupervisor {
    async fn launch(
        &self,
        project: &str,
        prompt: &str,
        options: &RunOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<AgentProcess, SetupError> {
        let credential = load_credential(&self.paths.env_file())?;
        self.ensure_runtime().await?;
        self.ensure_image().await?;

        let mounts = self.mounts(project);
        tokio::fs::create_dir_all(&mounts.notes).await?;
        tokio::fs::create_dir_all(&mounts.state).await?;

        let options = options.clone().with_defaults(&self.defaults);
        let invocation = RunInvocation {
            image: &self.container.image,
            cpus: options.cpus.unwrap_or(self.defaults.cpus),
            memory: options.memory.as_deref().unwrap_or(&self.defaults.memory),
            credential: &credential,
            mounts: &mounts,
            model: options.model.as_deref(),
            resume: options.resume.as_deref(),
            prompt,
        };
        tracing::debug!(
            command = %self.container.command,
            args = ?invocation.redacted_args(),
            "launching agent container"
        );

        let mut command = Command::new(&self.container.command);
        command.args(invocation.args());
        spawn_supervised(command, options.timeout, cancel)
    }
}
