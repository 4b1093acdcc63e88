//! Argument lists for the container runtime CLI.

use std::path::{Path, PathBuf};

use super::credential::{Credential, CREDENTIAL_ENV};

/// Container path the project workspace is mounted at.
pub const WORKSPACE_MOUNT: &str = "/workspace";
/// Container path of the per-project notes area.
pub const NOTES_MOUNT: &str = "/notes";
/// Where the agent keeps conversation state for a `/workspace` cwd. Mounting
/// the per-project state dir here keeps resumption tokens valid across runs.
pub const STATE_MOUNT: &str = "/home/dev/.claude/projects/-workspace";

/// Host directories bound into the agent container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mounts {
    pub workspace: PathBuf,
    pub notes: PathBuf,
    pub state: PathBuf,
}

/// Everything needed to render one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunInvocation<'a> {
    pub image: &'a str,
    pub cpus: u32,
    pub memory: &'a str,
    pub credential: &'a Credential,
    pub mounts: &'a Mounts,
    pub model: Option<&'a str>,
    pub resume: Option<&'a str>,
    pub prompt: &'a str,
}

impl RunInvocation<'_> {
    /// Arguments after the runtime program name. The prompt is always last.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--cpus".to_string(),
            self.cpus.to_string(),
            "--memory".to_string(),
            self.memory.to_string(),
            "--env".to_string(),
            format!("{CREDENTIAL_ENV}={}", self.credential.secret()),
            "--volume".to_string(),
            volume(&self.mounts.workspace, WORKSPACE_MOUNT),
            "--volume".to_string(),
            volume(&self.mounts.notes, NOTES_MOUNT),
            "--volume".to_string(),
            volume(&self.mounts.state, STATE_MOUNT),
            self.image.to_string(),
            "-p".to_string(),
            "--verbose".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(token) = self.resume.filter(|t| !t.trim().is_empty()) {
            args.push("--resume".to_string());
            args.push(token.to_string());
        }
        if let Some(model) = self.model.filter(|m| !m.trim().is_empty()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push(self.prompt.to_string());
        args
    }

    /// Argument list with the credential masked, for log lines.
    pub fn redacted_args(&self) -> Vec<String> {
        let secret_arg = format!("{CREDENTIAL_ENV}={}", self.credential.secret());
        self.args()
            .into_iter()
            .map(|arg| {
                if arg == secret_arg {
                    format!("{CREDENTIAL_ENV}=****")
                } else {
                    arg
                }
            })
            .collect()
    }
}

fn volume(host: &Path, container: &str) -> String {
    format!("{}:{container}", host.display())
}

pub fn system_info_args() -> Vec<String> {
    vec!["system".to_string(), "info".to_string()]
}

pub fn system_start_args() -> Vec<String> {
    vec![
        "system".to_string(),
        "start".to_string(),
        "--enable-kernel-install".to_string(),
    ]
}

pub fn image_list_args() -> Vec<String> {
    vec!["image".to_string(), "ls".to_string()]
}

/// `build --tag <image> --file <context>/Dockerfile <context>`.
pub fn image_build_args(image: &str, context_dir: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "--tag".to_string(),
        image.to_string(),
        "--file".to_string(),
        context_dir.join("Dockerfile").display().to_string(),
        context_dir.display().to_string(),
    ]
}

/// Whether `image ls` output lists `image`.
pub fn image_listed(listing: &str, image: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().any(|column| column == image))
}
