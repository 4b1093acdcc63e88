//! CLI argument parsing via clap.

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Run a coding agent inside a container and keep its conversations.
#[derive(Debug, Parser)]
#[command(name = "agentbox", disable_version_flag = true)]
pub struct Args {
    /// Path to config file (default: ./agentbox.toml or ~/.config/agentbox/agentbox.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Print version and build metadata.
    #[arg(short = 'V', long = "version")]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a prompt to the agent and stream its output.
    Run(RunArgs),
    /// Manage conversation threads.
    #[command(subcommand)]
    Threads(ThreadsCommand),
    /// Inspect session logs.
    #[command(subcommand)]
    Logs(LogsCommand),
    /// List or create projects.
    #[command(subcommand)]
    Projects(ProjectsCommand),
}

#[derive(Debug, ClapArgs)]
pub struct RunArgs {
    pub prompt: String,

    #[arg(short = 'p', long = "project")]
    pub project: String,

    /// Append the run to an existing thread.
    #[arg(short = 't', long = "thread", conflicts_with = "new_thread")]
    pub thread: Option<String>,

    /// Start a new thread titled after the prompt.
    #[arg(long = "new-thread")]
    pub new_thread: bool,

    /// Override the agent model.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Kill the agent after this many seconds.
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    #[arg(long = "cpus")]
    pub cpus: Option<u32>,

    #[arg(long = "memory")]
    pub memory: Option<String>,

    /// Resumption token to continue (defaults to the thread's).
    #[arg(long = "resume", value_name = "TOKEN")]
    pub resume: Option<String>,

    /// Print raw event frames as JSON lines instead of rendered output.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum ThreadsCommand {
    List {
        #[arg(short = 'p', long = "project")]
        project: String,
    },
    Create {
        #[arg(short = 'p', long = "project")]
        project: String,
        title: String,
    },
    /// Print a thread's conversation.
    Show {
        #[arg(short = 'p', long = "project")]
        project: String,
        id: String,
    },
    Rename {
        #[arg(short = 'p', long = "project")]
        project: String,
        id: String,
        title: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum LogsCommand {
    List {
        #[arg(short = 'p', long = "project")]
        project: String,
        /// Only runs that never reached a terminal state.
        #[arg(long = "unfinished")]
        unfinished: bool,
    },
    Show {
        #[arg(short = 'p', long = "project")]
        project: String,
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectsCommand {
    List,
    Create { name: String },
}
