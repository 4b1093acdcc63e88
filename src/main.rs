//! CLI entry point for agentbox.

mod cli;

use std::io::{self, IsTerminal};
use std::time::Duration;

use agentbox::build_info::{short_version, version_text};
use agentbox::config::{load_config_with_source, Config};
use agentbox::engine::{Engine, RunRequest, StreamFrame};
use agentbox::render::Renderer;
use agentbox::store::{create_project, list_projects};
use agentbox::supervisor::RunOptions;
use agentbox::textutil::truncate_with_suffix_by_chars;
use agentbox::timeline::{project, timeline_from_logs, LiveTimeline, TimelineEntry};
use clap::{CommandFactory, Parser};
use tokio::sync::{mpsc, watch};

use cli::{Command, LogsCommand, ProjectsCommand, RunArgs, ThreadsCommand};

const FRAME_BUFFER: usize = 256;
const THREAD_TITLE_CHARS: usize = 60;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    if args.version {
        println!("{}", version_text());
        return;
    }
    let Some(command) = args.command else {
        let _ = cli::Args::command().print_help();
        std::process::exit(2);
    };

    let color = !args.no_color && io::stderr().is_terminal();
    let renderer = Renderer::new(color);

    let loaded = match load_config_with_source(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            renderer.error(&e.to_string());
            std::process::exit(1);
        }
    };
    agentbox::logging::init(&loaded.config.logging.level);
    tracing::debug!(
        version = %short_version(),
        config = %loaded.source,
        "starting"
    );

    let code = match dispatch(&loaded.config, renderer, command).await {
        Ok(code) => code,
        Err(msg) => {
            renderer.error(&msg);
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(config: &Config, renderer: Renderer, command: Command) -> Result<i32, String> {
    match command {
        Command::Run(run) => run_prompt(config, renderer, run).await,
        Command::Threads(cmd) => threads_command(config, renderer, cmd).map(|()| 0),
        Command::Logs(cmd) => logs_command(config, renderer, cmd).map(|()| 0),
        Command::Projects(cmd) => projects_command(config, renderer, cmd).map(|()| 0),
    }
}

async fn run_prompt(config: &Config, renderer: Renderer, run: RunArgs) -> Result<i32, String> {
    let engine = Engine::new(config);

    let mut request = RunRequest {
        project: run.project,
        prompt: run.prompt,
        thread_id: run.thread,
        options: RunOptions {
            model: run.model,
            resume: run.resume,
            timeout: run.timeout.map(Duration::from_secs),
            cpus: run.cpus,
            memory: run.memory,
        },
    };
    request.validate().map_err(|e| e.to_string())?;

    if run.new_thread {
        let title = truncate_with_suffix_by_chars(request.prompt.trim(), THREAD_TITLE_CHARS, "");
        let thread = engine
            .threads()
            .create(&request.project, &title)
            .map_err(|e| e.to_string())?;
        request.thread_id = Some(thread.id);
    }

    let (frames_tx, mut frames_rx) = mpsc::channel::<StreamFrame>(FRAME_BUFFER);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let json = run.json;
    let printer = async move {
        let mut live = LiveTimeline::new();
        while let Some(frame) = frames_rx.recv().await {
            if json {
                match serde_json::to_string(&frame) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::warn!(error = %err, "dropping unprintable frame"),
                }
                continue;
            }
            if let Some(event) = frame.to_event() {
                for group in live.push(TimelineEntry::Event(event)) {
                    renderer.group(&group);
                }
            }
        }
        for group in live.finish() {
            renderer.group(&group);
        }
    };

    let (summary, ()) = tokio::join!(
        engine.run_streaming(request, frames_tx, Some(cancel_rx)),
        printer
    );
    interrupt.abort();

    let summary = summary.map_err(|e| e.to_string())?;
    if let Some(warning) = &summary.persist_warning {
        renderer.warn(warning);
    }
    if !json {
        renderer.field("log", &summary.log.id);
        if let Some(thread) = &summary.thread_id {
            renderer.field("thread", thread);
        }
    }
    Ok(summary.log.exit_code)
}

fn threads_command(config: &Config, renderer: Renderer, cmd: ThreadsCommand) -> Result<(), String> {
    let engine = Engine::new(config);
    let threads = engine.threads();
    match cmd {
        ThreadsCommand::List { project } => {
            let list = threads.list(&project).map_err(|e| e.to_string())?;
            renderer.thread_list(&list);
        }
        ThreadsCommand::Create { project, title } => {
            let thread = threads.create(&project, &title).map_err(|e| e.to_string())?;
            println!("{}", thread.id);
        }
        ThreadsCommand::Show { project: name, id } => {
            let detail = threads
                .detail(&name, &id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("thread {name}/{id} not found"))?;
            renderer.thread_header(&detail.thread);
            for group in project(&timeline_from_logs(&detail.logs)) {
                renderer.group(&group);
            }
        }
        ThreadsCommand::Rename { project, id, title } => {
            let thread = threads
                .rename(&project, &id, &title)
                .map_err(|e| e.to_string())?;
            renderer.thread_header(&thread);
        }
    }
    Ok(())
}

fn logs_command(config: &Config, renderer: Renderer, cmd: LogsCommand) -> Result<(), String> {
    let engine = Engine::new(config);
    let logs = engine.logs();
    match cmd {
        LogsCommand::List {
            project,
            unfinished,
        } => {
            let records = if unfinished {
                logs.list_unfinished(&project).map_err(|e| e.to_string())?
            } else {
                let mut records = Vec::new();
                for id in logs.list(&project).map_err(|e| e.to_string())? {
                    match logs.get(&project, &id) {
                        Ok(Some(log)) => records.push(log),
                        Ok(None) => {}
                        Err(err) => renderer.warn(&format!("skipping {id}: {err}")),
                    }
                }
                records
            };
            renderer.log_list(&records);
        }
        LogsCommand::Show { project: name, id } => {
            let log = logs
                .get(&name, &id)
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("log {name}/{id} not found"))?;
            renderer.log_header(&log);
            let groups = project(&timeline_from_logs(std::slice::from_ref(&log)));
            for group in &groups {
                renderer.group(group);
            }
        }
    }
    Ok(())
}

fn projects_command(config: &Config, renderer: Renderer, cmd: ProjectsCommand) -> Result<(), String> {
    match cmd {
        ProjectsCommand::List => {
            let projects = list_projects(&config.paths).map_err(|e| e.to_string())?;
            if projects.is_empty() {
                renderer.warn("no projects");
            }
            for name in projects {
                println!("{name}");
            }
        }
        ProjectsCommand::Create { name } => {
            let dir = create_project(&config.paths, &name).map_err(|e| e.to_string())?;
            println!("{}", dir.display());
        }
    }
    Ok(())
}
