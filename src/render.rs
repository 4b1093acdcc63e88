//! Terminal output for runs, threads and logs.
//!
//! Assistant text goes to stdout so it can be piped; everything else
//! (tool activity, markers, listings chrome, warnings) goes to stderr.

use crossterm::style::{Color, Stylize};

use crate::events::AgentEvent;
use crate::store::{SessionLog, ThreadMeta};
use crate::textutil::single_line_preview;
use crate::timeline::{DisplayGroup, ToolCall};

const INDENT: &str = "  ";
const TOOL_ARGS_PREVIEW: usize = 80;
const TOOL_RESULT_PREVIEW: usize = 120;
const PROMPT_PREVIEW: usize = 60;

/// Handles all terminal output formatting.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Print one display group as it would appear in a conversation view.
    pub fn group(&self, group: &DisplayGroup) {
        match group {
            DisplayGroup::User { text } => self.user_turn(text),
            DisplayGroup::System { event } => self.marker(&system_line(event), Color::DarkGrey),
            DisplayGroup::AssistantText { text } => self.assistant_text(text),
            DisplayGroup::ToolGroup { tools } => {
                for tool in tools {
                    self.tool_call(tool);
                }
            }
            DisplayGroup::Result { event } => {
                let tone = match event.as_result() {
                    Some(result) if !result.is_error() => Color::Green,
                    _ => Color::Red,
                };
                self.marker(&result_line(event), tone);
            }
        }
    }

    pub fn user_turn(&self, text: &str) {
        if self.color {
            eprintln!("{} {}", ">".with(Color::Cyan).bold(), text.bold());
        } else {
            eprintln!("> {text}");
        }
    }

    pub fn assistant_text(&self, text: &str) {
        println!("{text}");
        println!();
    }

    pub fn tool_call(&self, tool: &ToolCall) {
        let (name, args) = tool_call_parts(tool);
        if self.color {
            eprintln!(
                "{INDENT}{} {}({})",
                "•".with(Color::Yellow),
                name.with(Color::Yellow).bold(),
                args.with(Color::DarkGrey),
            );
        } else {
            eprintln!("{INDENT}* {name}({args})");
        }
        if let Some(result) = tool.result.as_ref().map(tool_result_preview) {
            if self.color {
                eprintln!("{INDENT}{INDENT}{} {}", "↳".with(Color::DarkGrey), result.with(Color::Grey));
            } else {
                eprintln!("{INDENT}{INDENT}-> {result}");
            }
        }
    }

    fn marker(&self, text: &str, tone: Color) {
        if self.color {
            eprintln!("{}", format!("[{text}]").with(tone));
        } else {
            eprintln!("[{text}]");
        }
    }

    pub fn section(&self, title: &str) {
        if self.color {
            eprintln!("{} {}", "•".with(Color::Blue), title.with(Color::White).bold());
        } else {
            eprintln!("{title}:");
        }
    }

    pub fn field(&self, key: &str, value: &str) {
        if self.color {
            eprintln!("{INDENT}{} {}", format!("{key}:").with(Color::DarkGrey), value);
        } else {
            eprintln!("{INDENT}{key}: {value}");
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "warning:".with(Color::Yellow).bold());
        } else {
            eprintln!("warning: {msg}");
        }
    }

    pub fn error(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "error:".with(Color::Red).bold());
        } else {
            eprintln!("error: {msg}");
        }
    }

    /// One row per thread, most recent first. Rows go to stdout.
    pub fn thread_list(&self, threads: &[ThreadMeta]) {
        if threads.is_empty() {
            self.warn("no threads");
        }
        for thread in threads {
            println!("{}", thread_row(thread));
        }
    }

    pub fn thread_header(&self, thread: &ThreadMeta) {
        self.section(&thread.title);
        self.field("id", &thread.id);
        self.field("updated", &thread.updated_at);
        self.field("logs", &thread.log_ids.len().to_string());
        if let Some(token) = &thread.session_id {
            self.field("session", token);
        }
    }

    pub fn log_list(&self, logs: &[SessionLog]) {
        if logs.is_empty() {
            self.warn("no logs");
        }
        for log in logs {
            println!("{}", log_row(log));
        }
    }

    pub fn log_header(&self, log: &SessionLog) {
        self.section(&log.id);
        self.field("status", log.status.as_str());
        self.field("exit code", &log.exit_code.to_string());
        self.field("duration", &format!("{}ms", log.duration));
        self.field("started", &log.timestamp);
    }
}

fn tool_call_parts(tool: &ToolCall) -> (String, String) {
    let args = match &tool.input {
        serde_json::Value::Object(map) if map.is_empty() => String::new(),
        value => single_line_preview(&value.to_string(), TOOL_ARGS_PREVIEW),
    };
    (tool.name.clone(), args)
}

/// Best-effort text of a tool result echo.
fn tool_result_preview(event: &AgentEvent) -> String {
    let AgentEvent::User(user) = event else {
        return String::new();
    };
    let content = user
        .message
        .as_ref()
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_array())
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("content"));
    let text = match content {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "(no output)".to_string(),
    };
    single_line_preview(&text, TOOL_RESULT_PREVIEW)
}

fn system_line(event: &AgentEvent) -> String {
    match event {
        AgentEvent::System(system) => match system.subtype.as_deref() {
            Some(subtype) => format!("system: {subtype}"),
            None => "system".to_string(),
        },
        _ => event.kind().to_string(),
    }
}

fn result_line(event: &AgentEvent) -> String {
    let Some(result) = event.as_result() else {
        return event.kind().to_string();
    };
    if result.is_interrupted() {
        let reason = result.result.as_deref().unwrap_or("interrupted");
        return format!("interrupted: {reason}");
    }
    let mut line = if result.is_error() {
        "error".to_string()
    } else {
        "done".to_string()
    };
    if let Some(turns) = result.num_turns {
        line.push_str(&format!(", {turns} turns"));
    }
    if let Some(cost) = result.total_cost_usd {
        line.push_str(&format!(", ${cost:.4}"));
    }
    line
}

fn thread_row(thread: &ThreadMeta) -> String {
    format!(
        "{}  {}  {} logs  {}",
        thread.id,
        thread.updated_at,
        thread.log_ids.len(),
        single_line_preview(&thread.title, PROMPT_PREVIEW)
    )
}

fn log_row(log: &SessionLog) -> String {
    format!(
        "{}  {:<9}  {}",
        log.id,
        log.status.as_str(),
        single_line_preview(&log.prompt, PROMPT_PREVIEW)
    )
}
