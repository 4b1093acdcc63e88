//! Projection of a conversation into display groups.
//!
//! [`project`] is a pure function over an ordered list of entries. The same
//! list always yields the same groups, so a live view built from relayed
//! frames and a replay built from persisted logs render identically.

use serde::Serialize;
use serde_json::Value;

use crate::events::AgentEvent;
use crate::store::SessionLog;

const TEXT_SEPARATOR: &str = "\n\n";

/// One item of a conversation as seen by a consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    /// A prompt typed by the user.
    User(String),
    Event(AgentEvent),
}

/// A tool invocation and, once it arrives, the echo of its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub input: Value,
    pub id: Option<String>,
    pub result: Option<AgentEvent>,
}

impl ToolCall {
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DisplayGroup {
    User { text: String },
    System { event: AgentEvent },
    AssistantText { text: String },
    ToolGroup { tools: Vec<ToolCall> },
    Result { event: AgentEvent },
}

/// Group `entries` for display.
pub fn project(entries: &[TimelineEntry]) -> Vec<DisplayGroup> {
    let mut groups = Vec::new();
    let mut open: Option<Vec<ToolCall>> = None;

    for entry in entries {
        let event = match entry {
            TimelineEntry::User(text) => {
                close_group(&mut groups, &mut open);
                groups.push(DisplayGroup::User { text: text.clone() });
                continue;
            }
            TimelineEntry::Event(event) => event,
        };

        match event {
            AgentEvent::System(_) => {
                close_group(&mut groups, &mut open);
                groups.push(DisplayGroup::System {
                    event: event.clone(),
                });
            }
            AgentEvent::Result(_) => {
                close_group(&mut groups, &mut open);
                groups.push(DisplayGroup::Result {
                    event: event.clone(),
                });
            }
            AgentEvent::Assistant(_) => {
                let texts = event.text_blocks();
                if !texts.is_empty() {
                    close_group(&mut groups, &mut open);
                    groups.push(DisplayGroup::AssistantText {
                        text: texts.join(TEXT_SEPARATOR),
                    });
                }
                let tools = event.tool_uses();
                if !tools.is_empty() {
                    open.get_or_insert_with(Vec::new)
                        .extend(tools.into_iter().map(|tool| ToolCall {
                            name: tool.name.clone(),
                            input: tool.input.clone(),
                            id: tool.id.clone(),
                            result: None,
                        }));
                }
            }
            AgentEvent::User(_) => {
                // Tool result echo; dropped when no group is waiting on it.
                if let Some(pending) = open
                    .as_mut()
                    .and_then(|tools| tools.iter_mut().find(|tool| tool.result.is_none()))
                {
                    pending.result = Some(event.clone());
                }
            }
            AgentEvent::Unknown(_) => {}
        }
    }

    close_group(&mut groups, &mut open);
    groups
}

fn close_group(groups: &mut Vec<DisplayGroup>, open: &mut Option<Vec<ToolCall>>) {
    if let Some(tools) = open.take() {
        if !tools.is_empty() {
            groups.push(DisplayGroup::ToolGroup { tools });
        }
    }
}

/// Rebuild timeline entries for a thread's logs in conversation order.
///
/// Each log contributes its prompt followed by its persisted events. Older
/// records without an event list fall back to their assistant text and the
/// stored result.
pub fn timeline_from_logs(logs: &[SessionLog]) -> Vec<TimelineEntry> {
    let mut entries = Vec::new();
    for log in logs {
        entries.push(TimelineEntry::User(log.prompt.clone()));
        match &log.events {
            Some(events) if !events.is_empty() => {
                entries.extend(events.iter().cloned().map(TimelineEntry::Event));
            }
            _ => {
                if let Some(text) = log.assistant_text.as_deref().filter(|t| !t.is_empty()) {
                    entries.push(TimelineEntry::Event(AgentEvent::assistant_text(text)));
                }
                if let Some(result) = AgentEvent::parse_line(&log.response)
                    .filter(|event| event.as_result().is_some())
                {
                    entries.push(TimelineEntry::Event(result));
                }
            }
        }
    }
    entries
}

/// Entries for a single live run: the prompt, then events as they arrive.
pub fn live_entries<I>(prompt: &str, events: I) -> Vec<TimelineEntry>
where
    I: IntoIterator<Item = AgentEvent>,
{
    std::iter::once(TimelineEntry::User(prompt.to_string()))
        .chain(events.into_iter().map(TimelineEntry::Event))
        .collect()
}

/// Incremental view of a live run.
///
/// Re-projects on every push and hands out only groups that can no longer
/// change, so a consumer can print them once. The trailing tool group stays
/// held back until something closes it or the run ends.
#[derive(Debug, Default)]
pub struct LiveTimeline {
    entries: Vec<TimelineEntry>,
    emitted: usize,
}

impl LiveTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TimelineEntry) -> Vec<DisplayGroup> {
        self.entries.push(entry);
        let groups = project(&self.entries);
        let settled = match groups.last() {
            Some(DisplayGroup::ToolGroup { .. }) => groups.len() - 1,
            _ => groups.len(),
        };
        self.take(groups, settled)
    }

    /// Everything not yet handed out.
    pub fn finish(&mut self) -> Vec<DisplayGroup> {
        let groups = project(&self.entries);
        let len = groups.len();
        self.take(groups, len)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    fn take(&mut self, groups: Vec<DisplayGroup>, upto: usize) -> Vec<DisplayGroup> {
        if upto <= self.emitted {
            return Vec::new();
        }
        let fresh = groups
            .into_iter()
            .skip(self.emitted)
            .take(upto - self.emitted)
            .collect();
        self.emitted = upto;
        fresh
    }
}
