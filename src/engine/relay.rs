//! In-memory accumulator for one run and its flush policy.
//!
//! [`RelayState`] sees every event in emission order. It numbers them for the
//! live subscriber, keeps the full event list and the assistant text, tracks
//! the latest resumption token and decides when an opportunistic flush is
//! due. It does no I/O.

use crate::config::PersistenceConfig;
use crate::events::{AgentEvent, ResultEvent};
use crate::store::{LogCompletion, LogProgress};

/// Separator between assistant text blocks in the persisted text.
const TEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug)]
pub struct RelayState {
    thresholds: PersistenceConfig,
    events: Vec<AgentEvent>,
    text_parts: Vec<String>,
    last_result: Option<ResultEvent>,
    token: Option<String>,
    last_seq: u64,
    chars_since_flush: usize,
    events_since_flush: usize,
}

/// What accepting one event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// Frame id for the live subscriber, starting at 1.
    pub seq: u64,
    /// A resumption token different from the last one seen.
    pub new_token: Option<String>,
}

impl RelayState {
    pub fn new(thresholds: PersistenceConfig) -> Self {
        Self {
            thresholds,
            events: Vec::new(),
            text_parts: Vec::new(),
            last_result: None,
            token: None,
            last_seq: 0,
            chars_since_flush: 0,
            events_since_flush: 0,
        }
    }

    /// Record `event` at the end of the run's history.
    pub fn accept(&mut self, event: AgentEvent) -> Accepted {
        self.last_seq += 1;
        self.events_since_flush += 1;

        for text in event.text_blocks() {
            self.chars_since_flush += text.chars().count();
            self.text_parts.push(text.to_string());
        }

        let new_token = match event.resumption_token() {
            Some(token) if self.token.as_deref() != Some(token) => {
                self.token = Some(token.to_string());
                self.token.clone()
            }
            _ => None,
        };

        if let Some(result) = event.as_result() {
            self.last_result = Some(result.clone());
        }
        self.events.push(event);

        Accepted {
            seq: self.last_seq,
            new_token,
        }
    }

    /// True once new text or new events since the last snapshot reach a
    /// threshold.
    pub fn flush_due(&self) -> bool {
        self.chars_since_flush >= self.thresholds.flush_char_threshold
            || self.events_since_flush >= self.thresholds.flush_event_threshold
    }

    /// Snapshot the current history for an opportunistic flush and reset the
    /// threshold counters.
    pub fn take_snapshot(&mut self) -> LogProgress {
        self.chars_since_flush = 0;
        self.events_since_flush = 0;
        LogProgress {
            assistant_text: self.assistant_text(),
            events: self.events.clone(),
        }
    }

    /// Text blocks joined by a blank line, or `None` when there are none.
    pub fn assistant_text(&self) -> Option<String> {
        if self.text_parts.is_empty() {
            None
        } else {
            Some(self.text_parts.join(TEXT_SEPARATOR))
        }
    }

    pub fn events(&self) -> &[AgentEvent] {
        &self.events
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// A terminal result without an error flag was the last one observed.
    pub fn completed(&self) -> bool {
        self.last_result
            .as_ref()
            .is_some_and(|result| !result.is_error())
    }

    pub fn exit_code(&self) -> i32 {
        if self.completed() {
            0
        } else {
            1
        }
    }

    /// JSON text of the last result event, or empty when none was seen.
    pub fn response(&self) -> String {
        self.last_result
            .as_ref()
            .and_then(|result| AgentEvent::Result(result.clone()).to_value().ok())
            .map(|value| value.to_string())
            .unwrap_or_default()
    }

    /// Final record contents for a run that took `duration_ms`.
    pub fn completion(&self, duration_ms: u64) -> LogCompletion {
        LogCompletion {
            response: self.response(),
            assistant_text: self.assistant_text(),
            events: self.events.clone(),
            exit_code: self.exit_code(),
            duration: duration_ms,
            completed: self.completed(),
        }
    }
}
