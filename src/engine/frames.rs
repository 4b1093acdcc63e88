//! Live frames sent to a run's subscriber.

use serde::{Deserialize, Serialize};

use crate::events::AgentEvent;

/// One relayed event: kind tag, JSON payload and a per-run id from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub id: u64,
    pub event: String,
    pub data: String,
}

impl StreamFrame {
    pub fn new(id: u64, event: &AgentEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            event: event.kind().to_string(),
            data: serde_json::to_string(event)?,
        })
    }

    /// Decode the payload back into an event.
    pub fn to_event(&self) -> Option<AgentEvent> {
        AgentEvent::parse_line(&self.data)
    }

    /// Server-sent-events text form, terminated by a blank line.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\nid: {}\n\n", self.event, self.data, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_carries_kind_and_payload() {
        let event = AgentEvent::parse_line(r#"{"type":"system","subtype":"init","session_id":"s1"}"#)
            .expect("event");
        let frame = StreamFrame::new(1, &event).expect("frame");
        assert_eq!(frame.id, 1);
        assert_eq!(frame.event, "system");
        let payload: serde_json::Value = serde_json::from_str(&frame.data).expect("json");
        assert_eq!(payload, json!({"type":"system","subtype":"init","session_id":"s1"}));
        assert_eq!(frame.to_event(), Some(event));
    }

    #[test]
    fn sse_form_is_single_data_line() {
        let event = AgentEvent::assistant_text("line one\nline two");
        let frame = StreamFrame::new(7, &event).expect("frame");
        let sse = frame.to_sse();
        assert!(sse.starts_with("event: assistant\ndata: {"));
        assert!(sse.ends_with("\nid: 7\n\n"));
        assert_eq!(sse.lines().filter(|l| l.starts_with("data: ")).count(), 1);
    }

    #[test]
    fn unknown_kinds_keep_their_tag() {
        let event = AgentEvent::from_value(json!({"type": "stream_event", "x": 1})).expect("object");
        let frame = StreamFrame::new(3, &event).expect("frame");
        assert_eq!(frame.event, "stream_event");
    }
}
