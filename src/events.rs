//! Typed view of the agent's structured output stream.
//!
//! Every line the agent prints in stream-json mode is one JSON object tagged
//! by `type`. [`AgentEvent`] is a closed union over the four kinds the engine
//! understands plus an [`AgentEvent::Unknown`] fallback, so newer agent
//! output is carried through verbatim instead of breaking the decoder.
//!
//! Fields the engine does not interpret are kept in `extra` maps and written
//! back out on serialization, which keeps persisted event lists faithful to
//! what the process emitted. The kind is decided by the tag alone: a field
//! whose value does not have the expected shape lands in `extra` under its
//! own key rather than demoting the event to [`AgentEvent::Unknown`].

use crate::textutil::truncate_with_suffix_by_chars;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Characters of assistant text shown in progress log lines.
const TEXT_PREVIEW_CHARS: usize = 150;

/// One unit of agent progress.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Lifecycle notices; `init` carries the resumption token.
    System(SystemEvent),
    /// Model output: text and tool invocations.
    Assistant(AssistantEvent),
    /// Tool result echo. Never a human turn in this protocol.
    User(UserEvent),
    /// Terminal summary of a run.
    Result(ResultEvent),
    /// Any object whose `type` is missing or not recognized.
    Unknown(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Resumption token reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantEvent {
    #[serde(default, skip_serializing_if = "AssistantMessage::is_empty")]
    pub message: AssistantMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantMessage {
    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Set only on results synthesized locally after a forced stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultEvent {
    /// Build the result recorded when a run is killed before it reports one.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self {
            subtype: Some("interrupted".to_string()),
            is_error: Some(true),
            num_turns: Some(0),
            result: Some(reason.into()),
            interrupted: Some(true),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }
}

/// One block of assistant message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    /// Block kinds the engine does not interpret (thinking, images, ...).
    Other(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    /// Convenience constructor for a plain text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextBlock {
            text: text.into(),
            extra: Map::new(),
        })
    }

    /// Convenience constructor for a tool invocation block.
    pub fn tool_use(name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse(ToolUseBlock {
            id: None,
            name: name.into(),
            input,
            extra: Map::new(),
        })
    }

    fn from_value(value: Value) -> Self {
        let tag = value.get("type").and_then(Value::as_str).map(str::to_string);
        let parsed = match tag.as_deref() {
            Some("text") => untagged::<TextBlock>(&value).map(Self::Text),
            Some("tool_use") => untagged::<ToolUseBlock>(&value).map(Self::ToolUse),
            _ => None,
        };
        parsed.unwrap_or(Self::Other(value))
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Text(block) => tagged("text", block),
            Self::ToolUse(block) => tagged("tool_use", block),
            Self::Other(value) => Ok(value.clone()),
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

/// Event payloads that keep uninterpreted fields in an `extra` map.
trait Payload: serde::de::DeserializeOwned + Default {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

impl Payload for SystemEvent {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Payload for AssistantEvent {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Payload for UserEvent {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Payload for ResultEvent {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl AgentEvent {
    /// Interpret one JSON value as an event.
    ///
    /// Returns `None` only for values that are not JSON objects. The variant
    /// follows the `type` tag; objects with a missing or unrecognized tag
    /// become [`AgentEvent::Unknown`].
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let tag = map.get("type").and_then(Value::as_str).map(str::to_string);
        let Some(tag @ ("system" | "assistant" | "user" | "result")) = tag.as_deref() else {
            return Some(Self::Unknown(Value::Object(map)));
        };
        map.remove("type");
        Some(match tag {
            "system" => Self::System(payload(map)),
            "assistant" => Self::Assistant(payload(map)),
            "user" => Self::User(payload(map)),
            _ => Self::Result(payload(map)),
        })
    }

    /// Parse one line of stream-json output. Blank or non-JSON lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(trimmed).ok()?;
        Self::from_value(value)
    }

    /// Serialize back to the agent's wire shape.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::System(event) => tagged("system", event),
            Self::Assistant(event) => tagged("assistant", event),
            Self::User(event) => tagged("user", event),
            Self::Result(event) => tagged("result", event),
            Self::Unknown(value) => Ok(value.clone()),
        }
    }

    /// The `type` tag of this event, as emitted.
    pub fn kind(&self) -> &str {
        match self {
            Self::System(_) => "system",
            Self::Assistant(_) => "assistant",
            Self::User(_) => "user",
            Self::Result(_) => "result",
            Self::Unknown(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Resumption token carried by a system event, if any.
    pub fn resumption_token(&self) -> Option<&str> {
        match self {
            Self::System(event) => event
                .session_id
                .as_deref()
                .filter(|token| !token.trim().is_empty()),
            _ => None,
        }
    }

    /// Non-empty text blocks of an assistant event, in order.
    pub fn text_blocks(&self) -> Vec<&str> {
        let Self::Assistant(event) = self else {
            return Vec::new();
        };
        event
            .message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) if !text.text.is_empty() => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Named tool invocations of an assistant event, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        let Self::Assistant(event) = self else {
            return Vec::new();
        };
        event
            .message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool) if !tool.name.is_empty() => Some(tool),
                _ => None,
            })
            .collect()
    }

    pub fn as_result(&self) -> Option<&ResultEvent> {
        match self {
            Self::Result(result) => Some(result),
            _ => None,
        }
    }

    /// Build an assistant event holding a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::Assistant(AssistantEvent {
            message: AssistantMessage {
                content: vec![ContentBlock::text(text)],
                extra: Map::new(),
            },
            ..AssistantEvent::default()
        })
    }

    /// Emit a one-line progress summary for this event.
    pub fn log_progress(&self, project: &str) {
        match self {
            Self::System(event) if event.subtype.as_deref() == Some("init") => {
                tracing::info!(
                    project,
                    model = event.model.as_deref().unwrap_or("unknown"),
                    session = event.session_id.as_deref().unwrap_or("none"),
                    "agent session started"
                );
            }
            Self::Assistant(_) => {
                for text in self.text_blocks() {
                    let preview = truncate_with_suffix_by_chars(text, TEXT_PREVIEW_CHARS, "...");
                    tracing::info!(project, "agent response: {preview}");
                }
                for tool in self.tool_uses() {
                    tracing::info!(project, tool = %tool.name, "agent using tool");
                }
            }
            Self::Result(result) => {
                tracing::info!(
                    project,
                    is_error = result.is_error(),
                    turns = result.num_turns.unwrap_or(0),
                    cost_usd = result.total_cost_usd.unwrap_or(0.0),
                    "agent result"
                );
            }
            _ => {}
        }
    }
}

impl Serialize for AgentEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AgentEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).ok_or_else(|| D::Error::custom("agent event must be a JSON object"))
    }
}

/// Parse a tagged object into its payload struct, ignoring the tag itself.
fn untagged<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    let mut map = value.as_object()?.clone();
    map.remove("type");
    serde_json::from_value(Value::Object(map)).ok()
}

/// Parse an event payload, moving every field whose value does not fit its
/// typed slot into `extra` under the same key.
fn payload<T: Payload>(map: Map<String, Value>) -> T {
    if let Ok(parsed) = serde_json::from_value(Value::Object(map.clone())) {
        return parsed;
    }
    let (mut fits, mut misfits) = (Map::new(), Map::new());
    for (key, value) in map {
        let single = Value::Object(Map::from_iter([(key.clone(), value.clone())]));
        if serde_json::from_value::<T>(single).is_ok() {
            fits.insert(key, value);
        } else {
            misfits.insert(key, value);
        }
    }
    let mut parsed: T = match serde_json::from_value(Value::Object(fits.clone())) {
        Ok(parsed) => parsed,
        Err(_) => {
            misfits.extend(fits);
            T::default()
        }
    };
    parsed.extra_mut().extend(misfits);
    parsed
}

/// Serialize a payload struct and stamp its `type` tag.
fn tagged<T: Serialize>(tag: &str, payload: &T) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(payload)?;
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String(tag.to_string()));
    }
    Ok(value)
}
