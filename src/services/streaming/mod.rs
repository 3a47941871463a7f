//! Streaming support for chat responses
//!
//! The chat endpoint answers with a line-oriented event stream. Frames come
//! out of [`SseDecoder`], are turned into a closed [`StreamEvent`] once, and
//! are then routed to a [`StreamHandlers`] table by the [`StreamDispatcher`].

pub mod dispatch;
pub mod handlers;
pub mod session;
pub mod sse_parser;

pub use dispatch::{Flow, StreamDispatcher};
pub use handlers::{EventLog, StreamHandlers};
pub use session::{StreamOutcome, StreamSession, StreamState};
pub use sse_parser::{SseDecoder, SseFrame};

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire name of a stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Content,
    Progress,
    Error,
    Done,
    SessionCreated,
    ToolCalls,
    ToolResults,
    ImagePartial,
    ImageCompleted,
    PairId,
    SubAgentStart,
    SubAgentToolCall,
    SubAgentComplete,
    Unknown(String),
}

impl EventKind {
    /// Map an `event:` label to its kind
    #[must_use]
    pub fn from_wire(label: &str) -> Self {
        match label {
            "chat.content" | "content" => Self::Content,
            "progress" => Self::Progress,
            "error" => Self::Error,
            "done" => Self::Done,
            "session.created" => Self::SessionCreated,
            "tool.calls" => Self::ToolCalls,
            "tool.results" => Self::ToolResults,
            "image.partial" => Self::ImagePartial,
            "image.completed" => Self::ImageCompleted,
            "pair.id" => Self::PairId,
            "sub_agent.start" => Self::SubAgentStart,
            "sub_agent.tool_call" => Self::SubAgentToolCall,
            "sub_agent.complete" => Self::SubAgentComplete,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// JSON body carried by every non-content event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ImagePartialData {
    index: u32,
    #[serde(alias = "data", alias = "partial_image_b64")]
    b64: String,
}

#[derive(Debug, Deserialize)]
struct ImageCompletedData {
    url: String,
}

/// One decoded protocol unit
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Raw text fragment of the visible answer
    Content(String),
    Progress(String),
    /// Server-signalled failure, terminal for the stream
    Error(String),
    /// Successful end of the stream
    Done,
    SessionCreated(String),
    ToolCalls(Vec<Value>),
    ToolResults(Vec<Value>),
    /// Base64 fragment of an image still being generated
    ImagePartial { index: u32, data: String },
    ImageCompleted(String),
    PairId(String),
    SubAgentStart(Value),
    SubAgentToolCall(Value),
    SubAgentComplete(Value),
    /// A kind this client does not know about
    Unknown { event_type: String },
}

impl StreamEvent {
    /// Turn one frame into an event
    ///
    /// `Ok(None)` means the frame was well formed but has nothing to deliver,
    /// e.g. `session.created` without an id or `tool.calls` whose `data` is
    /// not an array.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when a non-content payload is malformed.
    pub fn decode(frame: &SseFrame) -> Result<Option<Self>, serde_json::Error> {
        let kind = EventKind::from_wire(frame.event_type_or_unknown());

        // Content chunks are plain text and may contain anything, braces included.
        if kind == EventKind::Content {
            return Ok(Some(Self::Content(frame.data.clone())));
        }

        let raw = frame.data.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let payload: EventPayload = serde_json::from_str(raw)?;

        let event = match kind {
            EventKind::Content => Some(Self::Content(frame.data.clone())),
            EventKind::Progress => Some(Self::Progress(payload.message.unwrap_or_default())),
            EventKind::Error => Some(Self::Error(
                payload
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )),
            EventKind::Done => Some(Self::Done),
            EventKind::SessionCreated => payload.id.map(Self::SessionCreated),
            EventKind::PairId => payload.id.map(Self::PairId),
            EventKind::ToolCalls => array_data(payload.data).map(Self::ToolCalls),
            EventKind::ToolResults => array_data(payload.data).map(Self::ToolResults),
            EventKind::ImagePartial => match payload.data {
                Some(data) => {
                    let partial: ImagePartialData = serde_json::from_value(data)?;
                    Some(Self::ImagePartial {
                        index: partial.index,
                        data: partial.b64,
                    })
                }
                None => None,
            },
            EventKind::ImageCompleted => match payload.data {
                Some(data) => {
                    let completed: ImageCompletedData = serde_json::from_value(data)?;
                    Some(Self::ImageCompleted(completed.url))
                }
                None => payload.message.map(Self::ImageCompleted),
            },
            EventKind::SubAgentStart => present_data(payload.data).map(Self::SubAgentStart),
            EventKind::SubAgentToolCall => {
                present_data(payload.data).map(Self::SubAgentToolCall)
            }
            EventKind::SubAgentComplete => {
                present_data(payload.data).map(Self::SubAgentComplete)
            }
            EventKind::Unknown(event_type) => Some(Self::Unknown { event_type }),
        };

        Ok(event)
    }

    /// Whether no further event may follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    /// Short name for logging
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Content(_) => "content",
            Self::Progress(_) => "progress",
            Self::Error(_) => "error",
            Self::Done => "done",
            Self::SessionCreated(_) => "session_created",
            Self::ToolCalls(_) => "tool_calls",
            Self::ToolResults(_) => "tool_results",
            Self::ImagePartial { .. } => "image_partial",
            Self::ImageCompleted(_) => "image_completed",
            Self::PairId(_) => "pair_id",
            Self::SubAgentStart(_) => "sub_agent_start",
            Self::SubAgentToolCall(_) => "sub_agent_tool_call",
            Self::SubAgentComplete(_) => "sub_agent_complete",
            Self::Unknown { event_type } => event_type,
        }
    }
}

/// Decode the base64 fragment of an `image_partial` event
///
/// # Errors
///
/// Returns the decode error when the fragment is not valid standard base64.
pub fn decode_image_fragment(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data)
}

fn array_data(data: Option<Value>) -> Option<Vec<Value>> {
    match data {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn present_data(data: Option<Value>) -> Option<Value> {
    data.filter(|value| !value.is_null())
}
