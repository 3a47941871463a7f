//! Handler table for decoded stream events

use serde_json::Value;

use super::StreamEvent;

/// Callbacks invoked in wire order while a chat response streams in
///
/// Every method has an empty default, so an implementation only overrides
/// the kinds it cares about; events of other kinds are dropped.
pub trait StreamHandlers: Send {
    fn on_content(&mut self, _text: &str) {}

    fn on_progress(&mut self, _message: &str) {}

    /// Server-side failure. No further callbacks follow.
    fn on_error(&mut self, _message: &str) {}

    fn on_tool_calls(&mut self, _calls: &[Value]) {}

    fn on_tool_results(&mut self, _results: &[Value]) {}

    fn on_session_created(&mut self, _session_id: &str) {}

    fn on_image_partial(&mut self, _index: u32, _data: &str) {}

    fn on_image_completed(&mut self, _url: &str) {}

    fn on_pair_id(&mut self, _pair_id: &str) {}

    fn on_sub_agent_start(&mut self, _info: &Value) {}

    fn on_sub_agent_tool_call(&mut self, _info: &Value) {}

    fn on_sub_agent_complete(&mut self, _info: &Value) {}
}

/// Ignores every event
impl StreamHandlers for () {}

/// Records every delivered event in order
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<StreamEvent>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenation of the recorded content events
    #[must_use]
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Content(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl StreamHandlers for EventLog {
    fn on_content(&mut self, text: &str) {
        self.events.push(StreamEvent::Content(text.to_string()));
    }

    fn on_progress(&mut self, message: &str) {
        self.events.push(StreamEvent::Progress(message.to_string()));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(StreamEvent::Error(message.to_string()));
    }

    fn on_tool_calls(&mut self, calls: &[Value]) {
        self.events.push(StreamEvent::ToolCalls(calls.to_vec()));
    }

    fn on_tool_results(&mut self, results: &[Value]) {
        self.events.push(StreamEvent::ToolResults(results.to_vec()));
    }

    fn on_session_created(&mut self, session_id: &str) {
        self.events
            .push(StreamEvent::SessionCreated(session_id.to_string()));
    }

    fn on_image_partial(&mut self, index: u32, data: &str) {
        self.events.push(StreamEvent::ImagePartial {
            index,
            data: data.to_string(),
        });
    }

    fn on_image_completed(&mut self, url: &str) {
        self.events.push(StreamEvent::ImageCompleted(url.to_string()));
    }

    fn on_pair_id(&mut self, pair_id: &str) {
        self.events.push(StreamEvent::PairId(pair_id.to_string()));
    }

    fn on_sub_agent_start(&mut self, info: &Value) {
        self.events.push(StreamEvent::SubAgentStart(info.clone()));
    }

    fn on_sub_agent_tool_call(&mut self, info: &Value) {
        self.events.push(StreamEvent::SubAgentToolCall(info.clone()));
    }

    fn on_sub_agent_complete(&mut self, info: &Value) {
        self.events.push(StreamEvent::SubAgentComplete(info.clone()));
    }
}
