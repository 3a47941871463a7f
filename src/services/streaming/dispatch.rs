//! Routes decoded events to a handler table
//!
//! Processing of one chunk is synchronous. Once a terminal event has been
//! handled, or cancellation is observed, the remaining frames of the chunk
//! are discarded and nothing else is delivered.

use tracing::{debug, info, warn};

use super::{SseDecoder, SseFrame, StreamEvent, StreamHandlers, StreamSession};

/// What the caller should do after a chunk was processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading
    Continue,
    /// `done` received
    Done,
    /// `error` received and delivered
    UpstreamError,
    /// Cancellation was observed mid-chunk
    Cancelled,
}

impl Flow {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Continue
    }
}

/// Decoder plus dispatch state for one session
pub struct StreamDispatcher {
    decoder: SseDecoder,
    session: StreamSession,
    finished: Option<Flow>,
}

impl StreamDispatcher {
    #[must_use]
    pub fn new(session: StreamSession) -> Self {
        Self {
            decoder: SseDecoder::new(),
            session,
            finished: None,
        }
    }

    /// Decode `chunk` and deliver its events in order
    pub fn process_chunk<H>(&mut self, chunk: &[u8], handlers: &mut H) -> Flow
    where
        H: StreamHandlers + ?Sized,
    {
        if let Some(flow) = self.finished {
            return flow;
        }

        let frames = self.decoder.feed(chunk);
        self.dispatch_frames(frames, handlers)
    }

    /// Process the unterminated tail after the transport reported end of stream
    pub fn finish<H>(&mut self, handlers: &mut H) -> Flow
    where
        H: StreamHandlers + ?Sized,
    {
        if let Some(flow) = self.finished {
            return flow;
        }

        let frames: Vec<SseFrame> = self.decoder.flush().into_iter().collect();
        match self.dispatch_frames(frames, handlers) {
            Flow::Continue => self.stop(Flow::Done),
            flow => flow,
        }
    }

    fn dispatch_frames<H>(&mut self, frames: Vec<SseFrame>, handlers: &mut H) -> Flow
    where
        H: StreamHandlers + ?Sized,
    {
        for frame in frames {
            if self.session.is_cancelled() {
                return self.stop(Flow::Cancelled);
            }

            let event = match StreamEvent::decode(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(
                        event_type = frame.event_type_or_unknown(),
                        "event carried nothing to deliver"
                    );
                    continue;
                }
                Err(error) => {
                    warn!(
                        event_type = frame.event_type_or_unknown(),
                        data = %frame.data,
                        %error,
                        "Failed to parse stream event, skipping"
                    );
                    continue;
                }
            };

            let flow = self.deliver(event, handlers);
            if flow.is_terminal() {
                return self.stop(flow);
            }
        }

        Flow::Continue
    }

    fn deliver<H>(&mut self, event: StreamEvent, handlers: &mut H) -> Flow
    where
        H: StreamHandlers + ?Sized,
    {
        debug!(kind = event.kind_name(), "stream event");

        match event {
            StreamEvent::Content(text) => {
                self.session.append_text(&text);
                handlers.on_content(&text);
            }
            StreamEvent::Progress(message) => handlers.on_progress(&message),
            StreamEvent::Error(message) => {
                self.session.set_error(&message);
                handlers.on_error(&message);
                return Flow::UpstreamError;
            }
            StreamEvent::Done => return Flow::Done,
            StreamEvent::SessionCreated(id) => {
                self.session.set_session_id(&id);
                handlers.on_session_created(&id);
            }
            StreamEvent::ToolCalls(calls) => handlers.on_tool_calls(&calls),
            StreamEvent::ToolResults(results) => handlers.on_tool_results(&results),
            StreamEvent::ImagePartial { index, data } => handlers.on_image_partial(index, &data),
            StreamEvent::ImageCompleted(url) => handlers.on_image_completed(&url),
            StreamEvent::PairId(id) => {
                self.session.set_pair_id(&id);
                handlers.on_pair_id(&id);
            }
            StreamEvent::SubAgentStart(info) => handlers.on_sub_agent_start(&info),
            StreamEvent::SubAgentToolCall(info) => handlers.on_sub_agent_tool_call(&info),
            StreamEvent::SubAgentComplete(info) => handlers.on_sub_agent_complete(&info),
            StreamEvent::Unknown { event_type } => {
                info!(%event_type, "Unknown stream event, ignoring");
            }
        }

        Flow::Continue
    }

    fn stop(&mut self, flow: Flow) -> Flow {
        self.finished = Some(flow);
        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::streaming::EventLog;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const GREETING: &str = "event: chat.content\ndata: Hello\n\nevent: chat.content\ndata:  world\n\nevent: done\ndata: {}\n";

    fn run(chunks: &[&[u8]]) -> (EventLog, Flow, StreamSession) {
        let session = StreamSession::new();
        let mut dispatcher = StreamDispatcher::new(session.clone());
        let mut log = EventLog::new();
        let mut flow = Flow::Continue;
        for chunk in chunks {
            flow = dispatcher.process_chunk(chunk, &mut log);
            if flow.is_terminal() {
                return (log, flow, session);
            }
        }
        flow = dispatcher.finish(&mut log);
        (log, flow, session)
    }

    #[test]
    fn test_greeting_scenario() {
        let (log, flow, session) = run(&[GREETING.as_bytes()]);
        assert_eq!(
            log.events,
            vec![
                StreamEvent::Content("Hello".to_string()),
                StreamEvent::Content(" world".to_string()),
            ]
        );
        assert_eq!(flow, Flow::Done);
        assert_eq!(session.accumulated_text(), "Hello world");
    }

    #[test]
    fn test_error_short_circuits() {
        let wire = "event: progress\ndata: {\"message\":\"thinking\"}\n\nevent: error\ndata: {\"message\":\"rate limited\"}\n\nevent: chat.content\ndata: should never arrive\n";
        let (log, flow, session) = run(&[wire.as_bytes()]);
        assert_eq!(
            log.events,
            vec![
                StreamEvent::Progress("thinking".to_string()),
                StreamEvent::Error("rate limited".to_string()),
            ]
        );
        assert_eq!(flow, Flow::UpstreamError);
        assert!(session.accumulated_text().is_empty());
    }

    #[test]
    fn test_nothing_after_done_even_in_later_chunks() {
        let session = StreamSession::new();
        let mut dispatcher = StreamDispatcher::new(session);
        let mut log = EventLog::new();

        let first = dispatcher.process_chunk(b"event: done\ndata: {}\nevent: chat.content\ndata: late\n", &mut log);
        assert_eq!(first, Flow::Done);
        let second = dispatcher.process_chunk(b"data: later\n", &mut log);
        assert_eq!(second, Flow::Done);
        assert_eq!(dispatcher.finish(&mut log), Flow::Done);
        assert!(log.events.is_empty());
    }

    #[test]
    fn test_every_partition_gives_same_result() {
        let wire = "event: chat.content\ndata: caf\u{e9} \u{1F600}\nevent: progress\ndata: {\"message\":\"m\"}\nevent: chat.content\ndata: {braces}\nevent: done\ndata: {}\n";
        let bytes = wire.as_bytes();
        let (whole, _, _) = run(&[bytes]);

        for split in 1..bytes.len() {
            let (log, flow, session) = run(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(log.events, whole.events, "split at {split}");
            assert_eq!(flow, Flow::Done);
            assert_eq!(session.accumulated_text(), "caf\u{e9} \u{1F600}{braces}");
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let (log, _, _) = run(&singles);
        assert_eq!(log.events, whole.events);
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let wire = "event: something.new.v2\ndata: {\"x\":1}\ndata: not even json\nevent: chat.content\ndata: ok\nevent: done\ndata: {}\n";
        let (log, flow, _) = run(&[wire.as_bytes()]);
        assert_eq!(log.events, vec![StreamEvent::Content("ok".to_string())]);
        assert_eq!(flow, Flow::Done);
    }

    #[test]
    fn test_malformed_tool_calls_are_skipped() {
        let wire = "event: tool.calls\ndata: {oops\nevent: tool.results\ndata: {\"data\":[{\"ok\":true}]}\n";
        let (log, flow, _) = run(&[wire.as_bytes()]);
        assert_eq!(
            log.events,
            vec![StreamEvent::ToolResults(vec![json!({"ok": true})])]
        );
        assert_eq!(flow, Flow::Done);
    }

    #[test]
    fn test_ids_are_recorded_on_session() {
        let wire = "event: session.created\ndata: {\"id\":\"s-9\"}\nevent: pair.id\ndata: {\"id\":\"p-3\"}\n";
        let (log, _, session) = run(&[wire.as_bytes()]);
        assert_eq!(log.events.len(), 2);
        assert_eq!(session.session_id().as_deref(), Some("s-9"));
        assert_eq!(session.pair_id().as_deref(), Some("p-3"));
    }

    #[test]
    fn test_cancellation_stops_delivery() {
        struct CancelAfterFirst {
            session: StreamSession,
            seen: Vec<String>,
        }

        impl StreamHandlers for CancelAfterFirst {
            fn on_content(&mut self, text: &str) {
                self.seen.push(text.to_string());
                self.session.cancel();
            }
        }

        let session = StreamSession::new();
        let mut dispatcher = StreamDispatcher::new(session.clone());
        let mut handlers = CancelAfterFirst {
            session: session.clone(),
            seen: Vec::new(),
        };

        let flow = dispatcher.process_chunk(
            b"event: chat.content\ndata: one\ndata: two\ndata: three\n",
            &mut handlers,
        );
        assert_eq!(flow, Flow::Cancelled);
        assert_eq!(handlers.seen, vec!["one".to_string()]);
        assert_eq!(session.accumulated_text(), "one");
    }

    #[test]
    fn test_natural_end_without_done() {
        let (log, flow, session) = run(&[b"event: chat.content\ndata: tail".as_slice()]);
        assert_eq!(log.text(), "tail");
        assert_eq!(flow, Flow::Done);
        assert_eq!(session.accumulated_text(), "tail");
    }
}
