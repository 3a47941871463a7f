//! Per-request stream session
//!
//! A [`StreamSession`] is created by the caller for one chat turn and handed
//! to the client by reference. Clones share the same state, which lets
//! another task cancel the stream or read the text received so far while
//! the request task is the only writer.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl StreamState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Result of a finished stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Visible answer, partial when cancelled or failed
    pub text: String,
    pub state: StreamState,
    pub session_id: Option<String>,
    pub pair_id: Option<String>,
    /// Message of a server-signalled `error` event
    pub error: Option<String>,
}

impl StreamOutcome {
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.state != StreamState::Completed
    }

    /// Pair id under which the answer should be stored
    ///
    /// Completed and cancelled turns are kept; a failed turn is not.
    #[must_use]
    pub fn pair_id_to_save(&self) -> Option<&str> {
        match self.state {
            StreamState::Completed | StreamState::Cancelled => self.pair_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: StreamState,
    accumulated_text: String,
    session_id: Option<String>,
    pair_id: Option<String>,
    error: Option<String>,
}

/// Shared handle to the state of one chat request
#[derive(Debug, Clone)]
pub struct StreamSession {
    cancel: CancellationToken,
    inner: Arc<Mutex<Inner>>,
}

impl StreamSession {
    #[must_use]
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Session cancelled together with `token`, e.g. a child of a wider scope
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            inner: Arc::new(Mutex::new(Inner {
                state: StreamState::Idle,
                accumulated_text: String::new(),
                session_id: None,
                pair_id: None,
                error: None,
            })),
        }
    }

    /// Request cancellation
    ///
    /// Returns `false` when the session already reached a terminal state or
    /// was cancelled before.
    pub fn cancel(&self) -> bool {
        if self.state().is_terminal() || self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation has been requested
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    #[must_use]
    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Concatenation of every content event seen so far
    #[must_use]
    pub fn accumulated_text(&self) -> String {
        self.inner.lock().accumulated_text.clone()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    #[must_use]
    pub fn pair_id(&self) -> Option<String> {
        self.inner.lock().pair_id.clone()
    }

    /// Whether both handles refer to the same session
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take an idle session for a request
    ///
    /// Returns `false` if the session was already used; a session serves
    /// exactly one request.
    pub(crate) fn claim(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Idle {
            return false;
        }
        inner.state = StreamState::Requesting;
        true
    }

    /// Move to `next` unless a terminal state was already reached
    pub(crate) fn transition(&self, next: StreamState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        tracing::debug!(from = ?inner.state, to = ?next, "stream state");
        inner.state = next;
        true
    }

    pub(crate) fn append_text(&self, text: &str) {
        self.inner.lock().accumulated_text.push_str(text);
    }

    pub(crate) fn set_session_id(&self, id: &str) {
        self.inner.lock().session_id = Some(id.to_string());
    }

    pub(crate) fn set_pair_id(&self, id: &str) {
        self.inner.lock().pair_id = Some(id.to_string());
    }

    pub(crate) fn set_error(&self, message: &str) {
        self.inner.lock().error = Some(message.to_string());
    }

    /// Enter the terminal `state` and snapshot the result
    pub(crate) fn finish(&self, state: StreamState) -> StreamOutcome {
        self.transition(state);
        let inner = self.inner.lock();
        StreamOutcome {
            text: inner.accumulated_text.clone(),
            state: inner.state,
            session_id: inner.session_id.clone(),
            pair_id: inner.pair_id.clone(),
            error: inner.error.clone(),
        }
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = StreamSession::new();
        assert_eq!(session.state(), StreamState::Idle);
        assert!(session.accumulated_text().is_empty());
        assert!(!session.is_cancelled());
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let session = StreamSession::new();
        assert!(session.transition(StreamState::Streaming));
        let outcome = session.finish(StreamState::Completed);
        assert_eq!(outcome.state, StreamState::Completed);

        assert!(!session.transition(StreamState::Failed));
        assert_eq!(session.finish(StreamState::Cancelled).state, StreamState::Completed);
    }

    #[test]
    fn test_cancel_only_once_and_not_after_finish() {
        let session = StreamSession::new();
        assert!(session.cancel());
        assert!(!session.cancel());

        let finished = StreamSession::new();
        finished.finish(StreamState::Completed);
        assert!(!finished.cancel());
    }

    #[test]
    fn test_clones_share_text() {
        let session = StreamSession::new();
        let observer = session.clone();
        session.append_text("Hello");
        session.append_text(" world");
        assert_eq!(observer.accumulated_text(), "Hello world");
        assert!(observer.same_as(&session));
        assert!(!observer.same_as(&StreamSession::new()));
    }

    #[test]
    fn test_cancelled_future_resolves() {
        let session = StreamSession::new();
        let handle = session.clone();
        handle.cancel();
        tokio_test::block_on(session.cancelled());
        assert!(session.is_cancelled());
    }

    #[test]
    fn test_claim_only_from_idle() {
        let session = StreamSession::new();
        assert!(session.claim());
        assert_eq!(session.state(), StreamState::Requesting);
        assert!(!session.claim());

        session.finish(StreamState::Completed);
        assert!(!session.claim());
        assert_eq!(session.state(), StreamState::Completed);
    }

    #[test]
    fn test_pair_id_saved_for_completed_and_cancelled() {
        let outcome = |state| StreamOutcome {
            text: "answer".to_string(),
            state,
            session_id: None,
            pair_id: Some("p-1".to_string()),
            error: None,
        };
        assert_eq!(outcome(StreamState::Completed).pair_id_to_save(), Some("p-1"));
        assert_eq!(outcome(StreamState::Cancelled).pair_id_to_save(), Some("p-1"));
        assert_eq!(outcome(StreamState::Failed).pair_id_to_save(), None);

        let without_pair = StreamOutcome {
            pair_id: None,
            ..outcome(StreamState::Completed)
        };
        assert_eq!(without_pair.pair_id_to_save(), None);
    }

    #[test]
    fn test_outcome_partial_flag() {
        let session = StreamSession::new();
        session.append_text("half");
        let outcome = session.finish(StreamState::Cancelled);
        assert!(outcome.is_partial());
        assert_eq!(outcome.text, "half");
    }
}
