//! Streaming chat client
//!
//! Sends one chat turn and consumes the event-stream response chunk by
//! chunk, delivering events to the caller's handlers as they arrive.

use std::future::Future;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::header;
use tracing::{debug, info, warn};

use crate::{
    error::{DittoError, Result},
    messages::ChatRequest,
};

use super::{
    check_status,
    streaming::{Flow, StreamDispatcher, StreamHandlers, StreamOutcome, StreamSession, StreamState},
    ApiContext,
};

/// Client for `POST /api/v3/users/{userID}/chat`
#[derive(Debug)]
pub struct ChatClient {
    api: ApiContext,
    active: Mutex<Option<StreamSession>>,
}

/// Clears the active slot when the stream that registered it ends
struct ActiveStreamGuard<'a> {
    slot: &'a Mutex<Option<StreamSession>>,
    session: StreamSession,
}

impl Drop for ActiveStreamGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|s| s.same_as(&self.session)) {
            *slot = None;
        }
    }
}

impl ChatClient {
    #[must_use]
    pub fn new(api: ApiContext) -> Self {
        Self {
            api,
            active: Mutex::new(None),
        }
    }

    /// Send `request` and stream the answer into `handlers`
    ///
    /// Resolves with the accumulated text once `done` arrives, the server
    /// closes the stream, an `error` event is delivered, or `session` is
    /// cancelled. Only the last two yield a partial outcome; neither is an
    /// `Err`.
    ///
    /// # Errors
    ///
    /// - [`DittoError::Validation`] if the request is malformed or `session`
    ///   has served a request before (nothing is sent)
    /// - [`DittoError::Auth`] if no token can be obtained
    /// - [`DittoError::PaymentRequired`] on HTTP 402
    /// - [`DittoError::Network`] on any other non-2xx status or a failed read
    pub async fn stream_chat<H>(
        &self,
        request: &ChatRequest,
        handlers: &mut H,
        session: &StreamSession,
    ) -> Result<StreamOutcome>
    where
        H: StreamHandlers + ?Sized,
    {
        request.validate()?;
        if !session.claim() {
            return Err(DittoError::Validation(
                "stream session already used; create a new one per request".to_string(),
            ));
        }

        let _guard = self.register(session);
        if session.is_cancelled() {
            return Ok(session.finish(StreamState::Cancelled));
        }

        let token = match self.api.token().await {
            Ok(token) => token,
            Err(e) => {
                session.finish(StreamState::Failed);
                return Err(e);
            }
        };

        let url = match self
            .api
            .endpoint(&["api", "v3", "users", token.user_id.as_str(), "chat"])
        {
            Ok(url) => url,
            Err(e) => {
                session.finish(StreamState::Failed);
                return Err(e);
            }
        };
        debug!(%url, blocks = request.input.len(), "sending chat request");

        let send = self
            .api
            .client()
            .post(url)
            .bearer_auth(&token.token)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let Some(response) = until_cancelled(session, send).await else {
            info!("chat request cancelled before response");
            return Ok(session.finish(StreamState::Cancelled));
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                session.finish(StreamState::Failed);
                return Err(DittoError::Network(e.to_string()));
            }
        };

        // an error body may be slow to arrive
        let Some(checked) = until_cancelled(session, check_status(response)).await else {
            info!("chat request cancelled while reading error response");
            return Ok(session.finish(StreamState::Cancelled));
        };
        let response = match checked {
            Ok(response) => response,
            Err(e) => {
                session.finish(StreamState::Failed);
                return Err(e);
            }
        };

        session.transition(StreamState::Streaming);
        Self::consume(response.bytes_stream(), handlers, session).await
    }

    /// Drive the byte stream until a terminal condition
    ///
    /// The body stream is owned here and dropped on every return path, which
    /// releases the connection.
    async fn consume<S, H>(body: S, handlers: &mut H, session: &StreamSession) -> Result<StreamOutcome>
    where
        S: Stream<Item = reqwest::Result<Bytes>>,
        H: StreamHandlers + ?Sized,
    {
        let mut body = Box::pin(body);
        let mut dispatcher = StreamDispatcher::new(session.clone());

        loop {
            let flow = match until_cancelled(session, body.next()).await {
                None => Flow::Cancelled,
                Some(Some(Ok(chunk))) => dispatcher.process_chunk(&chunk, handlers),
                Some(Some(Err(e))) => {
                    warn!(error = %e, "stream read failed");
                    session.finish(StreamState::Failed);
                    return Err(DittoError::Network(e.to_string()));
                }
                Some(None) => dispatcher.finish(handlers),
            };

            let state = match flow {
                Flow::Continue => continue,
                Flow::Done => StreamState::Completed,
                Flow::UpstreamError => StreamState::Failed,
                Flow::Cancelled => StreamState::Cancelled,
            };

            let outcome = session.finish(state);
            info!(state = ?outcome.state, chars = outcome.text.len(), "chat stream finished");
            return Ok(outcome);
        }
    }

    /// Cancel the stream currently in flight, if any
    ///
    /// Returns whether a stream was actually cancelled. Its text so far stays
    /// readable through the caller's [`StreamSession`].
    pub fn cancel_active_stream(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(session) => session.cancel(),
            None => false,
        }
    }

    /// Handle of the stream in flight
    #[must_use]
    pub fn active_session(&self) -> Option<StreamSession> {
        self.active.lock().clone()
    }

    fn register(&self, session: &StreamSession) -> ActiveStreamGuard<'_> {
        let previous = self.active.lock().replace(session.clone());
        if previous.is_some_and(|p| !p.state().is_terminal()) {
            warn!("starting a chat stream while another is still active");
        }
        ActiveStreamGuard {
            slot: &self.active,
            session: session.clone(),
        }
    }
}

/// Run `fut` unless `session` is cancelled first
async fn until_cancelled<F: Future>(session: &StreamSession, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = session.cancelled() => None,
        output = fut => Some(output),
    }
}
