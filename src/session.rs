//! Stream session: drives one transport through the frame buffer and parser
//! and dispatches each event to the caller's handler.
//!
//! ```text
//! Idle -> Opening -> Streaming -> Completed | Failed | Cancelled
//! ```
//! Terminal states are absorbing. `on_complete` and `on_error` together fire
//! at most once per session; cancellation fires neither.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::ClientError;
use crate::model::{SessionState, StreamEvent, StreamRequest};
use crate::sse::{parse_frame, FrameBuffer};
use crate::transport::{DeltaSource, Transport};

/// Receives the events of one session.
pub trait StreamHandler: Send {
    /// One reply fragment, in delivery order.
    fn on_token(&mut self, token: &str);

    /// The reply finished. Called at most once.
    fn on_complete(&mut self);

    /// The session failed. Called at most once.
    fn on_error(&mut self, error: ClientError);
}

/// A [`StreamHandler`] made of three closures.
pub struct Callbacks<T, C, E> {
    on_token: T,
    on_complete: Option<C>,
    on_error: Option<E>,
}

impl<T, C, E> Callbacks<T, C, E>
where
    T: FnMut(&str) + Send,
    C: FnOnce() + Send,
    E: FnOnce(ClientError) + Send,
{
    pub fn new(on_token: T, on_complete: C, on_error: E) -> Self {
        Self {
            on_token,
            on_complete: Some(on_complete),
            on_error: Some(on_error),
        }
    }
}

impl<T, C, E> StreamHandler for Callbacks<T, C, E>
where
    T: FnMut(&str) + Send,
    C: FnOnce() + Send,
    E: FnOnce(ClientError) + Send,
{
    fn on_token(&mut self, token: &str) {
        (self.on_token)(token)
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f()
        }
    }

    fn on_error(&mut self, error: ClientError) {
        if let Some(f) = self.on_error.take() {
            f(error)
        }
    }
}

/// A handle that can be used to request cancellation of a session.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Request cancellation. The session closes its transport and stops
    /// dispatching before the next event.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A session running on the tokio runtime.
pub struct SessionHandle {
    cancel: CancelHandle,
    task: JoinHandle<SessionState>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the terminal state.
    pub async fn join(self) -> Result<SessionState, JoinError> {
        self.task.await
    }
}

/// One chat turn, from send to terminal state.
pub struct StreamSession {
    transport: Arc<dyn Transport>,
    request: StreamRequest,
    state: SessionState,
    buffer: FrameBuffer,
    cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(transport: Arc<dyn Transport>, request: StreamRequest) -> Self {
        Self {
            transport,
            request,
            state: SessionState::Idle,
            buffer: FrameBuffer::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    /// Send the request and dispatch events until a terminal state is reached.
    ///
    /// A session runs once; calling `run` again returns the state it ended in
    /// without touching the handler.
    pub async fn run<H>(&mut self, handler: &mut H) -> SessionState
    where
        H: StreamHandler + ?Sized,
    {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "session already ran");
            return self.state;
        }
        self.transition(SessionState::Opening);

        if let Err(err) = self.request.validate() {
            return self.terminate(Err(err), handler, None);
        }

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            opened = self.transport.open(&self.request) => Some(opened),
        };
        let mut source = match opened {
            None => return self.terminate(Err(ClientError::Cancelled), handler, None),
            Some(Err(err)) => return self.terminate(Err(err), handler, None),
            Some(Ok(source)) => source,
        };
        self.transition(SessionState::Streaming);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = source.next_delta() => Some(next),
            };

            match next {
                None => {
                    return self.terminate(Err(ClientError::Cancelled), handler, Some(&mut source))
                }
                Some(Some(Ok(delta))) => {
                    trace!(len = delta.len(), "delta");
                    self.buffer.append(&delta);
                    for frame in self.buffer.drain() {
                        if let Some(outcome) = self.dispatch(&frame, handler) {
                            return self.terminate(outcome, handler, Some(&mut source));
                        }
                    }
                }
                Some(Some(Err(err))) => {
                    warn!(error = %err, "transport failed mid-stream");
                    return self.terminate(Err(err), handler, Some(&mut source));
                }
                Some(None) => {
                    // closing without the sentinel still completes the reply
                    if let Some(frame) = self.buffer.flush() {
                        if let Some(outcome) = self.dispatch(&frame, handler) {
                            return self.terminate(outcome, handler, Some(&mut source));
                        }
                    }
                    return self.terminate(Ok(()), handler, Some(&mut source));
                }
            }
        }
    }

    /// Run the session on the tokio runtime.
    pub fn spawn<H>(mut self, mut handler: H) -> SessionHandle
    where
        H: StreamHandler + 'static,
    {
        let cancel = self.cancel_handle();
        let task = tokio::spawn(async move { self.run(&mut handler).await });
        SessionHandle { cancel, task }
    }

    /// Hand one frame to the handler. `Some` ends the session with that outcome.
    fn dispatch<H>(&self, frame: &str, handler: &mut H) -> Option<Result<(), ClientError>>
    where
        H: StreamHandler + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Some(Err(ClientError::Cancelled));
        }
        match parse_frame(frame)? {
            StreamEvent::Token(token) => {
                handler.on_token(&token);
                None
            }
            StreamEvent::Done => Some(Ok(())),
            StreamEvent::Error(message) => Some(Err(ClientError::Stream { message })),
        }
    }

    fn terminate<H>(
        &mut self,
        outcome: Result<(), ClientError>,
        handler: &mut H,
        source: Option<&mut Box<dyn DeltaSource>>,
    ) -> SessionState
    where
        H: StreamHandler + ?Sized,
    {
        if let Some(source) = source {
            source.close();
        }
        self.buffer = FrameBuffer::new();

        // a cancel request wins over whatever ended the stream
        let outcome = if self.cancel.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(()) => {
                self.transition(SessionState::Completed);
                handler.on_complete();
            }
            Err(ClientError::Cancelled) => self.transition(SessionState::Cancelled),
            Err(err) => {
                self.transition(SessionState::Failed);
                handler.on_error(err);
            }
        }
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}
