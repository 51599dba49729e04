//! Data models shared by the transports, the frame parser and the session.

use serde::Serialize;

use crate::client::ClientError;
use crate::options::SecretString;

/// Longest message the chat backend accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// One outgoing chat turn. Created per send and owned by the session issuing it.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Full URL of the streaming route
    pub endpoint: String,

    /// User message text
    pub message: String,

    /// Sent as `Authorization: Bearer <token>` when present
    pub bearer_token: Option<SecretString>,

    /// Sent as `X-CSRF-Token` when present
    pub csrf_token: Option<SecretString>,
}

impl StreamRequest {
    /// Create a request without credentials.
    pub fn new(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            message: message.into(),
            bearer_token: None,
            csrf_token: None,
        }
    }

    /// Attach a bearer credential.
    pub fn with_bearer_token(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Attach a CSRF token.
    pub fn with_csrf_token(mut self, token: impl Into<SecretString>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// Apply the backend's message rules before anything goes on the wire.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.message.trim().is_empty() {
            return Err(ClientError::Validation(
                "Message must be at least 1 character(s)".to_string(),
            ));
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ClientError::Validation(format!(
                "Message exceeds maximum length of {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(())
    }

    /// JSON body sent to the server.
    pub fn body(&self) -> ChatRequestBody<'_> {
        ChatRequestBody {
            message: &self.message,
        }
    }
}

/// Wire body of the POST: `{"message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ChatRequestBody<'a> {
    pub message: &'a str,
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of the assistant reply
    Token(String),

    /// Server-reported failure
    Error(String),

    /// Completion sentinel
    Done,
}

/// Lifecycle of a stream session. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    /// Whether no further events may be dispatched.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}
