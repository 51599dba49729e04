//! Client entry point and error types.

use std::sync::Arc;

use futures::Stream;
use thiserror::Error;

use crate::http::build_http_client;
use crate::model::{StreamEvent, StreamRequest};
use crate::options::{StreamConfig, TransportKind};
use crate::session::{SessionHandle, StreamHandler, StreamSession};
use crate::stream::event_stream;
use crate::transport::{ProgressivePollTransport, ReadableStreamTransport, Transport};

/// Errors that can occur while streaming a chat reply.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-2xx response (`status` set) or a network failure (`status` is `None`).
    #[error("Transport error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    /// The server reported a failure inside the stream.
    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid message: {0}")]
    Validation(String),
}

impl ClientError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// The connection failed before or while reading the body.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, ClientError::Transport { status: None, .. })
    }

    /// The server answered with a failure, either as a status or in-band.
    pub fn is_server_reported(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { status: Some(_), .. } | ClientError::Stream { .. }
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ClientError::Config(err.to_string());
        }
        ClientError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Factory for stream sessions bound to one backend configuration.
///
/// # Example
/// ```no_run
/// use chatstream::client::ChatClient;
/// use chatstream::options::StreamConfig;
/// use chatstream::session::Callbacks;
///
/// # async fn run() -> Result<(), chatstream::ClientError> {
/// let client = ChatClient::new(StreamConfig::new("http://localhost:5000"))?;
///
/// let mut reply = String::new();
/// let mut handler = Callbacks::new(
///     |token: &str| reply.push_str(token),
///     || println!("done"),
///     |err| eprintln!("Something went wrong, please try again ({err})"),
/// );
/// client.session("How was my week?").run(&mut handler).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
}

impl ChatClient {
    /// Create a client using the transport selected in `config`.
    pub fn new(config: StreamConfig) -> Result<Self, ClientError> {
        let http_client = build_http_client(&config)?;
        let transport: Arc<dyn Transport> = match config.transport {
            TransportKind::ReadableStream => {
                Arc::new(ReadableStreamTransport::new(http_client, &config))
            }
            TransportKind::ProgressivePoll => {
                Arc::new(ProgressivePollTransport::new(http_client, &config))
            }
        };
        Ok(Self { config, transport })
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Build the request for one chat turn, attaching configured credentials.
    pub fn request(&self, message: impl Into<String>) -> StreamRequest {
        StreamRequest {
            endpoint: self.config.url(),
            message: message.into(),
            bearer_token: self.config.bearer_token.clone(),
            csrf_token: self.config.csrf_token.clone(),
        }
    }

    /// A fresh, idle session for one chat turn.
    pub fn session(&self, message: impl Into<String>) -> StreamSession {
        StreamSession::new(self.transport.clone(), self.request(message))
    }

    /// Run a session for `message` on the tokio runtime.
    pub fn spawn<H>(&self, message: impl Into<String>, handler: H) -> SessionHandle
    where
        H: StreamHandler + 'static,
    {
        self.session(message).spawn(handler)
    }

    /// Pull-style alternative to sessions: the reply as a stream of events.
    ///
    /// The stream ends after `Done`, after the first error, or at end of body.
    pub async fn stream_events(
        &self,
        message: impl Into<String>,
    ) -> Result<impl Stream<Item = Result<StreamEvent, ClientError>> + Send, ClientError> {
        let request = self.request(message);
        request.validate()?;
        let source = self.transport.open(&request).await?;
        Ok(event_stream(source))
    }
}
