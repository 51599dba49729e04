//! Transport adapters delivering the response body as ordered text deltas.
//!
//! Two strategies satisfy the same [`DeltaSource`] capability:
//! - [`ReadableStreamTransport`] reads body chunks as they are pushed in.
//! - [`ProgressivePollTransport`] observes the growing response text on each
//!   progress notification and yields only the unseen suffix.
//!
//! Callers cannot tell them apart: bytes arrive in transmission order with no
//! gaps and no duplication.

use async_trait::async_trait;

use crate::client::ClientError;
use crate::model::StreamRequest;

pub mod decoder;
pub mod progressive;
pub mod readable;

pub use decoder::Utf8StreamDecoder;
pub use progressive::{Progress, ProgressTracker, ProgressivePollSource, ProgressivePollTransport, ReadyState};
pub use readable::{ReadableStreamSource, ReadableStreamTransport};

/// Opens the HTTP request for one chat turn.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request. Fails with [`ClientError::Transport`] when the
    /// response status is not 2xx or the connection cannot be made.
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeltaSource>, ClientError>;
}

/// An open response body.
#[async_trait]
pub trait DeltaSource: Send {
    /// Next non-empty text delta. `None` once the body closed normally;
    /// a transport failure is yielded once as `Some(Err(_))`.
    async fn next_delta(&mut self) -> Option<Result<String, ClientError>>;

    /// Abort the underlying connection. Later calls to `next_delta` return `None`.
    fn close(&mut self);
}
