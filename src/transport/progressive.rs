//! Progressive-poll adapter.
//!
//! For hosts without a push-style body reader: the platform only reports that
//! the accumulated response text changed. Each notification is turned into the
//! suffix not yet delivered, so the same bytes are never handed out twice.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{DeltaSource, Transport, Utf8StreamDecoder};
use crate::client::ClientError;
use crate::http::send_stream_request;
use crate::model::StreamRequest;
use crate::options::StreamConfig;

/// Progress phase reported alongside the accumulated text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadyState {
    #[default]
    Loading,
    Done,
    /// The connection failed; carries the platform's description.
    Failed(String),
}

/// Snapshot of the response as seen by a progress notification.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub state: ReadyState,
    /// Everything received so far.
    pub text: String,
}

/// Remembers how much of the accumulated text was already delivered.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    seen: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The part of `total` not yet delivered; empty when nothing new arrived.
    ///
    /// # Example
    /// ```
    /// use chatstream::transport::ProgressTracker;
    ///
    /// let mut tracker = ProgressTracker::new();
    /// assert_eq!(tracker.observe("data: a"), "data: a");
    /// assert_eq!(tracker.observe("data: a"), "");
    /// assert_eq!(tracker.observe("data: ab"), "b");
    /// ```
    pub fn observe<'a>(&mut self, total: &'a str) -> &'a str {
        if total.len() <= self.seen {
            return "";
        }
        match total.get(self.seen..) {
            Some(delta) => {
                self.seen = total.len();
                delta
            }
            None => "",
        }
    }

    /// Length in bytes already delivered.
    pub fn seen(&self) -> usize {
        self.seen
    }
}

/// Opens the chat request and exposes the body through progress snapshots.
pub struct ProgressivePollTransport {
    client: Client,
    extra_headers: Option<HashMap<String, String>>,
}

impl ProgressivePollTransport {
    pub fn new(client: Client, config: &StreamConfig) -> Self {
        Self {
            client,
            extra_headers: config.extra_headers.clone(),
        }
    }
}

#[async_trait]
impl Transport for ProgressivePollTransport {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeltaSource>, ClientError> {
        let response = send_stream_request(&self.client, request, &self.extra_headers).await?;
        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        let task = tokio::spawn(report_progress(response, progress_tx));
        Ok(Box::new(ProgressivePollSource::new(progress_rx).with_task(task)))
    }
}

/// Accumulate the body and notify observers after every received chunk.
async fn report_progress(response: Response, progress: watch::Sender<Progress>) {
    let mut body = response.bytes_stream();
    let mut decoder = Utf8StreamDecoder::new();

    while let Some(chunk) = body.next().await {
        if progress.is_closed() {
            return;
        }
        match chunk {
            Ok(bytes) => {
                let text = decoder.decode(&bytes);
                progress.send_modify(|p| p.text.push_str(&text));
            }
            Err(err) => {
                warn!(error = %err, "response body failed");
                progress.send_modify(|p| p.state = ReadyState::Failed(err.to_string()));
                return;
            }
        }
    }

    let tail = decoder.finish();
    progress.send_modify(|p| {
        if let Some(tail) = tail {
            p.text.push_str(&tail);
        }
        p.state = ReadyState::Done;
    });
}

/// Yields the unseen suffix of each progress snapshot.
pub struct ProgressivePollSource {
    progress: watch::Receiver<Progress>,
    tracker: ProgressTracker,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl ProgressivePollSource {
    pub fn new(progress: watch::Receiver<Progress>) -> Self {
        Self {
            progress,
            tracker: ProgressTracker::new(),
            task: None,
            finished: false,
        }
    }

    /// Tie the task producing the snapshots to this source's lifetime.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl DeltaSource for ProgressivePollSource {
    async fn next_delta(&mut self) -> Option<Result<String, ClientError>> {
        let mut notifier_gone = false;
        loop {
            if self.finished {
                return None;
            }

            let (delta, state) = {
                let snapshot = self.progress.borrow_and_update();
                (
                    self.tracker.observe(&snapshot.text).to_string(),
                    snapshot.state.clone(),
                )
            };

            if !delta.is_empty() {
                return Some(Ok(delta));
            }

            match state {
                ReadyState::Loading if !notifier_gone => {
                    if self.progress.changed().await.is_err() {
                        // look once more at the last snapshot before giving up
                        notifier_gone = true;
                    }
                }
                ReadyState::Loading | ReadyState::Done => {
                    debug!(bytes = self.tracker.seen(), "response complete");
                    self.finish();
                    return None;
                }
                ReadyState::Failed(message) => {
                    self.finish();
                    return Some(Err(ClientError::Transport {
                        status: None,
                        message,
                    }));
                }
            }
        }
    }

    fn close(&mut self) {
        self.finish();
    }
}

impl Drop for ProgressivePollSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut source: ProgressivePollSource) -> Vec<Result<String, ClientError>> {
        let mut out = Vec::new();
        while let Some(delta) = source.next_delta().await {
            out.push(delta);
        }
        out
    }

    #[test]
    fn test_tracker_never_repeats() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.observe(""), "");
        assert_eq!(tracker.observe("data: {\"to"), "data: {\"to");
        assert_eq!(tracker.observe("data: {\"to"), "");
        assert_eq!(tracker.seen(), 10);
        assert_eq!(tracker.observe("data: {\"token\""), "ken\"");
        // a shorter snapshot never moves the mark backwards
        assert_eq!(tracker.observe("data"), "");
        assert_eq!(tracker.seen(), 14);
    }

    #[tokio::test]
    async fn test_repeated_snapshot_yields_nothing_new() {
        let (tx, rx) = watch::channel(Progress::default());
        let mut source = ProgressivePollSource::new(rx);

        tx.send_modify(|p| p.text.push_str("data: {\"token\": \"a\"}\n\n"));
        assert_eq!(
            source.next_delta().await.unwrap().unwrap(),
            "data: {\"token\": \"a\"}\n\n"
        );

        // same total length reported again, then completion
        tx.send_modify(|_| {});
        tx.send_modify(|p| p.state = ReadyState::Done);
        assert!(source.next_delta().await.is_none());
        assert!(source.next_delta().await.is_none());
    }

    #[tokio::test]
    async fn test_final_state_flushes_last_delta() {
        let (tx, rx) = watch::channel(Progress::default());
        let handle = tokio::spawn(async move {
            tx.send_modify(|p| p.text.push_str("data: {\"token\": \"a\"}\n\n"));
            tokio::task::yield_now().await;
            tx.send_modify(|p| {
                p.text.push_str("data: [DONE]\n\n");
                p.state = ReadyState::Done;
            });
        });

        let deltas: Vec<String> = collect(ProgressivePollSource::new(rx))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        handle.await.unwrap();

        assert_eq!(
            deltas.concat(),
            "data: {\"token\": \"a\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_failure_before_any_byte_is_terminal_error() {
        let (tx, rx) = watch::channel(Progress::default());
        tx.send_modify(|p| p.state = ReadyState::Failed("connection refused".to_string()));

        let out = collect(ProgressivePollSource::new(rx)).await;
        assert_eq!(out.len(), 1);
        match &out[0] {
            Err(err) => {
                assert!(err.is_network_failure());
                assert!(err.to_string().contains("connection refused"));
            }
            Ok(delta) => panic!("unexpected delta {:?}", delta),
        }
    }

    #[tokio::test]
    async fn test_dropped_notifier_ends_body() {
        let (tx, rx) = watch::channel(Progress::default());
        tx.send_modify(|p| p.text.push_str("data: x"));
        drop(tx);

        let out = collect(ProgressivePollSource::new(rx)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "data: x");
    }

    #[tokio::test]
    async fn test_close_aborts_producer() {
        let (_tx, rx) = watch::channel(Progress::default());
        let task = tokio::spawn(std::future::pending::<()>());
        let mut source = ProgressivePollSource::new(rx).with_task(task);

        source.close();
        assert!(source.next_delta().await.is_none());
        assert!(source.task.is_none());
    }
}
