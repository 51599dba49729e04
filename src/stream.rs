//! Pull-style consumption of a reply as a `Stream` of events.

use futures::stream::{self, Stream};

use crate::client::ClientError;
use crate::model::StreamEvent;
use crate::sse::{parse_frame, FrameBuffer};
use crate::transport::DeltaSource;

struct EventState {
    source: Box<dyn DeltaSource>,
    buffer: FrameBuffer,
    ready: std::collections::VecDeque<StreamEvent>,
    finished: bool,
}

/// Turn an open body into a stream of events.
///
/// The stream yields `Done` (also synthesized when the body closes without the
/// sentinel) and ends; an in-band error is yielded as `Err(ClientError::Stream)`
/// and ends the stream. Trailing bytes after either are never read.
///
/// # Example
/// ```ignore
/// let mut events = Box::pin(event_stream(source));
/// while let Some(event) = events.next().await {
///     match event? {
///         StreamEvent::Token(token) => print!("{}", token),
///         StreamEvent::Done => break,
///         StreamEvent::Error(_) => unreachable!(),
///     }
/// }
/// ```
pub fn event_stream(
    source: Box<dyn DeltaSource>,
) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send {
    let state = EventState {
        source,
        buffer: FrameBuffer::new(),
        ready: Default::default(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(event) = state.ready.pop_front() {
                match event {
                    StreamEvent::Token(_) => return Some((Ok(event), state)),
                    StreamEvent::Done => {
                        state.finish();
                        return Some((Ok(StreamEvent::Done), state));
                    }
                    StreamEvent::Error(message) => {
                        state.finish();
                        return Some((Err(ClientError::Stream { message }), state));
                    }
                }
            }

            match state.source.next_delta().await {
                Some(Ok(delta)) => {
                    state.buffer.append(&delta);
                    let frames = state.buffer.drain();
                    state.ready.extend(frames.iter().filter_map(|f| parse_frame(f)));
                }
                Some(Err(err)) => {
                    state.finish();
                    return Some((Err(err), state));
                }
                None => {
                    let last = state.buffer.flush().and_then(|f| parse_frame(&f));
                    state.ready.extend(last);
                    // body closed: complete even without the sentinel
                    if !matches!(state.ready.back(), Some(StreamEvent::Done | StreamEvent::Error(_))) {
                        state.ready.push_back(StreamEvent::Done);
                    }
                }
            }
        }
    })
}

impl EventState {
    fn finish(&mut self) {
        self.finished = true;
        self.ready.clear();
        self.buffer.clear();
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct Deltas(Vec<&'static str>);

    #[async_trait]
    impl DeltaSource for Deltas {
        async fn next_delta(&mut self) -> Option<Result<String, ClientError>> {
            if self.0.is_empty() {
                None
            } else {
                Some(Ok(self.0.remove(0).to_string()))
            }
        }

        fn close(&mut self) {
            self.0.clear();
        }
    }

    async fn collect(deltas: Vec<&'static str>) -> Vec<Result<StreamEvent, ClientError>> {
        event_stream(Box::new(Deltas(deltas))).collect().await
    }

    #[tokio::test]
    async fn test_tokens_then_done() {
        let events = collect(vec![
            "data: {\"token\": \"Start\"}\n\ndata: {\"to",
            "ken\": \" End\"}\n\ndata: [DONE]\n\ndata: {\"token\": \"ignored\"}\n\n",
        ])
        .await;
        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Start".to_string()),
                StreamEvent::Token(" End".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_close_without_sentinel_yields_done() {
        let events = collect(vec!["data: {\"token\": \"a\"}\n\ndata: {\"token\": \"b\"}"]).await;
        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("a".to_string()),
                StreamEvent::Token("b".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let events = collect(vec![
            "data: {\"error\": \"Streaming failed\"}\n\ndata: {\"token\": \"x\"}\n\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Err(ClientError::Stream { message }) if message == "Streaming failed"
        ));
    }
}
