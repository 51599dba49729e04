//! Readable-stream adapter: the body is read chunk by chunk as it is pushed in.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, trace};

use super::{DeltaSource, Transport, Utf8StreamDecoder};
use crate::client::ClientError;
use crate::http::send_stream_request;
use crate::model::StreamRequest;
use crate::options::StreamConfig;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Opens the chat request and reads the body as a byte stream.
pub struct ReadableStreamTransport {
    client: Client,
    extra_headers: Option<HashMap<String, String>>,
}

impl ReadableStreamTransport {
    pub fn new(client: Client, config: &StreamConfig) -> Self {
        Self {
            client,
            extra_headers: config.extra_headers.clone(),
        }
    }
}

#[async_trait]
impl Transport for ReadableStreamTransport {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn DeltaSource>, ClientError> {
        let response = send_stream_request(&self.client, request, &self.extra_headers).await?;
        Ok(Box::new(ReadableStreamSource::new(response.bytes_stream())))
    }
}

/// Text deltas decoded from a body byte stream.
pub struct ReadableStreamSource {
    body: Option<ByteStream>,
    decoder: Utf8StreamDecoder,
}

impl ReadableStreamSource {
    pub fn new<S>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self {
            body: Some(Box::pin(body)),
            decoder: Utf8StreamDecoder::new(),
        }
    }
}

#[async_trait]
impl DeltaSource for ReadableStreamSource {
    async fn next_delta(&mut self) -> Option<Result<String, ClientError>> {
        loop {
            let body = self.body.as_mut()?;
            match body.next().await {
                Some(Ok(chunk)) => {
                    let text = self.decoder.decode(&chunk);
                    // a chunk holding only part of a character decodes to nothing
                    if !text.is_empty() {
                        trace!(bytes = chunk.len(), "body chunk");
                        return Some(Ok(text));
                    }
                }
                Some(Err(err)) => {
                    self.body = None;
                    return Some(Err(err.into()));
                }
                None => {
                    debug!("response body closed");
                    self.body = None;
                    return self.decoder.finish().map(Ok);
                }
            }
        }
    }

    fn close(&mut self) {
        // dropping the body aborts the connection
        self.body = None;
        self.decoder = Utf8StreamDecoder::new();
    }
}
