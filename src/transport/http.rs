//! Live producer: streams events from the chat endpoint over HTTP

use super::{EventProducer, EventStream, TransportError};
use crate::sse::{parse_frame, FrameDecoder};
use crate::wire::{ChatRequest, StreamEvent};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const EVENT_STREAM: &str = "text/event-stream";

/// Producer backed by `POST {endpoint}` returning server-sent events
pub struct HttpProducer {
    client: Client,
    endpoint: String,
}

impl HttpProducer {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        // No overall timeout: a turn may legitimately stream for minutes
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventProducer for HttpProducer {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        tracing::debug!(endpoint = %self.endpoint, "Sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, EVENT_STREAM)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), &body));
        }

        Ok(decode_events(response.bytes_stream().boxed())
            .take_until(cancel.cancelled_owned())
            .boxed())
    }

    fn name(&self) -> &str {
        "http"
    }
}

struct DecodeState<S> {
    chunks: S,
    decoder: FrameDecoder,
    ready: VecDeque<StreamEvent>,
    received_bytes: bool,
    done: bool,
}

/// Decode a chunked SSE body into events.
///
/// A body that ends without carrying a single byte yields one
/// `EmptyBody` error. A chunk error ends the stream after reporting it.
pub fn decode_events<S, B, E>(chunks: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<TransportError> + Send + 'static,
{
    let state = DecodeState {
        chunks,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        received_bytes: false,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let bytes = chunk.as_ref();
                    state.received_bytes |= !bytes.is_empty();
                    for frame in state.decoder.feed(bytes) {
                        state.ready.extend(parse_frame(&frame));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.done = true;
                    let discarded = state.decoder.finish();
                    if discarded > 0 {
                        tracing::warn!(discarded, "Discarding partial frame at end of stream");
                    }
                    if !state.received_bytes {
                        return Some((Err(TransportError::empty_body()), state));
                    }
                }
            }
        }
    })
    .boxed()
}
