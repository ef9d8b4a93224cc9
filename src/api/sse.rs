//! Server-Sent Events support

use crate::transport::EventStream;
use crate::wire::StreamEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Convert a producer stream to an SSE response.
///
/// `cancel` fires when the response is dropped, which is how a client
/// disconnect reaches the producer.
pub fn sse_stream(
    events: EventStream,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = cancel.drop_guard();

    let stream = events.map(move |item| {
        let _guard = &guard;
        let event = item.unwrap_or_else(|e| {
            tracing::error!(kind = ?e.kind, error = %e.message, "Producer failed mid-stream");
            StreamEvent::error(
                format!("Internal server error: {}", e.message),
                Some(INTERNAL_ERROR),
            )
        });
        Ok(stream_event_to_axum(&event))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn stream_event_to_axum(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().event(event.kind()).data(data),
        Err(e) => Event::default().event("error").data(
            json!({
                "type": "error",
                "message": format!("Failed to encode event: {e}"),
                "code": INTERNAL_ERROR,
            })
            .to_string(),
        ),
    }
}
