//! Event producers
//!
//! A producer turns a chat request into an ordered stream of
//! [`StreamEvent`]s. The live producer reads the chat endpoint over HTTP;
//! the scripted producer replays canned sequences offline. The runtime only
//! ever sees the [`EventProducer`] trait.

mod error;
pub mod http;
pub mod scripted;

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpProducer;
pub use scripted::ScriptedProducer;

use crate::config::{ChatConfig, ProducerMode};
use crate::wire::{ChatRequest, StreamEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ordered events of one turn; ends when the producer has nothing more
pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// Anything that can answer a chat request with a stream of events
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Start answering `request`. The returned stream stops early once
    /// `cancel` fires.
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError>;

    /// Short name used in log fields
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: EventProducer + ?Sized> EventProducer for Arc<T> {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        (**self).open(request, cancel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logging wrapper for producers
pub struct LoggingProducer {
    inner: Arc<dyn EventProducer>,
    name: String,
}

impl LoggingProducer {
    pub fn new(inner: Arc<dyn EventProducer>) -> Self {
        let name = inner.name().to_string();
        Self { inner, name }
    }
}

#[async_trait]
impl EventProducer for LoggingProducer {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        let start = std::time::Instant::now();
        let result = self.inner.open(request, cancel).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    producer = %self.name,
                    duration_ms = %duration.as_millis(),
                    history = request.messages.len(),
                    "Event stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    producer = %self.name,
                    duration_ms = %duration.as_millis(),
                    kind = ?e.kind,
                    error = %e.message,
                    "Failed to open event stream"
                );
            }
        }

        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the producer selected by `config.mode`
pub fn build_producer(config: &ChatConfig) -> Result<Arc<dyn EventProducer>, TransportError> {
    let inner: Arc<dyn EventProducer> = match config.mode {
        ProducerMode::Live => Arc::new(HttpProducer::new(
            config.endpoint.clone(),
            config.connect_timeout,
        )?),
        ProducerMode::Scripted => Arc::new(ScriptedProducer::new(config.scripted_delay)),
    };
    tracing::info!(mode = %config.mode, producer = inner.name(), "Producer configured");
    Ok(Arc::new(LoggingProducer::new(inner)))
}
