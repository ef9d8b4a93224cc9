//! Mock implementations for testing
//!
//! These mocks enable integration testing of the runtime without real I/O.

use crate::runtime::{spawn_conversation, ConversationHandle};
use crate::state_machine::{ConvContext, ConversationState};
use crate::transport::{EventProducer, EventStream, TransportError};
use crate::wire::{ChatRequest, StreamEvent};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Producer
// ============================================================================

type Outcome = Result<Vec<Result<StreamEvent, TransportError>>, TransportError>;

/// Producer that answers each request with the next queued outcome
pub struct MockProducer {
    outcomes: Mutex<VecDeque<Outcome>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

#[allow(dead_code)]
impl MockProducer {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a turn that streams `events` and then ends
    pub fn queue_events(&self, events: Vec<StreamEvent>) {
        self.queue_stream(events.into_iter().map(Ok).collect());
    }

    /// Queue a turn whose stream may carry errors
    pub fn queue_stream(&self, items: Vec<Result<StreamEvent, TransportError>>) {
        self.outcomes.lock().unwrap().push_back(Ok(items));
    }

    /// Queue a turn that fails to open
    pub fn queue_open_error(&self, error: TransportError) {
        self.outcomes.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventProducer for MockProducer {
    async fn open(
        &self,
        request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let items = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::unavailable("No queued outcome")))?;
        Ok(futures::stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Gated Producer
// ============================================================================

/// Producer whose single stream is fed by the test through a [`StreamFeeder`].
///
/// The stream ignores cancellation, like a transport that keeps delivering
/// bytes after the client gave up, so the runtime must drop late events.
pub struct GatedProducer {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<StreamEvent, TransportError>>>>,
}

/// Test side of a [`GatedProducer`]
pub struct StreamFeeder {
    tx: mpsc::UnboundedSender<Result<StreamEvent, TransportError>>,
}

#[allow(dead_code)]
impl StreamFeeder {
    /// Deliver an event; false once the stream was dropped
    pub fn push(&self, event: StreamEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    pub fn fail(&self, error: TransportError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

impl GatedProducer {
    pub fn new() -> (Self, StreamFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            StreamFeeder { tx },
        )
    }
}

#[async_trait]
impl EventProducer for GatedProducer {
    async fn open(
        &self,
        _request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<EventStream, TransportError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::unavailable("Gated stream already used"))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

/// Helper for driving a spawned conversation with minimal boilerplate
pub struct TestRuntime {
    pub handle: ConversationHandle,
    snapshots: watch::Receiver<ConversationState>,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new<P: EventProducer + 'static>(producer: P) -> Self {
        let handle = spawn_conversation(ConvContext::new("test-conv"), producer);
        let snapshots = handle.subscribe();
        Self { handle, snapshots }
    }

    pub async fn send(&self, text: &str) {
        self.handle.send(text).await.expect("Failed to send message");
    }

    /// Wait until `predicate` holds for the published state
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        predicate: impl FnMut(&ConversationState) -> bool,
    ) -> Option<ConversationState> {
        match tokio::time::timeout(timeout, self.snapshots.wait_for(predicate)).await {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        }
    }

    /// Wait until `turns` turns have been started and the last one closed
    pub async fn wait_for_turns(&mut self, turns: u64) -> ConversationState {
        self.wait_for(Duration::from_secs(5), |s| s.next_turn >= turns && !s.is_streaming)
            .await
            .expect("Timed out waiting for turn to finish")
    }

    pub fn snapshot(&self) -> ConversationState {
        self.handle.snapshot()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{MessageStatus, Role, ToolStatus};
    use crate::transport::{HttpProducer, ScriptedProducer, TransportErrorKind};

    const WAIT: Duration = Duration::from_secs(5);

    fn final_message(content: &str) -> StreamEvent {
        StreamEvent::FinalMessage {
            content: content.to_string(),
            tool_calls: vec![],
            tool_results: vec![],
        }
    }

    fn assert_aspirin_answer(state: &ConversationState) {
        assert_eq!(state.tool_activity.calls.len(), 1);
        assert_eq!(state.tool_activity.calls[0].name, "check_medication_stock");
        assert_eq!(state.tool_activity.calls[0].status, ToolStatus::Success);
        assert_eq!(state.tool_activity.results.len(), 1);
        assert!(state.tool_activity.results[0].success);

        let answer = state.messages.last().unwrap();
        assert_eq!(answer.role, Role::Assistant);
        assert_eq!(answer.status, MessageStatus::Complete);
        assert_eq!(answer.tool_call_ids, Some(vec!["call_1".to_string()]));
        for quantity in ["150", "25", "10"] {
            assert!(answer.content.contains(quantity), "{} lacks {quantity}", answer.content);
        }
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_mock_producer() {
        let mock = MockProducer::new();
        mock.queue_events(vec![StreamEvent::token("Hello")]);

        let request = ChatRequest {
            messages: vec![],
            user_id: None,
        };
        let stream = mock.open(&request, CancellationToken::new()).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(mock.recorded_requests().len(), 1);

        // Queue exhausted
        assert!(mock.open(&request, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_aspirin_stock_scenario() {
        let mut runtime = TestRuntime::new(ScriptedProducer::new(Duration::ZERO));
        runtime.send("Is aspirin in stock?").await;

        let state = runtime.wait_for_turns(1).await;
        assert_eq!(state.messages.len(), 2);
        assert_aspirin_answer(&state);
    }

    #[tokio::test]
    async fn test_refill_calls_tools_before_first_token() {
        let mut runtime = TestRuntime::new(ScriptedProducer::new(Duration::from_millis(5)));
        runtime.send("I need to refill my prescription").await;

        let first_text = runtime
            .wait_for(WAIT, |s| {
                s.open_message().is_some_and(|m| !m.content.is_empty())
                    || (s.next_turn > 0 && !s.is_streaming)
            })
            .await
            .unwrap();
        let names: Vec<_> = first_text
            .tool_activity
            .calls
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["list_user_prescriptions", "request_prescription_refill"]
        );

        let state = runtime.wait_for_turns(1).await;
        assert_eq!(state.tool_activity.calls.len(), 2);
        assert!(state
            .tool_activity
            .calls
            .iter()
            .all(|c| c.status == ToolStatus::Success));
    }

    #[tokio::test]
    async fn test_send_while_streaming_is_noop() {
        let (producer, feeder) = GatedProducer::new();
        let mut runtime = TestRuntime::new(producer);

        runtime.send("Is aspirin in stock?").await;
        runtime.wait_for(WAIT, |s| s.is_streaming).await.unwrap();

        runtime.send("And ibuprofen?").await;
        feeder.push(StreamEvent::token("Checking"));
        let state = runtime
            .wait_for(WAIT, |s| s.open_message().is_some_and(|m| m.content == "Checking"))
            .await
            .unwrap();

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content, "Is aspirin in stock?");
        assert_eq!(state.next_turn, 1);
    }

    #[tokio::test]
    async fn test_clear_mid_stream_drops_late_events() {
        let (producer, feeder) = GatedProducer::new();
        let mut runtime = TestRuntime::new(producer);

        runtime.send("Is aspirin in stock?").await;
        feeder.push(StreamEvent::token("Aspirin "));
        runtime
            .wait_for(WAIT, |s| s.open_message().is_some_and(|m| !m.content.is_empty()))
            .await
            .unwrap();

        runtime.handle.clear().await.unwrap();
        let cleared = runtime.wait_for(WAIT, |s| s.messages.is_empty()).await.unwrap();
        assert!(!cleared.is_streaming);
        assert!(cleared.error.is_none());

        // Events for the aborted turn keep coming
        feeder.push(StreamEvent::token("is in stock"));
        feeder.push(final_message("Aspirin is in stock"));
        feeder.fail(TransportError::network("late failure"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = runtime.snapshot();
        assert_eq!(state, cleared);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_transport_released_after_final_message() {
        let (producer, feeder) = GatedProducer::new();
        let mut runtime = TestRuntime::new(producer);

        runtime.send("Is aspirin in stock?").await;
        feeder.push(final_message("Aspirin is in stock"));
        runtime.wait_for_turns(1).await;

        // The server keeps the connection open, but nobody reads it anymore
        let released = tokio::time::timeout(WAIT, async {
            while feeder.push(StreamEvent::token("late")) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(released.is_ok());

        let mut snapshots = runtime.handle.subscribe();
        snapshots.borrow_and_update();
        drop(runtime);
        let changed = tokio::time::timeout(WAIT, snapshots.changed()).await.unwrap();
        assert!(changed.is_err());
        drop(feeder);
    }

    #[tokio::test]
    async fn test_abort_keeps_partial_content() {
        let (producer, feeder) = GatedProducer::new();
        let mut runtime = TestRuntime::new(producer);

        runtime.send("Tell me about omeprazole").await;
        feeder.push(StreamEvent::token("Omeprazole is"));
        runtime
            .wait_for(WAIT, |s| s.open_message().is_some_and(|m| !m.content.is_empty()))
            .await
            .unwrap();

        runtime.handle.abort().await.unwrap();
        let state = runtime.wait_for(WAIT, |s| !s.is_streaming).await.unwrap();
        let answer = state.messages.last().unwrap();
        assert_eq!(answer.content, "Omeprazole is");
        assert_eq!(answer.status, MessageStatus::Cancelled);
        assert!(state.error.is_none());

        // The next send is accepted again
        runtime.send("Thanks").await;
        let state = runtime.wait_for_turns(2).await;
        assert_eq!(state.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_before_any_token() {
        let mock = MockProducer::new();
        mock.queue_open_error(TransportError::network("Connection refused"));
        let mut runtime = TestRuntime::new(mock);

        runtime.send("Is aspirin in stock?").await;
        let state = runtime.wait_for_turns(1).await;

        let assistants: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert!(assistants[0].content.contains("Connection refused"));
        assert_eq!(assistants[0].status, MessageStatus::Failed);
        assert!(!state.is_streaming);
        assert_eq!(state.error.as_deref(), Some("Connection refused"));
    }

    #[tokio::test]
    async fn test_stream_without_terminal_is_incomplete() {
        let mock = MockProducer::new();
        mock.queue_events(vec![StreamEvent::token("Aspirin is")]);
        let mut runtime = TestRuntime::new(mock);

        runtime.send("Is aspirin in stock?").await;
        let state = runtime.wait_for_turns(1).await;

        assert_eq!(
            state.error.as_deref(),
            Some(TransportError::incomplete().message.as_str())
        );
        assert_eq!(state.messages[1].status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_mid_stream_failure() {
        let mock = MockProducer::new();
        mock.queue_stream(vec![
            Ok(StreamEvent::token("Aspirin")),
            Err(TransportError::network("connection reset")),
        ]);
        let mut runtime = TestRuntime::new(mock);

        runtime.send("Is aspirin in stock?").await;
        let state = runtime.wait_for_turns(1).await;
        assert_eq!(state.error.as_deref(), Some("connection reset"));
        assert!(!state.messages[1].content.starts_with("Aspirin"));
    }

    #[tokio::test]
    async fn test_request_carries_history() {
        let mock = Arc::new(MockProducer::new());
        mock.queue_events(vec![final_message("Aspirin is in stock.")]);
        mock.queue_open_error(TransportError::status(503, ""));
        mock.queue_events(vec![final_message("Yes.")]);
        let mut runtime = TestRuntime::new(mock.clone());

        runtime.send("Is aspirin in stock?").await;
        runtime.wait_for_turns(1).await;
        runtime.send("Downtown too?").await;
        runtime.wait_for_turns(2).await;
        runtime.send("And the airport?").await;
        runtime.wait_for_turns(3).await;

        let requests = mock.recorded_requests();
        assert_eq!(requests.len(), 3);
        let last: Vec<_> = requests[2]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        // The failed turn's placeholder is not replayed
        assert_eq!(
            last,
            vec![
                "Is aspirin in stock?",
                "Aspirin is in stock.",
                "Downtown too?",
                "And the airport?"
            ]
        );
    }

    #[tokio::test]
    async fn test_runtime_stops_when_handles_dropped() {
        let runtime = TestRuntime::new(MockProducer::new());
        let mut snapshots = runtime.handle.subscribe();
        drop(runtime);

        let changed = tokio::time::timeout(WAIT, snapshots.changed()).await.unwrap();
        assert!(changed.is_err());
    }

    #[tokio::test]
    async fn test_http_producer_against_mock_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = crate::api::create_router(crate::api::AppState::new(Arc::new(
            ScriptedProducer::new(Duration::ZERO),
        )));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let producer =
            HttpProducer::new(format!("http://{addr}/api/chat"), Duration::from_secs(2)).unwrap();
        let mut runtime = TestRuntime::new(producer);
        runtime.send("Is aspirin in stock?").await;

        let state = runtime.wait_for_turns(1).await;
        assert_aspirin_answer(&state);
    }

    #[tokio::test]
    async fn test_http_status_error_surfaces() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = crate::api::create_router(crate::api::AppState::new(Arc::new(
            ScriptedProducer::new(Duration::ZERO),
        )));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let producer =
            HttpProducer::new(format!("http://{addr}/api/missing"), Duration::from_secs(2))
                .unwrap();
        let request = ChatRequest {
            messages: vec![],
            user_id: None,
        };
        let err = producer
            .open(&request, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, TransportErrorKind::Status);
        assert_eq!(err.status, Some(404));
    }
}
