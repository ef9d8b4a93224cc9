//! Runtime for executing conversations
//!
//! One task per conversation folds events into state and publishes
//! snapshots. The presentation layer talks to it only through a
//! [`ConversationHandle`].

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;

use crate::state_machine::{ConvContext, ConversationState, Event};
use crate::transport::EventProducer;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Conversation runtime has stopped")]
    Closed,
}

/// Handle to interact with a running conversation.
///
/// The runtime stops once every clone of its handle is dropped and no
/// transport is still streaming.
#[derive(Clone)]
pub struct ConversationHandle {
    conversation_id: String,
    event_tx: mpsc::Sender<Event>,
    snapshot_rx: watch::Receiver<ConversationState>,
}

impl ConversationHandle {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Start a turn. Ignored while another turn is in progress.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.dispatch(Event::user_message(text)).await
    }

    /// Discard the conversation, cancelling any open turn
    pub async fn clear(&self) -> Result<(), RuntimeError> {
        self.dispatch(Event::Clear).await
    }

    /// Cancel the open turn, keeping what has streamed so far
    pub async fn abort(&self) -> Result<(), RuntimeError> {
        self.dispatch(Event::Abort).await
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.snapshot_rx.clone()
    }

    /// Latest published state
    pub fn snapshot(&self) -> ConversationState {
        self.snapshot_rx.borrow().clone()
    }

    async fn dispatch(&self, event: Event) -> Result<(), RuntimeError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::Closed)
    }
}

/// Start a conversation runtime on the current tokio runtime
pub fn spawn_conversation<P>(context: ConvContext, producer: P) -> ConversationHandle
where
    P: EventProducer + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(ConversationState::new());
    let conversation_id = context.conversation_id.clone();

    let runtime = ConversationRuntime::new(
        context,
        producer,
        event_rx,
        event_tx.downgrade(),
        snapshot_tx,
    );
    tokio::spawn(runtime.run());

    ConversationHandle {
        conversation_id,
        event_tx,
        snapshot_rx,
    }
}
