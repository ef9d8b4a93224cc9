//! Conversation runtime executor

use crate::state_machine::{
    transition, ConvContext, ConversationState, Effect, Event, TransitionError, TurnId,
};
use crate::transport::{EventProducer, TransportError};
use crate::wire::ChatRequest;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Transport task currently feeding the runtime
struct ActiveTransport {
    turn: TurnId,
    cancel: CancellationToken,
}

/// Generic conversation runtime that can work with any producer
pub struct ConversationRuntime<P: EventProducer + 'static> {
    context: ConvContext,
    state: ConversationState,
    producer: Arc<P>,
    event_rx: mpsc::Receiver<Event>,
    /// Weak so that dropping every handle lets `run` finish
    event_tx: mpsc::WeakSender<Event>,
    snapshot_tx: watch::Sender<ConversationState>,
    transport: Option<ActiveTransport>,
}

impl<P: EventProducer + 'static> ConversationRuntime<P> {
    pub fn new(
        context: ConvContext,
        producer: P,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::WeakSender<Event>,
        snapshot_tx: watch::Sender<ConversationState>,
    ) -> Self {
        Self {
            context,
            state: ConversationState::new(),
            producer: Arc::new(producer),
            event_rx,
            event_tx,
            snapshot_tx,
            transport: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(conv_id = %self.context.conversation_id, "Starting conversation runtime");

        // Process events in a loop - no recursion
        while let Some(event) = self.event_rx.recv().await {
            self.process_event(event);
        }

        if let Some(active) = self.transport.take() {
            active.cancel.cancel();
        }
        tracing::info!(conv_id = %self.context.conversation_id, "Conversation runtime stopped");
    }

    fn process_event(&mut self, event: Event) {
        let kind = event.kind();
        let turn = event.turn();

        // Pure state transition
        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                log_ignored(&self.context.conversation_id, kind, turn, &e);
                return;
            }
        };

        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }

        // The transport of a closed turn has nothing left to deliver
        if self.state.turn.is_none() {
            if let Some(active) = self.transport.take() {
                active.cancel.cancel();
            }
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport { turn, request } => self.open_transport(turn, request),

            Effect::AbortTransport { turn } => match self.transport.take() {
                Some(active) if active.turn == turn => {
                    tracing::info!(conv_id = %self.context.conversation_id, turn = %turn, "Aborting transport");
                    active.cancel.cancel();
                }
                other => {
                    tracing::debug!(turn = %turn, "No transport running for aborted turn");
                    self.transport = other;
                }
            },

            Effect::PublishSnapshot => {
                self.snapshot_tx.send_replace(self.state.clone());
            }
        }
    }

    fn open_transport(&mut self, turn: TurnId, request: ChatRequest) {
        let Some(event_tx) = self.event_tx.upgrade() else {
            tracing::warn!(turn = %turn, "All handles dropped, not opening transport");
            return;
        };

        let cancel = CancellationToken::new();
        let previous = self.transport.replace(ActiveTransport {
            turn,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let producer = self.producer.clone();
        tokio::spawn(stream_turn(producer, turn, request, cancel, event_tx));
    }
}

fn log_ignored(conv_id: &str, kind: &str, turn: Option<TurnId>, error: &TransitionError) {
    let turn = turn.map(|t| t.to_string()).unwrap_or_default();
    if error.is_stale() {
        tracing::debug!(conv_id, event = kind, turn, reason = %error, "Dropping late event");
    } else if error.is_protocol_violation() {
        tracing::warn!(conv_id, event = kind, turn, reason = %error, "Ignoring protocol violation");
    } else {
        tracing::info!(conv_id, event = kind, reason = %error, "Ignoring request");
    }
}

/// Drive one turn's producer, feeding its events back to the runtime.
///
/// Every await races the cancellation token, biased toward cancellation
/// so nothing is forwarded once the turn was aborted.
async fn stream_turn<P: EventProducer>(
    producer: Arc<P>,
    turn: TurnId,
    request: ChatRequest,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<Event>,
) {
    tracing::debug!(turn = %turn, producer = producer.name(), "Opening transport (background)");

    let opened = tokio::select! {
        biased;

        () = cancel.cancelled() => {
            tracing::debug!(turn = %turn, "Transport cancelled before opening");
            return;
        }

        result = producer.open(&request, cancel.clone()) => result,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(error) => {
            let _ = event_tx.send(Event::TransportFailed { turn, error }).await;
            return;
        }
    };

    if event_tx.send(Event::TransportOpened { turn }).await.is_err() {
        return;
    }

    let mut forwarded = 0usize;
    loop {
        let next = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(turn = %turn, forwarded, "Transport cancelled");
                return;
            }

            next = stream.next() => next,
        };

        // A terminal event or a failure is the last thing this turn forwards
        let (event, closes) = match next {
            Some(Ok(event)) => {
                let terminal = event.is_terminal();
                (Event::Stream { turn, event }, terminal)
            }
            Some(Err(error)) => (Event::TransportFailed { turn, error }, true),
            None => (
                Event::TransportFailed {
                    turn,
                    error: TransportError::incomplete(),
                },
                true,
            ),
        };

        if event_tx.send(event).await.is_err() || closes {
            tracing::debug!(turn = %turn, forwarded, "Transport finished");
            return;
        }
        forwarded += 1;
    }
}
