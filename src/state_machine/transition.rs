//! Pure state transition function
//!
//! Folds one event into the conversation state. The function never performs
//! I/O: anything that must happen in the outside world is returned as an
//! [`Effect`]. An `Err` means the event is ignored and the caller keeps the
//! previous state.

use super::state::{
    ConvContext, ConversationState, Message, MessageStatus, OpenTurn, ToolCall, ToolResult,
    ToolStatus, TurnId, TurnPhase,
};
use super::{Effect, Event};
use crate::wire::{ChatRequest, StreamEvent, ToolError, WireMessage, WireRole};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error code recorded when a failed tool result carries no error
const UNKNOWN_TOOL_ERROR: &str = "UNKNOWN";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Reasons an event is ignored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A turn is already in progress")]
    TurnInProgress,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("No turn is open")]
    NoOpenTurn,
    #[error("Event belongs to turn {event_turn}, open turn is {open_turn}")]
    StaleTurn { event_turn: TurnId, open_turn: TurnId },
    #[error("Tool result for unknown call {0}")]
    UnknownToolCall(String),
    #[error("Tool call {0} already seen in this turn")]
    DuplicateToolCall(String),
}

impl TransitionError {
    /// True for events the service should never have sent
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TransitionError::UnknownToolCall(_) | TransitionError::DuplicateToolCall(_)
        )
    }

    /// True for events that merely arrived too late to matter
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            TransitionError::NoOpenTurn | TransitionError::StaleTurn { .. }
        )
    }
}

/// User-facing text written into a placeholder whose turn failed
pub fn failure_message(reason: &str) -> String {
    format!("Sorry, something went wrong while answering: {reason}")
}

/// Pure transition function
pub fn transition(
    state: &ConversationState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::UserMessage {
            text,
            user_message_id,
            assistant_message_id,
            timestamp,
        } => start_turn(
            state,
            context,
            &text,
            user_message_id,
            assistant_message_id,
            timestamp,
        ),

        Event::TransportOpened { turn } => {
            let mut next = state.clone();
            let open = open_turn_mut(&mut next, turn)?;
            open.phase = TurnPhase::Streaming;
            Ok(published(next))
        }

        Event::Stream { turn, event } => {
            let mut next = state.clone();
            open_turn_mut(&mut next, turn)?.phase = TurnPhase::Streaming;
            apply_stream_event(&mut next, event)?;
            Ok(published(next))
        }

        Event::TransportFailed { turn, error } => {
            let mut next = state.clone();
            open_turn_mut(&mut next, turn)?;
            fail_turn(&mut next, error.to_string());
            Ok(published(next))
        }

        Event::Abort => {
            let turn = state.turn.as_ref().ok_or(TransitionError::NoOpenTurn)?.id;
            let mut next = state.clone();
            if let Some(message) = next.open_message_mut() {
                message.status = MessageStatus::Cancelled;
            }
            close_turn(&mut next);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::AbortTransport { turn })
                .with_effect(Effect::PublishSnapshot))
        }

        Event::Clear => {
            let next = ConversationState {
                next_turn: state.next_turn,
                ..ConversationState::default()
            };
            let abort = state
                .turn
                .as_ref()
                .map(|open| Effect::AbortTransport { turn: open.id });
            Ok(TransitionResult::new(next)
                .with_effects(abort)
                .with_effect(Effect::PublishSnapshot))
        }
    }
}

fn published(state: ConversationState) -> TransitionResult {
    TransitionResult::new(state).with_effect(Effect::PublishSnapshot)
}

fn start_turn(
    state: &ConversationState,
    context: &ConvContext,
    text: &str,
    user_message_id: String,
    assistant_message_id: String,
    timestamp: DateTime<Utc>,
) -> Result<TransitionResult, TransitionError> {
    if state.turn.is_some() {
        return Err(TransitionError::TurnInProgress);
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(TransitionError::EmptyMessage);
    }

    let request = build_request(state, context, text);
    let turn = TurnId(state.next_turn);

    let mut next = state.clone();
    next.error = None;
    next.messages.push(Message::user(user_message_id, text, timestamp));
    next.messages.push(Message::placeholder(
        assistant_message_id.clone(),
        timestamp,
    ));
    next.turn = Some(OpenTurn {
        id: turn,
        message_id: assistant_message_id,
        phase: TurnPhase::Sending,
        tool_call_ids: vec![],
    });
    next.is_streaming = true;
    next.next_turn = state.next_turn + 1;

    Ok(published(next).with_effect(Effect::OpenTransport { turn, request }))
}

/// History replayed to the endpoint: settled messages plus the new one
fn build_request(state: &ConversationState, context: &ConvContext, text: &str) -> ChatRequest {
    let mut messages: Vec<WireMessage> = state
        .messages
        .iter()
        .filter(|m| m.status == MessageStatus::Complete && !m.content.trim().is_empty())
        .map(|m| WireMessage {
            role: m.role.into(),
            content: m.content.clone(),
        })
        .collect();
    messages.push(WireMessage {
        role: WireRole::User,
        content: text.to_string(),
    });
    ChatRequest {
        messages,
        user_id: context.user_id,
    }
}

/// The open turn, provided the event belongs to it
fn open_turn_mut(
    state: &mut ConversationState,
    turn: TurnId,
) -> Result<&mut OpenTurn, TransitionError> {
    let open = state.turn.as_mut().ok_or(TransitionError::NoOpenTurn)?;
    if open.id != turn {
        return Err(TransitionError::StaleTurn {
            event_turn: turn,
            open_turn: open.id,
        });
    }
    Ok(open)
}

fn apply_stream_event(
    state: &mut ConversationState,
    event: StreamEvent,
) -> Result<(), TransitionError> {
    match event {
        StreamEvent::AssistantToken { content } => {
            if let Some(message) = state.open_message_mut() {
                message.content.push_str(&content);
            }
        }

        StreamEvent::ToolCall {
            id,
            name,
            arguments,
        } => record_tool_call(state, id, name, arguments)?,

        StreamEvent::ToolResult {
            tool_call_id,
            name,
            success,
            result,
            error,
        } => record_tool_result(state, tool_call_id, name, success, result, error)?,

        StreamEvent::FinalMessage { content, .. } => {
            let ids = state
                .turn
                .as_ref()
                .map(|open| open.tool_call_ids.clone())
                .unwrap_or_default();
            if let Some(message) = state.open_message_mut() {
                message.content = content;
                message.tool_call_ids = if ids.is_empty() { None } else { Some(ids) };
                message.status = MessageStatus::Complete;
            }
            close_turn(state);
        }

        StreamEvent::Error { message, .. } => fail_turn(state, message),
    }
    Ok(())
}

fn record_tool_call(
    state: &mut ConversationState,
    id: String,
    name: String,
    arguments: Map<String, Value>,
) -> Result<(), TransitionError> {
    let open = state.turn.as_mut().ok_or(TransitionError::NoOpenTurn)?;
    if open.tool_call_ids.contains(&id) {
        return Err(TransitionError::DuplicateToolCall(id));
    }
    open.tool_call_ids.push(id.clone());
    state.tool_activity.calls.push(ToolCall {
        id,
        name,
        arguments,
        status: ToolStatus::Pending,
    });
    Ok(())
}

fn record_tool_result(
    state: &mut ConversationState,
    tool_call_id: String,
    name: String,
    success: bool,
    result: Option<Value>,
    error: Option<ToolError>,
) -> Result<(), TransitionError> {
    let known = state
        .turn
        .as_ref()
        .is_some_and(|open| open.tool_call_ids.contains(&tool_call_id));
    // Ids such as `call_1` repeat across turns; only this turn's calls count
    let index = state
        .tool_activity
        .calls
        .iter()
        .rposition(|call| call.id == tool_call_id)
        .filter(|_| known)
        .ok_or_else(|| TransitionError::UnknownToolCall(tool_call_id.clone()))?;

    state.tool_activity.calls[index].status = if success {
        ToolStatus::Success
    } else {
        ToolStatus::Error
    };

    let (result, error) = if success {
        (Some(result.unwrap_or(Value::Null)), None)
    } else {
        let error = error.unwrap_or_else(|| {
            ToolError::new(UNKNOWN_TOOL_ERROR, format!("Tool {name} failed"))
        });
        (None, Some(error))
    };
    state.tool_activity.results.push(ToolResult {
        tool_call_id,
        name,
        success,
        result,
        error,
    });
    Ok(())
}

fn fail_turn(state: &mut ConversationState, reason: String) {
    if let Some(message) = state.open_message_mut() {
        message.content = failure_message(&reason);
        message.status = MessageStatus::Failed;
    }
    state.error = Some(reason);
    close_turn(state);
}

fn close_turn(state: &mut ConversationState) {
    state.turn = None;
    state.is_streaming = false;
}
