//! Events that can occur in a conversation

use super::state::TurnId;
use crate::transport::TransportError;
use crate::wire::StreamEvent;
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User intents
    UserMessage {
        text: String,
        user_message_id: String,
        assistant_message_id: String,
        timestamp: DateTime<Utc>,
    },
    Abort,
    Clear,

    // Transport events, tagged with the turn that opened the transport
    TransportOpened {
        turn: TurnId,
    },
    Stream {
        turn: TurnId,
        event: StreamEvent,
    },
    TransportFailed {
        turn: TurnId,
        error: TransportError,
    },
}

impl Event {
    /// Build a user message with fresh ids and the current time
    pub fn user_message(text: impl Into<String>) -> Self {
        Event::UserMessage {
            text: text.into(),
            user_message_id: uuid::Uuid::new_v4().to_string(),
            assistant_message_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Turn this event belongs to, for transport events
    pub fn turn(&self) -> Option<TurnId> {
        match self {
            Event::TransportOpened { turn }
            | Event::Stream { turn, .. }
            | Event::TransportFailed { turn, .. } => Some(*turn),
            Event::UserMessage { .. } | Event::Abort | Event::Clear => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::Abort => "abort",
            Event::Clear => "clear",
            Event::TransportOpened { .. } => "transport_opened",
            Event::Stream { event, .. } => event.kind(),
            Event::TransportFailed { .. } => "transport_failed",
        }
    }
}
