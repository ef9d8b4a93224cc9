//! Conversation state types

use crate::wire::{ToolError, WireRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl From<Role> for WireRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::System => WireRole::System,
        }
    }
}

/// Lifecycle of a message's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Open assistant placeholder, content still growing
    Streaming,
    Complete,
    /// Content replaced by a failure notice
    Failed,
    /// Turn aborted by the user; content is whatever had arrived
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Tool calls triggered while producing this (assistant) message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_ids: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    pub fn user(id: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: text.into(),
            tool_call_ids: None,
            timestamp,
            status: MessageStatus::Complete,
        }
    }

    /// Empty assistant message that collects the streamed reply
    pub fn placeholder(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: String::new(),
            tool_call_ids: None,
            timestamp,
            status: MessageStatus::Streaming,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

// ============================================================================
// Tool activity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub status: ToolStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub success: bool,
    /// Present iff `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present iff not `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolActivity {
    pub calls: Vec<ToolCall>,
    pub results: Vec<ToolResult>,
}

// ============================================================================
// Turns
// ============================================================================

/// Identifier of one request/response cycle, monotonic per conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the turn controller is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    /// Request issued, transport not yet open
    Sending,
    /// Reading the response stream
    Streaming,
}

/// Bookkeeping for the turn in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTurn {
    pub id: TurnId,
    /// The assistant placeholder this turn writes into
    pub message_id: String,
    pub phase: TurnPhase,
    /// Tool call ids in the order first seen
    pub tool_call_ids: Vec<String>,
}

// ============================================================================
// Conversation
// ============================================================================

/// Everything the presentation layer renders.
///
/// `is_streaming` always equals `turn.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub tool_activity: ToolActivity,
    pub is_streaming: bool,
    pub error: Option<String>,
    pub turn: Option<OpenTurn>,
    /// Next turn id to hand out; survives `clear`
    pub next_turn: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.turn.as_ref().map_or(TurnPhase::Idle, |turn| turn.phase)
    }

    pub fn open_message(&self) -> Option<&Message> {
        let turn = self.turn.as_ref()?;
        self.messages.iter().rev().find(|m| m.id == turn.message_id)
    }

    pub(crate) fn open_message_mut(&mut self) -> Option<&mut Message> {
        let id = self.turn.as_ref()?.message_id.clone();
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.tool_activity.calls.is_empty()
            && self.tool_activity.results.is_empty()
    }
}

/// Static context for a conversation
#[derive(Debug, Clone, Default)]
pub struct ConvContext {
    pub conversation_id: String,
    /// Forwarded to the endpoint so tools can act on the user's behalf
    pub user_id: Option<i64>,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<i64>) -> Self {
        self.user_id = user_id;
        self
    }
}
