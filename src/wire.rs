//! Wire format shared by the chat endpoint and its consumers
//!
//! Each SSE `data:` line carries one JSON object tagged by `"type"`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Events streamed by the assistant endpoint during one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of assistant text, appended to the open message
    AssistantToken { content: String },

    /// The assistant invoked a tool
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },

    /// Outcome of an earlier tool call, correlated by `tool_call_id`
    ToolResult {
        tool_call_id: String,
        name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ToolError>,
    },

    /// Authoritative final content plus the trace of tool activity
    FinalMessage {
        #[serde(default, deserialize_with = "null_as_empty")]
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCallTrace>,
        #[serde(default)]
        tool_results: Vec<ToolResultTrace>,
    },

    /// The service gave up on this turn
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl StreamEvent {
    /// Terminal events close the turn they belong to
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::FinalMessage { .. } | StreamEvent::Error { .. })
    }

    /// Short tag used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::AssistantToken { .. } => "assistant_token",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::FinalMessage { .. } => "final_message",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::AssistantToken {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            code: code.map(str::to_string),
        }
    }
}

/// Structured tool failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Tool call as recorded in the final message trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallTrace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Tool result as recorded in the final message trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultTrace {
    pub tool_call_id: String,
    pub name: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
}

/// Role tag for messages sent to the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

/// One prior message in a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl ChatRequest {
    /// Text of the most recent user message, if any
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == WireRole::User)
            .map(|m| m.content.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
