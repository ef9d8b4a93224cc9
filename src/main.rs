//! Pharmacy Chat - terminal driver
//!
//! Reads user lines from stdin and renders the streamed conversation to
//! stdout. `/clear`, `/abort` and `/quit` are handled locally.

use pharmacy_chat::config::ChatConfig;
use pharmacy_chat::logging;
use pharmacy_chat::runtime::spawn_conversation;
use pharmacy_chat::state_machine::{ConvContext, ConversationState, MessageStatus, Role};
use pharmacy_chat::transport::{self, EventProducer};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::WatchStream, StreamExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("pharmacy_chat=warn");

    let config = ChatConfig::from_env();
    let producer = transport::build_producer(&config)?;
    tracing::info!(mode = %config.mode, producer = producer.name(), "Starting chat");

    let context =
        ConvContext::new(uuid::Uuid::new_v4().to_string()).with_user_id(config.user_id);
    let handle = spawn_conversation(context, producer);

    let mut snapshots = WatchStream::new(handle.subscribe());
    let renderer = tokio::spawn(async move {
        let mut renderer = Renderer::default();
        while let Some(state) = snapshots.next().await {
            if let Err(e) = renderer.render(&state) {
                tracing::warn!(error = %e, "Failed to write to stdout");
                break;
            }
        }
    });

    println!("Pharmacy assistant ({} mode). /clear, /abort, /quit", config.mode);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => handle.clear().await?,
            "/abort" => handle.abort().await?,
            text => handle.send(text).await?,
        }
    }

    drop(handle);
    renderer.await?;
    Ok(())
}

/// Prints what changed between consecutive snapshots
#[derive(Default)]
struct Renderer {
    message_id: Option<String>,
    shown: String,
    finished: bool,
    calls_seen: usize,
    results_seen: usize,
    cleared: bool,
}

impl Renderer {
    fn render(&mut self, state: &ConversationState) -> io::Result<()> {
        let mut out = io::stdout().lock();

        if state.is_empty() {
            if self.message_id.is_some() && !self.cleared {
                writeln!(out, "\n(conversation cleared)")?;
            }
            *self = Self {
                cleared: true,
                ..Self::default()
            };
            return out.flush();
        }
        self.cleared = false;

        let activity = &state.tool_activity;
        for call in activity.calls.iter().skip(self.calls_seen) {
            let args = serde_json::to_string(&call.arguments).unwrap_or_default();
            writeln!(out, "  [tool] {}({args})", call.name)?;
        }
        self.calls_seen = activity.calls.len();

        for result in activity.results.iter().skip(self.results_seen) {
            let outcome = if result.success { "ok" } else { "failed" };
            writeln!(out, "  [result] {} {outcome}", result.name)?;
        }
        self.results_seen = activity.results.len();

        let Some(message) = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
        else {
            return out.flush();
        };

        if self.message_id.as_deref() != Some(message.id.as_str()) {
            self.message_id = Some(message.id.clone());
            self.shown.clear();
            self.finished = false;
            write!(out, "assistant> ")?;
        }
        if self.finished {
            return out.flush();
        }

        match message.content.strip_prefix(self.shown.as_str()) {
            Some(delta) => write!(out, "{delta}")?,
            // Final content replaced what streamed
            None => write!(out, "\n{}", message.content)?,
        }
        self.shown.clone_from(&message.content);

        match message.status {
            MessageStatus::Streaming => {}
            MessageStatus::Complete | MessageStatus::Failed => {
                self.finished = true;
                writeln!(out)?;
            }
            MessageStatus::Cancelled => {
                self.finished = true;
                writeln!(out, " [cancelled]")?;
            }
        }

        out.flush()
    }
}
