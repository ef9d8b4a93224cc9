//! Frame → event parsing

use crate::wire::StreamEvent;
use thiserror::Error;

/// Prefix of lines carrying an event payload
pub const DATA_PREFIX: &str = "data:";

/// Lines starting with this are comments (keep-alives)
pub const COMMENT_PREFIX: char = ':';

const DONE_SENTINEL: &str = "[DONE]";
const LOG_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Parse a single line of a frame.
///
/// Returns `Ok(None)` for lines that carry no event (blank, comment,
/// non-data fields, the `[DONE]` sentinel).
pub fn parse_data_line(line: &str) -> Result<Option<StreamEvent>, ParseError> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
        return Ok(None);
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim().is_empty() || payload.trim() == DONE_SENTINEL {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(payload)?))
}

/// Parse every event in a frame, in line order.
///
/// Malformed lines are logged and skipped; they never hide the valid
/// lines around them.
pub fn parse_frame(frame: &str) -> Vec<StreamEvent> {
    frame
        .lines()
        .filter_map(|line| match parse_data_line(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = %line.chars().take(LOG_PREVIEW_CHARS).collect::<String>(),
                    "Dropping malformed event line"
                );
                None
            }
        })
        .collect()
}
