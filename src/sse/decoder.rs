//! Incremental frame decoder

/// Splits a chunked byte stream into complete SSE frames.
///
/// A frame is the text preceding a blank line. Multi-byte characters
/// split across chunks are held back until their remaining bytes arrive,
/// so Hebrew text survives any chunking.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Leading bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    buffer: String,
    /// Start of the unterminated line at the end of `buffer`
    line_start: usize,
    /// Bytes of `buffer` already searched for a newline
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_utf8(chunk);
        self.drain_frames()
    }

    /// Drop whatever partial frame is buffered, returning its size in bytes
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len() + self.pending.len();
        self.buffer.clear();
        self.pending.clear();
        self.line_start = 0;
        self.scanned = 0;
        discarded
    }

    /// True when no partial data is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.pending.is_empty()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(chunk);

        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        // Invalid sequence in the middle of the input
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = after.get(len..).unwrap_or_default();
                        }
                        // Truncated sequence at the end; wait for more bytes
                        None => {
                            self.pending = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut frame_start = 0;
        let mut line_start = self.line_start;
        let mut search_from = self.scanned.max(line_start);

        while let Some(offset) = self.buffer.get(search_from..).and_then(|rest| rest.find('\n')) {
            let line_end = search_from + offset;
            let line = self.buffer.get(line_start..line_end).unwrap_or_default();

            if line.trim_end_matches('\r').is_empty() {
                let frame = self
                    .buffer
                    .get(frame_start..line_start)
                    .unwrap_or_default()
                    .trim_end_matches(['\r', '\n']);
                if !frame.is_empty() {
                    frames.push(frame.to_string());
                }
                frame_start = line_end + 1;
            }
            line_start = line_end + 1;
            search_from = line_start;
        }

        if frame_start > 0 {
            self.buffer.drain(..frame_start);
        }
        self.line_start = line_start - frame_start;
        self.scanned = self.buffer.len();
        frames
    }
}
