//! Server-Sent Events decoding
//!
//! Bytes arrive in arbitrary chunks; [`FrameDecoder`] turns them into
//! blank-line delimited frames and [`parse_frame`] turns each frame into
//! typed [`StreamEvent`](crate::wire::StreamEvent)s.

mod decoder;
mod parser;


pub use decoder::FrameDecoder;
pub use parser::{parse_data_line, parse_frame, ParseError, COMMENT_PREFIX, DATA_PREFIX};
