//! Decode and parse a frame payload in one step.

use super::decode::{Compression, decode_payload};
use super::error::ParseError;
use super::parse::{ParseContext, parse_message};
use crate::domain::VehicleEvent;

/// Events recovered from one frame.
#[derive(Debug, Clone, Default)]
pub struct ProcessedFrame {
    pub events: Vec<VehicleEvent>,
    /// Report elements with a tag outside the known event set.
    pub ignored: Vec<String>,
    pub compression: Option<Compression>,
}

/// Why a frame yielded nothing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Decoding found no KV6 markup in the payload
    #[error("no KV6 markup in {len}-byte payload")]
    Undecodable { len: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Run a payload through the decoder and the parser.
pub fn process_frame(payload: &[u8], ctx: &ParseContext) -> Result<ProcessedFrame, FrameError> {
    let decoded = decode_payload(payload);
    if !decoded.has_marker() {
        return Err(FrameError::Undecodable { len: payload.len() });
    }

    let parsed = parse_message(&decoded.text, ctx)?;
    Ok(ProcessedFrame {
        events: parsed.events,
        ignored: parsed.ignored,
        compression: decoded.compression,
    })
}
