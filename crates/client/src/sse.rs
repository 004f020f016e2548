//! Incremental decoding of a Server-Sent-Events body.
//!
//! The body arrives in arbitrary byte chunks. [`FrameBuffer`] carries the
//! not-yet-terminated tail from one read to the next and hands back
//! every frame completed by the latest chunk. It knows nothing about the
//! transport, so chunk-boundary handling can be exercised directly.

use crate::messages::{parse_update, StreamUpdate};

/// Why a `data: ` frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame is not a valid update: {0}")]
    Json(#[from] serde_json::Error),
}

/// Separator between frames (a blank line).
const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Prefix that marks a frame as carrying a JSON payload.
pub const DATA_PREFIX: &str = "data: ";

/// Accumulator of bytes that do not yet form a complete frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    ///
    /// Bytes after the last delimiter stay buffered. Frames are returned
    /// as raw bytes; UTF-8 is checked by [`parse_frame`] once a frame is
    /// complete, so a multi-byte character split across chunks survives
    /// intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        // A delimiter may straddle the previous chunk boundary.
        let search_from = self.pending.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = search_from;

        while let Some(pos) = find_delimiter(&self.pending[cursor..]) {
            let end = cursor + pos;
            frames.push(self.pending[start..end].to_vec());
            start = end + FRAME_DELIMITER.len();
            cursor = start;
        }

        self.pending.drain(..start);
        frames
    }

    /// Bytes received after the last complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop any partially received frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

/// Decode a single frame.
///
/// Returns `None` for frames that do not start with `data: ` (comments,
/// keep-alives, other fields); otherwise the decoded remainder, which
/// fails when it is not UTF-8 or not a valid update.
pub fn parse_frame(frame: &[u8]) -> Option<Result<StreamUpdate, FrameError>> {
    let payload = frame.strip_prefix(DATA_PREFIX.as_bytes())?;
    Some(
        std::str::from_utf8(payload)
            .map_err(FrameError::from)
            .and_then(|text| parse_update(text).map_err(FrameError::from)),
    )
}
