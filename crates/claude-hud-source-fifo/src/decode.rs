//! Newline-delimited JSON framing.
//!
//! Bytes arrive in arbitrary chunks; [`LineDecoder`] buffers them until a
//! `\n` boundary and decodes each complete line on its own, so one bad
//! record never takes its neighbours down with it.

use claude_hud_core::types::HudEvent;

/// Pending partial line size above which the buffer is dropped.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record exceeds {limit} bytes without a newline ({len} buffered)")]
    Oversized { len: usize, limit: usize },
}

// ---------------------------------------------------------------------------
// LineDecoder
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line_bytes: usize,
    /// Set after an oversized line was dropped; the rest of that line is
    /// skipped up to the next newline.
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    /// Feed a chunk and return one result per complete non-blank line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<HudEvent, DecodeError>> {
        let mut out = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            self.buf.extend_from_slice(line);
            if let Some(result) = decode_line(&self.buf) {
                out.push(result);
            }
            self.buf.clear();
        }

        if self.discarding {
            return out;
        }

        self.buf.extend_from_slice(rest);
        if self.buf.len() > self.max_line_bytes {
            out.push(Err(DecodeError::Oversized {
                len: self.buf.len(),
                limit: self.max_line_bytes,
            }));
            self.buf.clear();
            self.buf.shrink_to_fit();
            self.discarding = true;
        }

        out
    }

    /// Drop any partial line (writer went away mid-record). Returns the
    /// number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.discarding = false;
        dropped
    }

    /// Bytes buffered towards the next line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Decode one line; blank lines yield `None`.
fn decode_line(line: &[u8]) -> Option<Result<HudEvent, DecodeError>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    if text.is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).map_err(DecodeError::from))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
