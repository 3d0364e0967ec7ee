//! Event-stream wire framing shared by the relay and the consumer
//!
//! The relay emits a line-oriented text stream: each frame is a `data:`
//! line carrying a JSON-encoded string payload, terminated by a blank
//! line. The final frame carries the literal `[DONE]` sentinel. JSON
//! encoding the payload keeps newlines and quotes inside a delta from
//! breaking the framing.
//!
//! Decoding is sans-IO: [`FrameDecoder`] accepts raw byte chunks in any
//! split (including mid-character) and yields tagged [`FramePayload`]
//! values, so the read loop in `client::consumer` stays trivial and the
//! decoder is testable without sockets.

use serde_json::Value;

/// Distinguished payload value signaling end of stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Field prefix carried by every meaningful frame
const DATA_PREFIX: &str = "data:";

/// Blank-line frame terminator
const FRAME_TERMINATOR: &str = "\n\n";

/// Encode one delta as a complete frame
///
/// # Examples
///
/// ```
/// use docent::sse::encode_delta;
///
/// assert_eq!(encode_delta("hi"), "data: \"hi\"\n\n");
/// assert_eq!(encode_delta("a\nb"), "data: \"a\\nb\"\n\n");
/// ```
pub fn encode_delta(text: &str) -> String {
    // Value::String's Display is infallible, unlike serde_json::to_string
    format!(
        "{} {}{}",
        DATA_PREFIX,
        Value::String(text.to_owned()),
        FRAME_TERMINATOR
    )
}

/// Encode the terminal sentinel frame
pub fn encode_done() -> String {
    encode_delta(DONE_SENTINEL)
}

/// Tagged decode of one frame payload
///
/// Every payload is classified before dispatch instead of shape-sniffed at
/// the call site: a JSON string equal to the sentinel is `Terminal`, any
/// other JSON string is a `Delta`, and anything that fails to decode is
/// `Unrecognized` (a heartbeat, never an error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// One incremental fragment of generated text
    Delta(String),
    /// The end-of-stream sentinel
    Terminal,
    /// Keep-alive noise from upstream or an intermediary; skipped silently
    Unrecognized,
}

/// Decode a raw payload string into its tagged form
///
/// # Examples
///
/// ```
/// use docent::sse::{decode_payload, FramePayload};
///
/// assert_eq!(decode_payload("\"hi\""), FramePayload::Delta("hi".into()));
/// assert_eq!(decode_payload("\"[DONE]\""), FramePayload::Terminal);
/// assert_eq!(decode_payload(": ping"), FramePayload::Unrecognized);
/// ```
pub fn decode_payload(raw: &str) -> FramePayload {
    match serde_json::from_str::<String>(raw) {
        Ok(s) if s == DONE_SENTINEL => FramePayload::Terminal,
        Ok(s) => FramePayload::Delta(s),
        Err(_) => FramePayload::Unrecognized,
    }
}

/// Incremental frame decoder
///
/// Feed it byte chunks as they arrive; it buffers an incomplete UTF-8
/// tail across chunk boundaries, splits completed text on the blank-line
/// terminator, strips the `data:` prefix, and classifies each payload.
/// Frames without the `data:` prefix are dropped entirely, matching the
/// reference client.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes not yet decodable as UTF-8 (at most one partial character,
    /// unless the input itself is malformed)
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    text: String,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one chunk of raw bytes, returning all frames completed by it
    ///
    /// Payloads are returned in arrival order. A frame split across any
    /// number of chunks is returned exactly once, when its terminator
    /// arrives.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FramePayload> {
        self.pending.extend_from_slice(chunk);
        self.drain_utf8();
        self.split_frames()
    }

    /// Text buffered but not yet terminated (exposed for tests)
    pub fn buffered(&self) -> &str {
        &self.text
    }

    /// Move every complete UTF-8 prefix of `pending` into `text`
    ///
    /// An incomplete trailing sequence stays in `pending` for the next
    /// chunk; a genuinely invalid sequence becomes U+FFFD, matching
    /// lossy text decoding on the reference client.
    fn drain_utf8(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&self.pending[..valid]) {
                        self.text.push_str(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // incomplete tail; wait for more bytes
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn split_frames(&mut self) -> Vec<FramePayload> {
        let mut out = Vec::new();
        while let Some(pos) = self.text.find(FRAME_TERMINATOR) {
            let frame: String = self.text.drain(..pos + FRAME_TERMINATOR.len()).collect();
            if let Some(payload) = parse_frame(&frame) {
                out.push(payload);
            }
        }
        out
    }
}

/// Parse one terminated frame into its payload, if it carries one
fn parse_frame(frame: &str) -> Option<FramePayload> {
    let line = frame.trim();
    if !line.starts_with(DATA_PREFIX) {
        return None;
    }
    let payload = line[DATA_PREFIX.len()..].trim();
    Some(decode_payload(payload))
}
