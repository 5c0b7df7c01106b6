//!
//! Event-stream frames written to the caller in streaming mode.
//!
//! The relay forwards upstream frames byte-for-byte and adds three frames of its own:
//! a keep-alive ping before the upstream call, a synthetic content frame on failure,
//! and a single terminal `data: [DONE]` sentinel. [`FrameSplitter`] cuts the upstream
//! byte stream on blank-line boundaries and withholds the upstream's own `[DONE]`
//! so the relay's sentinel is the only one the caller sees.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use bytes::{Bytes, BytesMut};
use serde_json::json;

/* --- types ----------------------------------------------------------------------------------- */

///
/// A single frame on the outbound event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /** keep-alive sent before any upstream activity */
    Ping,
    /** upstream frame, forwarded verbatim */
    Upstream(Bytes),
    /** relay-authored assistant text, shaped like an upstream delta chunk */
    Synthetic(String),
    /** the relay's terminal marker */
    Done,
}

///
/// Incremental splitter for upstream event-stream bytes.
///
/// Chunks from the network do not line up with frame boundaries; the splitter buffers
/// until a blank line closes a frame and then hands the frame out unchanged.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    /** bytes received but not yet closed by a blank line */
    pending: BytesMut,
    /** upstream `[DONE]` frames withheld so far */
    withheld: usize,
}

/* --- constants ------------------------------------------------------------------------------ */

/** keep-alive frame */
pub const PING_FRAME: &[u8] = b"event: ping\ndata: {}\n\n";

/** terminal sentinel frame */
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/** payload of the upstream's own end marker */
const DONE_PAYLOAD: &str = "[DONE]";

/* --- start of code -------------------------------------------------------------------------- */

impl Frame {
    ///
    /// Render the frame as wire bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Frame::Ping => Bytes::from_static(PING_FRAME),
            Frame::Upstream(raw) => raw,
            Frame::Synthetic(text) => {
                let chunk = json!({
                    "object": "chat.completion.chunk",
                    "choices": [{
                        "index": 0,
                        "delta": { "role": "assistant", "content": text },
                        "finish_reason": null
                    }]
                });
                Bytes::from(format!("data: {}\n\n", chunk))
            }
            Frame::Done => Bytes::from_static(DONE_FRAME),
        }
    }
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// Feed a chunk from upstream and collect the frames it completes.
    ///
    /// # Arguments
    ///  * `chunk` - raw bytes as read from the upstream body
    ///
    /// # Returns
    ///  * Complete frames in arrival order, upstream `[DONE]` frames excluded
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = find_frame_end(&self.pending) {
            let raw = self.pending.split_to(end).freeze();
            if is_upstream_done(&raw) {
                self.withheld += 1;
                continue;
            }
            frames.push(Frame::Upstream(raw));
        }
        frames
    }

    ///
    /// Flush whatever is left once upstream has ended.
    ///
    /// A trailing frame cut off before its blank line is closed with one, so the frame
    /// that follows it stays a separate event. Whitespace-only leftovers and the
    /// upstream's end marker are dropped.
    pub fn finish(&mut self) -> Option<Frame> {
        let mut raw = self.pending.split();
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        if is_upstream_done(&raw) {
            self.withheld += 1;
            return None;
        }

        if raw.ends_with(b"\n") {
            raw.extend_from_slice(b"\n");
        } else if raw.ends_with(b"\r") {
            raw.extend_from_slice(b"\n\r\n");
        } else {
            raw.extend_from_slice(b"\n\n");
        }
        Some(Frame::Upstream(raw.freeze()))
    }

    ///
    /// Number of upstream end markers withheld.
    pub fn withheld(&self) -> usize {
        self.withheld
    }
}

///
/// Index just past the first blank line (`\n\n` or `\r\n\r\n`), if any.
fn find_frame_end(buf: &[u8]) -> Option<usize> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

///
/// Whether a frame is nothing but the upstream's `data: [DONE]` marker.
fn is_upstream_done(raw: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(raw) else {
        return false;
    };
    let mut data_lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match (data_lines.next(), data_lines.next()) {
        (Some(line), None) => line
            .strip_prefix("data:")
            .map(|payload| payload.trim() == DONE_PAYLOAD)
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(frame: &str) -> Frame {
        Frame::Upstream(Bytes::copy_from_slice(frame.as_bytes()))
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(Frame::Ping.into_bytes(), Bytes::from_static(b"event: ping\ndata: {}\n\n"));
        assert_eq!(Frame::Done.into_bytes(), Bytes::from_static(b"data: [DONE]\n\n"));
    }

    #[test]
    fn test_synthetic_frame_is_delta_chunk() {
        let bytes = Frame::Synthetic("hold on".to_string()).into_bytes();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));

        let value: serde_json::Value =
            serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(value["choices"][0]["delta"]["content"], "hold on");
    }

    #[test]
    fn test_splitter_forwards_frames_verbatim() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(frames, vec![upstream("data: {\"a\":1}\n\n"), upstream("data: {\"b\":2}\n\n")]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_splitter_joins_frames_across_chunks() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(b"data: {\"a\"").is_empty());
        assert!(splitter.push(b":1}\n").is_empty());
        assert_eq!(splitter.push(b"\ndata: x"), vec![upstream("data: {\"a\":1}\n\n")]);
        assert_eq!(splitter.finish(), Some(upstream("data: x\n\n")));
    }

    #[test]
    fn test_finish_closes_frame_cut_after_one_newline() {
        let mut splitter = FrameSplitter::new();
        assert_eq!(splitter.push(b"data: {\"a\":1}\n\n"), vec![upstream("data: {\"a\":1}\n\n")]);
        assert!(splitter.push(b"data: {\"b\":2}\n").is_empty());
        assert_eq!(splitter.finish(), Some(upstream("data: {\"b\":2}\n\n")));
    }

    #[test]
    fn test_finish_closes_frame_cut_after_crlf() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(b"data: 1\r\n").is_empty());
        assert_eq!(splitter.finish(), Some(upstream("data: 1\r\n\r\n")));
    }

    #[test]
    fn test_finish_drops_whitespace_leftover() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(b"data: 1\n\n\n").len() == 1);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_splitter_withholds_upstream_done() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(b"data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(frames, vec![upstream("data: {\"a\":1}\n\n")]);
        assert_eq!(splitter.withheld(), 1);
    }

    #[test]
    fn test_splitter_withholds_unterminated_done() {
        let mut splitter = FrameSplitter::new();
        assert!(splitter.push(b"data: [DONE]").is_empty());
        assert!(splitter.finish().is_none());
        assert_eq!(splitter.withheld(), 1);
    }

    #[test]
    fn test_splitter_handles_crlf() {
        let mut splitter = FrameSplitter::new();
        let frames = splitter.push(b"data: 1\r\n\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(frames, vec![upstream("data: 1\r\n\r\n")]);
        assert_eq!(splitter.withheld(), 1);
    }

    #[test]
    fn test_done_inside_content_is_not_withheld() {
        let mut splitter = FrameSplitter::new();
        let frame = "data: {\"content\":\"[DONE]\"}\n\n";
        assert_eq!(splitter.push(frame.as_bytes()), vec![upstream(frame)]);
        assert_eq!(splitter.withheld(), 0);
    }
}
