//! Frame buffering and parsing for the chat streaming protocol.
//!
//! The server writes one frame per reply fragment:
//! ```text
//! data: {"token": "Hel"}
//!
//! data: {"token": "lo"}
//!
//! data: [DONE]
//! ```
//! A failure is reported in-band as `data: {"error": "..."}`.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::client::ClientError;
use crate::model::StreamEvent;

/// Separates two frames.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Prefix of every line carrying a payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload ending the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Accumulates transport deltas and hands out complete frames in receipt order.
///
/// After [`drain`](FrameBuffer::drain) the buffer holds only the undelimited tail
/// of everything appended so far.
///
/// # Example
/// ```
/// use chatstream::sse::FrameBuffer;
///
/// let mut buffer = FrameBuffer::new();
/// buffer.append("data: {\"token\": \"a\"}\n\ndata: {\"to");
/// assert_eq!(buffer.drain(), vec!["data: {\"token\": \"a\"}".to_string()]);
/// assert_eq!(buffer.tail(), "data: {\"to");
///
/// buffer.append("ken\": \"b\"}\n\n");
/// assert_eq!(buffer.drain(), vec!["data: {\"token\": \"b\"}".to_string()]);
/// assert!(buffer.tail().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct FrameBuffer {
    tail: String,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate a delta onto the retained tail.
    ///
    /// Carriage returns are dropped so `\r\n\r\n` delimits frames too, even when
    /// the `\r` and `\n` arrive in different deltas.
    pub fn append(&mut self, delta: &str) {
        if delta.contains('\r') {
            self.tail.extend(delta.chars().filter(|c| *c != '\r'));
        } else {
            self.tail.push_str(delta);
        }
    }

    /// Remove and return every fully delimited frame, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(pos) = self.tail[consumed..].find(FRAME_DELIMITER) {
            let end = consumed + pos;
            frames.push(self.tail[consumed..end].to_string());
            consumed = end + FRAME_DELIMITER.len();
        }

        if consumed > 0 {
            self.tail.drain(..consumed);
        }
        frames
    }

    /// End of body: return the tail as a final frame if it carries a `data: ` line.
    ///
    /// Anything else left over is a truncated fragment and is discarded.
    pub fn flush(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.tail);
        if tail.lines().any(|line| parse_sse_line(line).is_some()) {
            Some(tail)
        } else {
            None
        }
    }

    /// Text received but not yet delimited.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    /// Drop all retained text.
    pub fn clear(&mut self) {
        self.tail.clear();
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`
///
/// # Example
/// ```
/// use chatstream::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "invalid";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|s| s.trim())
}

/// Check if an SSE data payload is the completion sentinel.
///
/// # Example
/// ```
/// use chatstream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker("[done]"));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Map one frame to at most one event.
///
/// Lines without the `data: ` prefix are ignored. Several data lines in one
/// frame are joined with `\n`. A payload that is not valid JSON is logged and
/// skipped.
pub fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let data: Vec<&str> = frame.lines().filter_map(parse_sse_line).collect();
    if data.is_empty() {
        return None;
    }

    let payload = data.join("\n");
    let payload = payload.trim();
    if is_done_marker(payload) {
        return Some(StreamEvent::Done);
    }

    match decode_payload(payload) {
        Ok(event) => event,
        Err(err) => {
            let warning = ClientError::from(err);
            warn!(error = %warning, payload_len = payload.len(), "skipping undecodable frame");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct FramePayload {
    token: Option<String>,
    error: Option<Value>,
}

/// Decode a JSON payload. `error` takes precedence over `token`; neither yields `None`.
pub fn decode_payload(payload: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
    let decoded: FramePayload = serde_json::from_str(payload)?;

    if let Some(message) = decoded.error.as_ref().and_then(error_message) {
        return Ok(Some(StreamEvent::Error(message)));
    }
    Ok(decoded.token.map(StreamEvent::Token))
}

/// Human readable text of an `error` field: a string, or an object's `message`.
pub(crate) fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_for(deltas: &[&str]) -> Vec<StreamEvent> {
        let mut buffer = FrameBuffer::new();
        let mut events = Vec::new();
        for delta in deltas {
            buffer.append(delta);
            events.extend(buffer.drain().iter().filter_map(|f| parse_frame(f)));
        }
        events.extend(buffer.flush().and_then(|f| parse_frame(&f)));
        events
    }

    fn char_boundaries(s: &str) -> Vec<usize> {
        s.char_indices().map(|(i, _)| i).skip(1).collect()
    }

    const WIRE: &str = "data: {\"token\": \"Start\"}\n\n\
                        : keep-alive\n\n\
                        data: {\"token\": \" Mi\u{e9}dle \u{1f600}\"}\n\n\
                        data: not json\n\n\
                        data: {\"token\": \" End\"}\n\n\
                        data: [DONE]\n\n";

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: hello"), Some("hello"));
        assert_eq!(
            parse_sse_line("data: {\"key\": \"value\"}"),
            Some("{\"key\": \"value\"}")
        );
        assert_eq!(parse_sse_line("data:   spaces  "), Some("spaces"));
        assert_eq!(parse_sse_line("invalid"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_is_done_marker() {
        assert!(is_done_marker("[DONE]"));
        assert!(!is_done_marker(""));
        assert!(!is_done_marker("data"));
        assert!(!is_done_marker("[DONE] "));
        assert!(!is_done_marker("{\"key\": \"value\"}"));
    }

    #[test]
    fn test_parse_frame_variants() {
        assert_eq!(
            parse_frame("data: {\"token\": \"Hello\"}"),
            Some(StreamEvent::Token("Hello".to_string()))
        );
        assert_eq!(
            parse_frame("data: {\"error\": \"rate limited\"}"),
            Some(StreamEvent::Error("rate limited".to_string()))
        );
        assert_eq!(parse_frame("data:  [DONE]  "), Some(StreamEvent::Done));
        assert_eq!(parse_frame("data: {\"other\": 1}"), None);
        assert_eq!(parse_frame("data: {broken"), None);
        assert_eq!(parse_frame("event: ping"), None);
        assert_eq!(parse_frame(""), None);
    }

    #[test]
    fn test_error_wins_over_token() {
        assert_eq!(
            parse_frame("data: {\"token\": \"x\", \"error\": {\"message\": \"boom\"}}"),
            Some(StreamEvent::Error("boom".to_string()))
        );
        assert_eq!(
            parse_frame("data: {\"token\": \"x\", \"error\": null}"),
            Some(StreamEvent::Token("x".to_string()))
        );
    }

    #[test]
    fn test_multi_line_frame_joins_data_lines() {
        let frame = "event: message\ndata: {\"token\":\ndata: \"joined\"}";
        assert_eq!(
            parse_frame(frame),
            Some(StreamEvent::Token("joined".to_string()))
        );
    }

    #[test]
    fn test_single_newline_is_not_a_delimiter() {
        let mut buffer = FrameBuffer::new();
        buffer.append("data: {\"token\":\n");
        assert!(buffer.drain().is_empty());
        buffer.append("data: \"a\"}\n\n");
        let frames = buffer.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            parse_frame(&frames[0]),
            Some(StreamEvent::Token("a".to_string()))
        );
    }

    #[test]
    fn test_crlf_delimiter_split_across_deltas() {
        assert_eq!(
            events_for(&["data: {\"token\": \"a\"}\r", "\n\r", "\ndata: [DONE]\r\n\r\n"]),
            vec![StreamEvent::Token("a".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_drain_retains_only_tail() {
        let mut buffer = FrameBuffer::new();
        buffer.append("data: {\"token\": \"a\"}\n\ndata: {\"token\": \"b\"}\n\ndata: {\"tok");
        assert_eq!(buffer.drain().len(), 2);
        assert_eq!(buffer.tail(), "data: {\"tok");
        assert!(buffer.drain().is_empty());
        assert_eq!(buffer.tail(), "data: {\"tok");
    }

    #[test]
    fn test_flush_keeps_trailing_data_frame() {
        let mut buffer = FrameBuffer::new();
        buffer.append("data: {\"token\": \"last\"}");
        assert!(buffer.drain().is_empty());
        let frame = buffer.flush().unwrap();
        assert_eq!(parse_frame(&frame), Some(StreamEvent::Token("last".to_string())));
        assert!(buffer.tail().is_empty());
    }

    #[test]
    fn test_flush_discards_fragments() {
        let mut buffer = FrameBuffer::new();
        buffer.append("ken\": \"x\"}");
        assert_eq!(buffer.flush(), None);
        assert!(buffer.tail().is_empty());

        let mut buffer = FrameBuffer::new();
        assert_eq!(buffer.flush(), None);

        // a truncated data line is handed over but yields nothing
        let mut buffer = FrameBuffer::new();
        buffer.append("data: {\"tok");
        let frame = buffer.flush().unwrap();
        assert_eq!(parse_frame(&frame), None);
    }

    #[test]
    fn test_split_frame_across_two_deltas() {
        let events = events_for(&[
            "data: {\"token\": \"Start\"}\n\ndata: {\"to",
            "ken\": \" Middle\"}\n\ndata: {\"token\": \" End\"}\n\ndata: [DONE]\n\n",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Start".to_string()),
                StreamEvent::Token(" Middle".to_string()),
                StreamEvent::Token(" End".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_every_two_way_split_matches_whole() {
        let expected = events_for(&[WIRE]);
        assert_eq!(expected.len(), 4);

        for i in char_boundaries(WIRE) {
            let (a, b) = WIRE.split_at(i);
            assert_eq!(events_for(&[a, b]), expected, "split at {}", i);
        }
    }

    #[test]
    fn test_every_three_way_split_matches_whole() {
        let expected = events_for(&[WIRE]);
        let bounds = char_boundaries(WIRE);

        for (n, &i) in bounds.iter().enumerate() {
            for &j in &bounds[n + 1..] {
                let deltas = [&WIRE[..i], &WIRE[i..j], &WIRE[j..]];
                assert_eq!(events_for(&deltas), expected, "split at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_char_by_char_matches_whole() {
        let expected = events_for(&[WIRE]);
        let chars: Vec<String> = WIRE.chars().map(String::from).collect();
        let deltas: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(events_for(&deltas), expected);
    }
}
