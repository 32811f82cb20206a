//! Codec for encoding and decoding Wayfarer frames.
//!
//! Frames are comma-delimited text. Decoding splits on the first comma to
//! find the command, then (for everything except `ack`) splits the
//! remainder on its first comma into target and payload. The payload is
//! JSON; a payload that does not parse is wrapped rather than rejected, so
//! decoding never fails.

use serde_json::{json, Value};
use thiserror::Error;

use crate::frames::{Frame, ACK};

/// Header delimiter.
pub const DELIMITER: char = ',';

/// Protocol errors that can occur during encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame has no command.
    #[error("Frame command is empty")]
    EmptyCommand,

    /// A header field contains the delimiter and would corrupt the frame.
    #[error("Frame {field} contains a delimiter: {value:?}")]
    Delimiter {
        /// Which header field was rejected.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A payload that could not be parsed as JSON.
///
/// Reported alongside the recovered frame for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed payload on {command:?} frame: {reason}")]
pub struct MalformedPayload {
    /// Command of the frame that carried the payload.
    pub command: String,
    /// Raw payload text as received.
    pub raw: String,
    /// Parser message.
    pub reason: String,
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Payload parsed cleanly.
    Clean(Frame),
    /// Payload did not parse; the frame carries a best-effort wrapper.
    Recovered(Frame, MalformedPayload),
}

impl Decoded {
    /// Borrow the decoded frame.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        match self {
            Decoded::Clean(frame) | Decoded::Recovered(frame, _) => frame,
        }
    }

    /// Take the decoded frame, discarding any recovery report.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        match self {
            Decoded::Clean(frame) | Decoded::Recovered(frame, _) => frame,
        }
    }

    /// Whether the payload had to be recovered.
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(self, Decoded::Recovered(..))
    }
}

/// Wrap a payload that failed to parse.
///
/// The sender is unknown at this layer, so `username` is null.
#[must_use]
pub fn recovered_payload(raw: &str) -> Value {
    json!({
        "username": Value::Null,
        "content": raw,
    })
}

/// Decode a frame from text.
///
/// A missing delimiter is tolerated: the missing parts are empty and the
/// empty payload is reported as malformed.
#[must_use]
pub fn decode(text: &str) -> Decoded {
    let (command, rest) = text.split_once(DELIMITER).unwrap_or((text, ""));

    let (target, raw_payload) = if command == ACK {
        (None, rest)
    } else {
        match rest.split_once(DELIMITER) {
            Some((target, payload)) => (Some(target.to_string()), payload),
            None => (Some(rest.to_string()), ""),
        }
    };

    match serde_json::from_str::<Value>(raw_payload) {
        Ok(payload) => Decoded::Clean(Frame {
            command: command.to_string(),
            target,
            payload,
        }),
        Err(e) => {
            let malformed = MalformedPayload {
                command: command.to_string(),
                raw: raw_payload.to_string(),
                reason: e.to_string(),
            };
            let frame = Frame {
                command: command.to_string(),
                target,
                payload: recovered_payload(raw_payload),
            };
            Decoded::Recovered(frame, malformed)
        }
    }
}

/// Encode a frame to text.
///
/// The payload is always serialized, so a string payload is quoted.
///
/// # Errors
///
/// Returns an error if the command is empty, a header contains the
/// delimiter, or the payload cannot be serialized.
pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
    if frame.command.is_empty() {
        return Err(ProtocolError::EmptyCommand);
    }
    check_header("command", &frame.command)?;

    let payload = serde_json::to_string(&frame.payload)?;

    let target_len = frame.target.as_ref().map_or(0, |t| t.len() + 1);
    let mut out = String::with_capacity(frame.command.len() + 1 + target_len + payload.len());
    out.push_str(&frame.command);
    out.push(DELIMITER);

    if let Some(target) = &frame.target {
        check_header("target", target)?;
        out.push_str(target);
        out.push(DELIMITER);
    }

    out.push_str(&payload);
    Ok(out)
}

fn check_header(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.contains(DELIMITER) {
        return Err(ProtocolError::Delimiter {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::SOS;

    #[test]
    fn test_decode_ack() {
        let decoded = decode(r#"ack,{"mediatorId":"m9","roomId":"r2","roomName":"Lobby"}"#);
        assert!(!decoded.is_recovered());

        let frame = decoded.into_frame();
        assert!(frame.is_ack());
        assert_eq!(frame.target, None);
        assert_eq!(frame.payload["roomId"], "r2");
        assert_eq!(frame.payload["roomName"], "Lobby");
    }

    #[test]
    fn test_decode_three_part() {
        let frame = decode(r#"player,u1,{"type":"chat","content":"hi, there","bookmark":7}"#)
            .into_frame();
        assert_eq!(frame.command, "player");
        assert_eq!(frame.target.as_deref(), Some("u1"));
        // commas inside the payload belong to the payload
        assert_eq!(frame.payload["content"], "hi, there");
        assert_eq!(frame.payload["bookmark"], 7);
    }

    #[test]
    fn test_reencode_preserves_text() {
        let frames = [
            r#"ack,{"mediatorId":"m9","roomId":"r2","roomName":"Lobby"}"#,
            r#"room,r1,{"username":"alice","userId":"u1","content":"hello"}"#,
            r#"player,u1,{"type":"event","content":{"u1":"You wave.","*":"alice waves."},"bookmark":"b-12"}"#,
        ];

        for text in frames {
            let decoded = decode(text);
            assert!(!decoded.is_recovered(), "{text}");
            assert_eq!(encode(decoded.frame()).unwrap(), text);
        }
    }

    #[test]
    fn test_decode_malformed_payload_recovers() {
        match decode("room,r1,not json at all") {
            Decoded::Recovered(frame, malformed) => {
                assert_eq!(frame.command, "room");
                assert_eq!(frame.target.as_deref(), Some("r1"));
                assert_eq!(frame.payload["content"], "not json at all");
                assert!(frame.payload["username"].is_null());
                assert_eq!(malformed.raw, "not json at all");
                assert_eq!(malformed.command, "room");
            }
            other => panic!("Expected Recovered, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_delimiters() {
        let decoded = decode("ping");
        assert!(decoded.is_recovered());
        let frame = decoded.into_frame();
        assert_eq!(frame.command, "ping");
        assert_eq!(frame.target.as_deref(), Some(""));
        assert_eq!(frame.payload["content"], "");

        let frame = decode("player,u1").into_frame();
        assert_eq!(frame.target.as_deref(), Some("u1"));
        assert_eq!(frame.payload["content"], "");
    }

    #[test]
    fn test_encode_quotes_string_payload() {
        let frame = Frame::new("room", "r1", Value::String("hello".into()));
        assert_eq!(encode(&frame).unwrap(), r#"room,r1,"hello""#);
    }

    #[test]
    fn test_encode_urgent() {
        assert_eq!(encode(&Frame::urgent(SOS, "r1")).unwrap(), "sos,r1,{}");
    }

    #[test]
    fn test_encode_rejects_delimiter_in_target() {
        let frame = Frame::room("r1,r2", json!({}));
        match encode(&frame) {
            Err(ProtocolError::Delimiter { field, .. }) => assert_eq!(field, "target"),
            other => panic!("Expected Delimiter error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_rejects_empty_command() {
        let frame = Frame::untargeted("", json!({}));
        assert!(matches!(encode(&frame), Err(ProtocolError::EmptyCommand)));
    }
}
