//! Frame types for the Wayfarer protocol.
//!
//! A frame is one text message exchanged with the hub. The leading
//! `command` decides how the rest of the frame is read: acknowledgments
//! carry only a payload, every other command carries a target and a payload.

use serde_json::Value;

/// Hub acknowledgment of a `ready` handshake.
pub const ACK: &str = "ack";

/// Client join/rejoin handshake carrying the session.
pub const READY: &str = "ready";

/// Room broadcast.
pub const ROOM: &str = "room";

/// Urgent out-of-band signal.
pub const SOS: &str = "sos";

/// Frame classification by command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Join acknowledgment (`ack`).
    Ack,
    /// Room handshake (`ready`).
    Ready,
    /// Room broadcast (`room`).
    Room,
    /// Any other command, kept verbatim.
    Other(String),
}

impl FrameKind {
    /// The command string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FrameKind::Ack => ACK,
            FrameKind::Ready => READY,
            FrameKind::Room => ROOM,
            FrameKind::Other(command) => command,
        }
    }
}

impl From<&str> for FrameKind {
    fn from(command: &str) -> Self {
        match command {
            ACK => FrameKind::Ack,
            READY => FrameKind::Ready,
            ROOM => FrameKind::Room,
            other => FrameKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Leading command word.
    pub command: String,
    /// Routing target; `None` for two-part frames.
    pub target: Option<String>,
    /// Structured payload.
    pub payload: Value,
}

impl Frame {
    /// Create a three-part frame.
    #[must_use]
    pub fn new(command: impl Into<String>, target: impl Into<String>, payload: Value) -> Self {
        Self {
            command: command.into(),
            target: Some(target.into()),
            payload,
        }
    }

    /// Create a frame without a target.
    #[must_use]
    pub fn untargeted(command: impl Into<String>, payload: Value) -> Self {
        Self {
            command: command.into(),
            target: None,
            payload,
        }
    }

    /// Get the frame kind.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        FrameKind::from(self.command.as_str())
    }

    /// Whether this is a join acknowledgment.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.command == ACK
    }

    /// Create an `ack` frame.
    #[must_use]
    pub fn ack(payload: Value) -> Self {
        Self::untargeted(ACK, payload)
    }

    /// Create a `ready` handshake frame carrying the serialized session.
    #[must_use]
    pub fn ready(session: Value) -> Self {
        Self::untargeted(READY, session)
    }

    /// Create a `room` broadcast frame.
    #[must_use]
    pub fn room(room_id: impl Into<String>, envelope: Value) -> Self {
        Self::new(ROOM, room_id, envelope)
    }

    /// Create an urgent frame with an empty payload.
    #[must_use]
    pub fn urgent(command: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self::new(command, room_id, Value::Object(serde_json::Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_kind() {
        assert_eq!(Frame::ack(json!({})).kind(), FrameKind::Ack);
        assert_eq!(Frame::room("r1", json!({})).kind(), FrameKind::Room);
        assert_eq!(
            Frame::urgent(SOS, "r1").kind(),
            FrameKind::Other("sos".to_string())
        );
    }

    #[test]
    fn test_kind_from_command() {
        assert_eq!(FrameKind::from("ack"), FrameKind::Ack);
        assert_eq!(FrameKind::from("ready"), FrameKind::Ready);
        assert_eq!(FrameKind::from("room").as_str(), "room");
        assert_eq!(FrameKind::from("player").to_string(), "player");
    }

    #[test]
    fn test_urgent_payload_is_empty_object() {
        let frame = Frame::urgent(SOS, "r1");
        assert_eq!(frame.payload, json!({}));
        assert_eq!(frame.target.as_deref(), Some("r1"));
    }
}
