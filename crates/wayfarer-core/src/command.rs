//! Turns user input into outgoing frames.
//!
//! Slash-prefixed input is echoed into the local log before anything is
//! sent. Registered urgent commands go out as their own frame; everything
//! else, including unrecognized slash commands, is wrapped in an
//! [`OutgoingEnvelope`] and broadcast to the current room.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};
use wayfarer_protocol::frames::SOS;
use wayfarer_protocol::{codec, Frame, ProtocolError};

use crate::identity::Identity;

/// Prefix that marks input as a command.
pub const COMMAND_PREFIX: char = '/';

/// Trigger for the built-in urgent command.
pub const SOS_TRIGGER: &str = "/sos";

/// Body of a room broadcast. Built per send, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEnvelope<'a> {
    /// Sender display name.
    pub username: &'a str,
    /// Sender id.
    pub user_id: &'a str,
    /// Raw user input.
    pub content: &'a str,
}

/// Frame built for one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// Encoded frame to send.
    pub frame: String,
    /// Whether the frame bypassed the room envelope.
    pub urgent: bool,
}

/// Routes user input to frames.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    /// Urgent command trigger -> frame command.
    urgent: HashMap<String, String>,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new().with_urgent(SOS_TRIGGER, SOS)
    }
}

impl CommandRouter {
    /// Create a router with no urgent commands.
    #[must_use]
    pub fn new() -> Self {
        Self {
            urgent: HashMap::new(),
        }
    }

    /// Register an urgent command: input exactly equal to `trigger` is
    /// sent as a `command,<roomId>,{}` frame.
    #[must_use]
    pub fn with_urgent(mut self, trigger: impl Into<String>, command: impl Into<String>) -> Self {
        self.urgent.insert(trigger.into(), command.into());
        self
    }

    /// Check if `input` is a registered urgent command.
    #[must_use]
    pub fn is_urgent(&self, input: &str) -> bool {
        self.urgent.contains_key(input)
    }

    /// Text to echo into the local log for `input`, if any.
    ///
    /// Every command is echoed, whether or not a frame can be built for it.
    #[must_use]
    pub fn echo<'a>(&self, input: &'a str) -> Option<&'a str> {
        input.starts_with(COMMAND_PREFIX).then_some(input)
    }

    /// Route one line of input.
    ///
    /// Returns `Ok(None)` for empty input.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded (e.g. the room id
    /// contains a delimiter).
    pub fn route(
        &self,
        input: &str,
        identity: &Identity,
        room_id: Option<&str>,
    ) -> Result<Option<Routed>, ProtocolError> {
        if input.is_empty() {
            return Ok(None);
        }

        let room_id = room_id.unwrap_or_else(|| {
            warn!("Sending without a room id");
            ""
        });

        if let Some(command) = self.urgent.get(input) {
            debug!(command = %command, room_id = %room_id, "Urgent command");
            let frame = codec::encode(&Frame::urgent(command.as_str(), room_id))?;
            return Ok(Some(Routed {
                frame,
                urgent: true,
            }));
        }

        let envelope = OutgoingEnvelope {
            username: &identity.display_name,
            user_id: &identity.user_id,
            content: input,
        };
        let payload = serde_json::to_value(&envelope)?;
        let frame = codec::encode(&Frame::room(room_id, payload))?;

        Ok(Some(Routed {
            frame,
            urgent: false,
        }))
    }
}
