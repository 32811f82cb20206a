//! Append-only log of room events as seen by this viewer.
//!
//! The log assigns ids: a process-local sequence starting at 0, one per
//! appended event. Hub payloads never carry ids.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::metrics;
use crate::session::Bookmark;

/// Wildcard key in per-viewer content maps.
pub const ANY_VIEWER: &str = "*";

/// Event type, used to pick how content is presented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum EventKind {
    /// Room event with per-viewer content.
    Event,
    /// Local echo of a slash command.
    Command,
    /// Chat message.
    Chat,
    /// Any other type, kept verbatim.
    Other(String),
    /// Payload carried no type.
    Untyped,
}

impl EventKind {
    /// Whether the payload carried no type.
    #[must_use]
    pub fn is_untyped(&self) -> bool {
        matches!(self, EventKind::Untyped)
    }

    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Event => "event",
            EventKind::Command => "command",
            EventKind::Chat => "chat",
            EventKind::Other(kind) => kind,
            EventKind::Untyped => "",
        }
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        match kind {
            "event" => EventKind::Event,
            "command" => EventKind::Command,
            "chat" => EventKind::Chat,
            "" => EventKind::Untyped,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> String {
        kind.as_str().to_string()
    }
}

/// One entry in the log. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Local sequence number.
    pub id: u64,
    /// Event type.
    #[serde(rename = "type", skip_serializing_if = "EventKind::is_untyped")]
    pub kind: EventKind,
    /// Sender display name, when the hub supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Content selected for this viewer.
    pub content: Value,
    /// Cursor carried by the hub message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<Bookmark>,
    /// Remaining payload fields, kept for the presentation layer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Content as text, if it is a string.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

/// Pick the content a viewer should see.
///
/// `event` payloads carry a map keyed by viewer id with a `*` fallback.
/// When neither key is present, or for any other kind, the content is
/// returned as-is.
#[must_use]
pub fn select_content(kind: &EventKind, content: Value, viewer_id: &str) -> Value {
    if *kind != EventKind::Event {
        return content;
    }

    let selected = content.as_object().and_then(|map| {
        map.get(viewer_id)
            .filter(|value| !value.is_null())
            .or_else(|| map.get(ANY_VIEWER))
            .cloned()
    });

    selected.unwrap_or(content)
}

/// Ordered, append-only event log.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hub payload, selecting content for `viewer_id`.
    pub fn append_inbound(&mut self, payload: Value, viewer_id: &str) -> &Event {
        let event = match payload {
            Value::Object(mut fields) => {
                let kind = match fields.remove("type") {
                    Some(Value::String(kind)) => EventKind::from(kind.as_str()),
                    Some(Value::Null) | None => EventKind::Untyped,
                    Some(other) => EventKind::Other(other.to_string()),
                };
                let username = match fields.remove("username") {
                    Some(Value::String(name)) => Some(name),
                    _ => None,
                };
                let bookmark = fields
                    .remove("bookmark")
                    .filter(|value| !value.is_null())
                    .map(Bookmark);
                let content = fields.remove("content").unwrap_or(Value::Null);
                // ids are local; drop any the payload carries
                fields.remove("id");

                Event {
                    id: 0,
                    content: select_content(&kind, content, viewer_id),
                    kind,
                    username,
                    bookmark,
                    extra: fields,
                }
            }
            other => Event {
                id: 0,
                kind: EventKind::Untyped,
                username: None,
                content: other,
                bookmark: None,
                extra: Map::new(),
            },
        };

        self.push(event)
    }

    /// Append a local echo of a slash command.
    pub fn append_command(&mut self, input: &str) -> &Event {
        self.push(Event {
            id: 0,
            kind: EventKind::Command,
            username: None,
            content: Value::String(input.to_string()),
            bookmark: None,
            extra: Map::new(),
        })
    }

    fn push(&mut self, mut event: Event) -> &Event {
        event.id = self.next_id;
        self.next_id += 1;
        metrics::record_event(event.kind.as_str());

        let index = self.events.len();
        self.events.push(event);
        &self.events[index]
    }

    /// Get all events in order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get an event by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Event> {
        usize::try_from(id).ok().and_then(|index| self.events.get(index))
    }

    /// Events appended after `id`.
    #[must_use]
    pub fn since(&self, id: u64) -> &[Event] {
        let start = usize::try_from(id.saturating_add(1))
            .unwrap_or(usize::MAX)
            .min(self.events.len());
        &self.events[start..]
    }

    /// Get the most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_start_at_zero_and_increase() {
        let mut log = EventLog::new();

        for n in 0..5u64 {
            let event = log.append_inbound(json!({"type": "chat", "content": n}), "u1");
            assert_eq!(event.id, n);
        }
        assert_eq!(log.append_command("/look").id, 5);
        assert_eq!(log.len(), 6);
    }

    #[test]
    fn test_event_prefers_viewer_entry() {
        let mut log = EventLog::new();
        let event = log.append_inbound(
            json!({"type": "event", "content": {"u1": "You wave.", "*": "alice waves."}}),
            "u1",
        );
        assert_eq!(event.content, json!("You wave."));
    }

    #[test]
    fn test_event_falls_back_to_wildcard() {
        let mut log = EventLog::new();
        let event = log.append_inbound(
            json!({"type": "event", "content": {"u1": "You wave.", "*": "alice waves."}}),
            "u2",
        );
        assert_eq!(event.text(), Some("alice waves."));
    }

    #[test]
    fn test_event_without_matching_keys_is_verbatim() {
        let mut log = EventLog::new();
        let content = json!({"u7": "Only for u7."});
        let event = log.append_inbound(json!({"type": "event", "content": content.clone()}), "u1");
        assert_eq!(event.content, content);

        let event = log.append_inbound(json!({"type": "event", "content": "plain"}), "u1");
        assert_eq!(event.content, json!("plain"));
    }

    #[test]
    fn test_other_kinds_are_not_selected() {
        let mut log = EventLog::new();
        let content = json!({"u1": "x", "*": "y"});
        let event = log.append_inbound(
            json!({"type": "chat", "username": "bob", "content": content.clone(), "bookmark": "b-9"}),
            "u1",
        );

        assert_eq!(event.kind, EventKind::Chat);
        assert_eq!(event.username.as_deref(), Some("bob"));
        assert_eq!(event.content, content);
        assert_eq!(event.bookmark, Some(Bookmark(json!("b-9"))));
    }

    #[test]
    fn test_unknown_fields_kept_and_hub_id_ignored() {
        let mut log = EventLog::new();
        log.append_command("/sos");
        let event = log.append_inbound(
            json!({"type": "location", "id": 99, "content": "A room.", "exits": {"N": "Hall"}}),
            "u1",
        );

        assert_eq!(event.id, 1);
        assert_eq!(event.kind, EventKind::Other("location".to_string()));
        assert_eq!(event.extra.get("exits"), Some(&json!({"N": "Hall"})));
        assert!(event.extra.get("id").is_none());
    }

    #[test]
    fn test_non_object_payload() {
        let mut log = EventLog::new();
        let event = log.append_inbound(json!("bare string"), "u1");
        assert!(event.kind.is_untyped());
        assert_eq!(event.content, json!("bare string"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut log = EventLog::new();
        let event = log.append_command("/go north");
        assert_eq!(
            serde_json::to_value(event).unwrap(),
            json!({"id": 0, "type": "command", "content": "/go north"})
        );
    }

    #[test]
    fn test_lookup() {
        let mut log = EventLog::new();
        assert!(log.is_empty());
        log.append_command("/a");
        log.append_command("/b");
        log.append_command("/c");

        assert_eq!(log.get(1).and_then(Event::text), Some("/b"));
        assert!(log.get(3).is_none());
        assert_eq!(log.since(0).len(), 2);
        assert!(log.since(2).is_empty());
        assert!(log.since(u64::MAX).is_empty());
        assert_eq!(log.last().map(|e| e.id), Some(2));
    }
}
