//! Durable session state: where the client is and what it has seen.
//!
//! The hub is authoritative for room placement. On load, a persisted
//! bookmark is only kept if the persisted room matches the identity
//! provider's current location; a bookmark earned in another room is
//! meaningless.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::identity::Identity;
use crate::metrics;
use crate::storage::{KeyValueStore, SESSION_KEY};

/// Opaque delivery cursor issued by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmark(pub Value);

impl Bookmark {
    /// Read the bookmark carried by an inbound payload, if any.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        payload
            .get("bookmark")
            .filter(|value| !value.is_null())
            .cloned()
            .map(Bookmark)
    }
}

/// The persisted session record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Current room, as placed by the hub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Last event durably seen in `room_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<Bookmark>,
    /// Backend instance that owns the room session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediator_id: Option<String>,
    /// Human-readable room name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    /// Display name, refreshed from identity on every load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Read a string-ish field from a payload. Non-string scalars are rendered.
fn text_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Loads, reconciles, updates, and saves the session.
pub struct SessionStore<S> {
    store: S,
    session: Session,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Load the persisted session and reconcile it with `identity`.
    ///
    /// A missing, unreadable, or corrupt record yields an empty session.
    pub fn load(store: S, identity: &Identity) -> Self {
        let mut session = match store.get(SESSION_KEY) {
            Ok(Some(record)) => serde_json::from_str::<Session>(&record).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable session record");
                Session::default()
            }),
            Ok(None) => Session::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read session, starting fresh");
                Session::default()
            }
        };

        if identity.location != session.room_id {
            debug!(
                persisted = ?session.room_id,
                location = ?identity.location,
                "Room changed since last session, dropping bookmark"
            );
            session.bookmark = None;
            session.room_id = identity.location.clone();
        }
        session.username = Some(identity.display_name.clone());

        Self { store, session }
    }

    /// Get the current session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Apply a join acknowledgment: overwrite mediator, room id, and room name.
    pub fn apply_ack(&mut self, payload: &Value) {
        self.session.mediator_id = text_field(payload, "mediatorId");
        self.session.room_id = text_field(payload, "roomId");
        self.session.room_name = text_field(payload, "roomName");

        info!(
            room_id = ?self.session.room_id,
            room_name = ?self.session.room_name,
            mediator_id = ?self.session.mediator_id,
            "Joined room"
        );
    }

    /// Advance the bookmark from an inbound payload.
    ///
    /// Returns `false` (and changes nothing) if the payload carries none.
    pub fn update_bookmark(&mut self, payload: &Value) -> bool {
        match Bookmark::from_payload(payload) {
            Some(bookmark) => {
                self.session.bookmark = Some(bookmark);
                true
            }
            None => false,
        }
    }

    /// Persist the session.
    ///
    /// Failures are logged and swallowed; returns whether the write happened.
    pub fn save(&mut self) -> bool {
        let record = match serde_json::to_string(&self.session) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to serialize session");
                return false;
            }
        };

        match self.store.set(SESSION_KEY, &record) {
            Ok(()) => {
                debug!(bytes = record.len(), "Session saved");
                metrics::record_session_flush(true);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to save session");
                metrics::record_session_flush(false);
                false
            }
        }
    }

    /// Get the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }
}
