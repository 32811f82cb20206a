//! Connection lifecycle and event dispatch.
//!
//! The [`ConnectionManager`] owns the session and the event log for one
//! logical hub connection. Transport callbacks and user sends are applied
//! one at a time, each fully, in arrival order.
//!
//! ```text
//! Closed ──▶ Connecting ──▶ Open ──▶ Closed
//!                ▲                      │
//!                └──── transport ───────┘
//!                  reconnect policy
//! ```

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use wayfarer_protocol::codec::{self, Decoded};
use wayfarer_protocol::frames::{READY, ROOM};
use wayfarer_protocol::{Frame, ProtocolError};
use wayfarer_transport::{CloseInfo, FrameSink, Transport, TransportError, TransportEvent};

use crate::command::CommandRouter;
use crate::error::ClientError;
use crate::event_log::{Event, EventLog};
use crate::identity::Identity;
use crate::metrics;
use crate::session::{Session, SessionStore};
use crate::storage::KeyValueStore;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected.
    Closed,
    /// Transport is attempting to connect.
    Connecting,
    /// Connected; the `ready` handshake has been sent.
    Open,
}

/// Owns one logical hub connection's session and event log.
pub struct ConnectionManager<S, K> {
    identity: Identity,
    sessions: SessionStore<S>,
    log: EventLog,
    router: CommandRouter,
    sink: K,
    state: ConnectionState,
    // Session saved since the last open.
    flushed: bool,
    shut_down: bool,
}

impl<S: KeyValueStore, K: FrameSink> ConnectionManager<S, K> {
    /// Create a manager, loading and reconciling the persisted session.
    pub fn new(identity: Identity, store: S, sink: K) -> Self {
        let sessions = SessionStore::load(store, &identity);
        info!(
            user_id = %identity.user_id,
            room_id = ?sessions.session().room_id,
            has_bookmark = sessions.session().bookmark.is_some(),
            "Session loaded"
        );

        Self {
            identity,
            sessions,
            log: EventLog::new(),
            router: CommandRouter::default(),
            sink,
            state: ConnectionState::Closed,
            flushed: false,
            shut_down: false,
        }
    }

    /// Replace the command router.
    #[must_use]
    pub fn with_router(mut self, router: CommandRouter) -> Self {
        self.router = router;
        self
    }

    /// Get the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get the current session.
    #[must_use]
    pub fn session(&self) -> &Session {
        self.sessions.session()
    }

    /// Get the event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.log
    }

    /// Get the viewer identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Whether the owner has shut this connection down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The transport is starting a connection attempt.
    pub fn on_connecting(&mut self, attempt: u32) {
        if self.shut_down {
            return;
        }
        debug!(attempt, "Connecting");
        self.state = ConnectionState::Connecting;
    }

    /// The connection opened: send the `ready` handshake with the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake cannot be encoded or queued.
    pub fn on_open(&mut self) -> Result<(), ClientError> {
        if self.shut_down {
            debug!("Ignoring open after shutdown");
            return Ok(());
        }

        info!(user_id = %self.identity.user_id, "Connection open");
        self.state = ConnectionState::Open;
        self.flushed = false;
        metrics::record_connection();

        let session = serde_json::to_value(self.sessions.session()).map_err(ProtocolError::from)?;
        let text = codec::encode(&Frame::ready(session))?;
        trace!(frame = %text, "Sending handshake");
        self.sink.send_handshake(text)?;
        metrics::record_frame(READY, "outbound");
        Ok(())
    }

    /// Apply one inbound frame.
    ///
    /// Acknowledgments update the session; everything else advances the
    /// bookmark and is appended to the log. Returns the id of the appended
    /// event, if any.
    pub fn on_message(&mut self, raw: &str) -> Option<u64> {
        if self.shut_down {
            debug!("Ignoring message after shutdown");
            return None;
        }

        let decoded = codec::decode(raw);
        if let Decoded::Recovered(_, malformed) = &decoded {
            warn!(error = %malformed, "Recovered malformed payload");
            metrics::record_malformed();
        }

        let frame = decoded.into_frame();
        metrics::record_frame(&frame.command, "inbound");

        if frame.is_ack() {
            self.sessions.apply_ack(&frame.payload);
            return None;
        }

        self.sessions.update_bookmark(&frame.payload);
        let event = self.log.append_inbound(frame.payload, &self.identity.user_id);
        trace!(
            id = event.id,
            command = %frame.command,
            target = ?frame.target,
            kind = event.kind.as_str(),
            "Event appended"
        );
        Some(event.id)
    }

    /// The transport reported an error. Logged only; the transport decides
    /// whether to reconnect.
    pub fn on_error(&mut self, error: &TransportError) {
        warn!(error = %error, state = ?self.state, "Connection error");
        metrics::record_error("transport");
    }

    /// The connection closed: persist the session once.
    ///
    /// Repeated close callbacks for the same connection are ignored.
    /// Returns whether this call flushed the session.
    pub fn on_close(&mut self, close: &CloseInfo) -> bool {
        self.state = ConnectionState::Closed;
        if self.flushed {
            debug!(close = %close, "Session already flushed for this connection");
            return false;
        }

        info!(close = %close, "Connection closed");
        self.flushed = true;
        self.sessions.save();
        true
    }

    /// Send one line of user input.
    ///
    /// Returns the id of the local command echo, if one was appended.
    /// Commands are echoed before the frame is built, so the echo stays in
    /// the log even when sending fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is shut down or the frame cannot
    /// be encoded or queued.
    pub fn send(&mut self, input: &str) -> Result<Option<u64>, ClientError> {
        if self.shut_down {
            return Err(ClientError::ShutDown);
        }

        let echo = self
            .router
            .echo(input)
            .map(|text| self.log.append_command(text).id);

        let room_id = self.sessions.session().room_id.as_deref();
        let Some(routed) = self.router.route(input, &self.identity, room_id)? else {
            return Ok(None);
        };

        let command = if routed.urgent { "urgent" } else { ROOM };
        self.transmit(command, routed.frame)?;
        Ok(echo)
    }

    /// Close the connection from the owner's side.
    ///
    /// Flushes the session unless it was already flushed since the last
    /// open; afterwards the manager ignores transport callbacks and rejects sends.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.on_close(&CloseInfo::normal());
        self.shut_down = true;
        debug!("Connection shut down");
    }

    /// Dispatch one transport event. Returns the id of an appended event.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<u64> {
        match event {
            TransportEvent::Connecting { attempt } => {
                self.on_connecting(attempt);
                None
            }
            TransportEvent::Open => {
                if let Err(e) = self.on_open() {
                    error!(error = %e, "Failed to send ready handshake");
                }
                None
            }
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(e) => {
                self.on_error(&e);
                None
            }
            TransportEvent::Close(close) => {
                self.on_close(&close);
                None
            }
        }
    }

    /// Drive the connection until the input closes or the transport ends.
    ///
    /// Transport events and user input are handled strictly one at a time.
    /// `observer` sees every event appended to the log, inbound or echoed.
    /// On exit the session is flushed and the transport closed.
    pub async fn run<T, F>(
        &mut self,
        transport: &mut T,
        mut input: mpsc::Receiver<String>,
        mut observer: F,
    ) where
        T: Transport,
        F: FnMut(&Event),
    {
        info!(transport = transport.name(), "Connection manager running");

        loop {
            tokio::select! {
                event = transport.next_event() => match event {
                    Some(event) => {
                        if let Some(event) = self.handle_event(event).and_then(|id| self.log.get(id)) {
                            observer(event);
                        }
                    }
                    None => {
                        debug!("Transport ended");
                        break;
                    }
                },

                line = input.recv() => match line {
                    Some(line) => {
                        let seen = self.log.len();
                        if let Err(e) = self.send(&line) {
                            warn!(error = %e, "Send failed");
                        }
                        // The echo is kept even when the send failed.
                        for event in &self.log.events()[seen..] {
                            observer(event);
                        }
                    }
                    None => {
                        debug!("Input closed");
                        break;
                    }
                },
            }
        }

        self.shutdown();
        if let Err(e) = transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }
    }

    fn transmit(&self, command: &str, text: String) -> Result<(), ClientError> {
        trace!(frame = %text, "Sending frame");
        self.sink.send_text(text)?;
        metrics::record_frame(command, "outbound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::EventKind;
    use crate::session::Bookmark;
    use crate::storage::{MemoryStore, StorageError, SESSION_KEY};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wayfarer_transport::{ChannelSink, Outgoing};

    /// Memory store that counts writes.
    #[derive(Clone, Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: Arc<AtomicUsize>,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }
    }

    fn alice() -> Identity {
        Identity::new("u1", "alice").with_location("r1")
    }

    fn manager(
        store: CountingStore,
    ) -> (
        ConnectionManager<CountingStore, ChannelSink>,
        mpsc::UnboundedReceiver<Outgoing>,
    ) {
        let (sink, sent) = ChannelSink::channel();
        (ConnectionManager::new(alice(), store, sink), sent)
    }

    fn drain(sent: &mut mpsc::UnboundedReceiver<Outgoing>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = sent.try_recv() {
            frames.push(frame.into_text());
        }
        frames
    }

    #[test]
    fn test_open_sends_ready_with_session() {
        let (mut conn, mut sent) = manager(CountingStore::default());
        assert_eq!(conn.state(), ConnectionState::Closed);

        conn.on_connecting(1);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.on_open().unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(
            drain(&mut sent),
            vec![r#"ready,{"roomId":"r1","username":"alice"}"#.to_string()]
        );
    }

    #[test]
    fn test_ack_updates_session_without_event() {
        let store = CountingStore::default();
        store
            .inner
            .set(SESSION_KEY, r#"{"roomId":"r1","bookmark":"b-4"}"#)
            .unwrap();
        let (mut conn, _sent) = manager(store);
        conn.on_open().unwrap();

        let appended =
            conn.on_message(r#"ack,{"mediatorId":"m9","roomId":"r2","roomName":"Lobby"}"#);

        assert_eq!(appended, None);
        assert!(conn.events().is_empty());
        let session = conn.session();
        assert_eq!(session.room_id.as_deref(), Some("r2"));
        assert_eq!(session.mediator_id.as_deref(), Some("m9"));
        assert_eq!(session.room_name.as_deref(), Some("Lobby"));
        assert_eq!(session.bookmark, Some(Bookmark(json!("b-4"))));
    }

    #[test]
    fn test_message_appends_and_advances_bookmark() {
        let (mut conn, _sent) = manager(CountingStore::default());
        conn.on_open().unwrap();

        let first = conn.on_message(
            r#"player,u1,{"type":"event","content":{"u1":"You wave.","*":"alice waves."},"bookmark":"b-1"}"#,
        );
        let second = conn.on_message(r#"room,r1,{"type":"chat","username":"bob","content":"hi"}"#);

        assert_eq!(first, Some(0));
        assert_eq!(second, Some(1));
        assert_eq!(conn.events().get(0).and_then(Event::text), Some("You wave."));
        // a frame without a bookmark leaves the previous one in place
        assert_eq!(conn.session().bookmark, Some(Bookmark(json!("b-1"))));
    }

    #[test]
    fn test_unknown_command_is_stored() {
        let (mut conn, _sent) = manager(CountingStore::default());
        let id = conn.on_message(r#"weather,r1,{"type":"rain","content":"It rains."}"#);

        let event = conn.events().get(id.unwrap()).unwrap();
        assert_eq!(event.kind, EventKind::Other("rain".to_string()));
    }

    #[test]
    fn test_malformed_payload_is_recovered() {
        let (mut conn, _sent) = manager(CountingStore::default());
        let id = conn.on_message("player,u1,<<garbage>>").unwrap();

        let event = conn.events().get(id).unwrap();
        assert_eq!(event.text(), Some("<<garbage>>"));
        assert!(event.username.is_none());
    }

    #[test]
    fn test_error_does_not_mutate() {
        let (mut conn, mut sent) = manager(CountingStore::default());
        conn.on_open().unwrap();
        drain(&mut sent);
        let before = conn.session().clone();

        conn.on_error(&TransportError::ReceiveFailed("reset".into()));

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.session(), &before);
        assert!(conn.events().is_empty());
        assert!(drain(&mut sent).is_empty());
    }

    #[test]
    fn test_close_flushes_once_per_connection() {
        let store = CountingStore::default();
        let writes = Arc::clone(&store.writes);
        let (mut conn, _sent) = manager(store.clone());
        conn.on_open().unwrap();
        conn.on_message(r#"room,r1,{"content":"x","bookmark":9}"#);

        assert!(conn.on_close(&CloseInfo::abnormal("reset")));
        assert!(!conn.on_close(&CloseInfo::abnormal("reset")));
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get(SESSION_KEY).unwrap().as_deref(),
            Some(r#"{"roomId":"r1","bookmark":9,"username":"alice"}"#)
        );

        // transport reconnected: the next close flushes again
        conn.on_connecting(1);
        conn.on_open().unwrap();
        assert!(conn.on_close(&CloseInfo::normal()));
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_send_plain_message() {
        let (mut conn, mut sent) = manager(CountingStore::default());

        assert_eq!(conn.send("hello").unwrap(), None);
        assert!(conn.events().is_empty());
        assert_eq!(
            drain(&mut sent),
            vec![r#"room,r1,{"username":"alice","userId":"u1","content":"hello"}"#.to_string()]
        );
    }

    #[test]
    fn test_send_unrecognized_command() {
        let (mut conn, mut sent) = manager(CountingStore::default());

        let echo = conn.send("/look").unwrap();

        assert_eq!(echo, Some(0));
        assert_eq!(conn.events().len(), 1);
        assert_eq!(conn.events().get(0).map(|e| &e.kind), Some(&EventKind::Command));
        let frames = drain(&mut sent);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            r#"room,r1,{"username":"alice","userId":"u1","content":"/look"}"#
        );
    }

    #[test]
    fn test_send_sos() {
        let (mut conn, mut sent) = manager(CountingStore::default());
        conn.on_message(r#"ack,{"mediatorId":"m1","roomId":"r7","roomName":"Cellar"}"#);

        conn.send("/sos").unwrap();

        assert_eq!(conn.events().len(), 1);
        assert_eq!(conn.events().get(0).and_then(Event::text), Some("/sos"));
        assert_eq!(drain(&mut sent), vec!["sos,r7,{}".to_string()]);
    }

    #[test]
    fn test_send_empty_is_ignored() {
        let (mut conn, mut sent) = manager(CountingStore::default());
        assert_eq!(conn.send("").unwrap(), None);
        assert!(conn.events().is_empty());
        assert!(drain(&mut sent).is_empty());
    }

    #[test]
    fn test_send_after_transport_gone() {
        let (mut conn, sent) = manager(CountingStore::default());
        drop(sent);

        assert!(matches!(
            conn.send("/look"),
            Err(ClientError::Transport(TransportError::ConnectionClosed))
        ));
        // the echo still happened
        assert_eq!(conn.events().len(), 1);
    }

    #[test]
    fn test_shutdown_is_inert() {
        let store = CountingStore::default();
        let writes = Arc::clone(&store.writes);
        let (mut conn, mut sent) = manager(store);
        conn.on_open().unwrap();
        drain(&mut sent);

        conn.shutdown();
        conn.shutdown();
        assert!(conn.is_shut_down());
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        assert!(matches!(conn.send("hi"), Err(ClientError::ShutDown)));
        assert_eq!(conn.on_message(r#"room,r1,{"content":"late"}"#), None);
        conn.on_open().unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(drain(&mut sent).is_empty());
    }

    #[test]
    fn test_handle_event_dispatch() {
        let (mut conn, mut sent) = manager(CountingStore::default());

        assert_eq!(conn.handle_event(TransportEvent::Connecting { attempt: 1 }), None);
        assert_eq!(conn.handle_event(TransportEvent::Open), None);
        assert_eq!(drain(&mut sent).len(), 1);
        assert_eq!(
            conn.handle_event(TransportEvent::Message(r#"room,r1,{"content":"a"}"#.into())),
            Some(0)
        );
        assert_eq!(conn.handle_event(TransportEvent::Close(CloseInfo::normal())), None);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_ready_is_queued_as_handshake() {
        let (mut conn, mut sent) = manager(CountingStore::default());

        // typed while still connecting
        conn.send("hello").unwrap();
        conn.on_open().unwrap();

        let early = sent.try_recv().unwrap();
        assert!(!early.is_handshake());
        assert!(early.text().starts_with("room,r1,"));

        let ready = sent.try_recv().unwrap();
        assert!(ready.is_handshake());
        assert_eq!(ready.text(), r#"ready,{"roomId":"r1","username":"alice"}"#);
    }

    #[test]
    fn test_command_echoed_when_frame_cannot_be_built() {
        let (mut conn, mut sent) = manager(CountingStore::default());
        conn.on_message(r#"ack,{"mediatorId":"m1","roomId":"a,b","roomName":"Fork"}"#);

        let result = conn.send("/look");

        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::Delimiter { .. }))
        ));
        assert_eq!(conn.events().len(), 1);
        assert_eq!(conn.events().get(0).map(|e| &e.kind), Some(&EventKind::Command));
        assert_eq!(conn.events().get(0).and_then(Event::text), Some("/look"));
        assert!(drain(&mut sent).is_empty());
    }

    #[test]
    fn test_shutdown_before_any_event_flushes() {
        let store = CountingStore::default();
        store
            .inner
            .set(SESSION_KEY, r#"{"roomId":"r0","bookmark":"b-9"}"#)
            .unwrap();
        let writes = Arc::clone(&store.writes);
        let (mut conn, _sent) = manager(store.clone());

        conn.shutdown();

        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get(SESSION_KEY).unwrap().as_deref(),
            Some(r#"{"roomId":"r1","username":"alice"}"#)
        );
    }

    #[test]
    fn test_error_then_close_flushes_once() {
        let store = CountingStore::default();
        let writes = Arc::clone(&store.writes);
        let (mut conn, _sent) = manager(store);
        conn.handle_event(TransportEvent::Open);

        conn.handle_event(TransportEvent::Error(TransportError::ReceiveFailed(
            "reset".into(),
        )));
        assert_eq!(writes.load(Ordering::SeqCst), 0);

        conn.handle_event(TransportEvent::Close(CloseInfo::abnormal("reset")));
        conn.handle_event(TransportEvent::Close(CloseInfo::abnormal("reset")));

        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
