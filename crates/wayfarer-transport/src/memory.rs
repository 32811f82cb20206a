//! In-process transport for tests.
//!
//! [`MemoryTransport`] is handed to the code under test; the paired
//! [`MemoryHub`] plays the remote side, scripting lifecycle events and
//! observing every frame the client sends, in the order it was queued.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{ChannelSink, CloseInfo, Outgoing, Transport, TransportError, TransportEvent};

/// Client side of an in-memory connection.
pub struct MemoryTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sink: ChannelSink,
    closed: bool,
}

/// Hub side of an in-memory connection.
pub struct MemoryHub {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<Outgoing>,
}

impl MemoryTransport {
    /// Create a connected transport/hub pair.
    #[must_use]
    pub fn pair() -> (MemoryTransport, MemoryHub) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (sink, sent) = ChannelSink::channel();

        let transport = MemoryTransport {
            events,
            sink,
            closed: false,
        };
        let hub = MemoryHub {
            events: events_tx,
            sent,
        };
        (transport, hub)
    }

    /// Whether the owner has closed this transport.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Sink = ChannelSink;

    fn sink(&self) -> ChannelSink {
        self.sink.clone()
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryHub {
    /// Deliver a raw event. Returns `false` if the transport is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Signal that the connection opened.
    pub fn open(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Deliver an inbound text frame.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Report a transport error.
    pub fn error(&self, error: TransportError) -> bool {
        self.emit(TransportEvent::Error(error))
    }

    /// Close the connection.
    pub fn close(&self, close: CloseInfo) -> bool {
        self.emit(TransportEvent::Close(close))
    }

    /// Take the next frame the client sent, if any.
    pub fn try_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok().map(Outgoing::into_text)
    }

    /// Take every frame sent so far.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame.into_text());
        }
        frames
    }

    /// Wait for the next frame the client sends.
    pub async fn recv_sent(&mut self) -> Option<String> {
        self.sent.recv().await.map(Outgoing::into_text)
    }
}
