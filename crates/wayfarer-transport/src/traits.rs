//! Transport abstraction traits for Wayfarer.
//!
//! These traits define the interface that all transport implementations must provide,
//! allowing the connection manager to be transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to establish the connection.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Close status reported with a close event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Close frame without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// Create close info.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A normal closure.
    #[must_use]
    pub fn normal() -> Self {
        Self::new(Self::NORMAL, "")
    }

    /// An abnormal closure with a reason.
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Self::ABNORMAL, reason)
    }

    /// Whether this close is normal; anything else is eligible for reconnect.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Connection lifecycle callbacks delivered by a transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection attempt is starting (1-based, reset after each open).
    Connecting {
        /// Attempt number.
        attempt: u32,
    },
    /// The connection is open.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The transport reported an error. A `Close` follows if the
    /// connection is lost.
    Error(TransportError),
    /// The connection closed.
    Close(CloseInfo),
}

/// A frame queued for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Join handshake for the connection that just opened. Frames queued
    /// while disconnected are held back until it has been sent.
    Handshake(String),
    /// Any other frame.
    Text(String),
}

impl Outgoing {
    /// Get the frame text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Handshake(text) | Self::Text(text) => text,
        }
    }

    /// Take the frame text.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Handshake(text) | Self::Text(text) => text,
        }
    }

    /// Check if this is a handshake frame.
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake(_))
    }
}

/// Outgoing half of a transport.
///
/// Sending never blocks. Frames sent while disconnected are queued and
/// go out once the connection opens, right after the handshake.
pub trait FrameSink: Send + Sync {
    /// Queue a text frame for sending.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Queue the handshake for the current connection.
    ///
    /// Transports without a handshake gate send it like any other frame.
    fn send_handshake(&self, text: String) -> Result<(), TransportError> {
        self.send_text(text)
    }
}

/// A transport that drives one logical hub connection.
#[async_trait]
pub trait Transport: Send {
    /// Sink type handed to the consumer.
    type Sink: FrameSink + Clone + 'static;

    /// Get a handle for sending frames.
    fn sink(&self) -> Self::Sink;

    /// Receive the next lifecycle event.
    ///
    /// Returns `None` once the transport has shut down.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection and stop reconnecting.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// Frame sink backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, frame: Outgoing) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

impl FrameSink for ChannelSink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.push(Outgoing::Text(text))
    }

    fn send_handshake(&self, text: String) -> Result<(), TransportError> {
        self.push(Outgoing::Handshake(text))
    }
}
