//! # wayfarer-transport
//!
//! Transport abstraction layer for the Wayfarer hub client.
//!
//! A transport delivers the four connection callbacks (open, message,
//! error, close) as [`TransportEvent`]s and accepts outgoing text frames
//! through a [`FrameSink`]. Reconnecting after an abnormal close is the
//! transport's business, configured with a [`ReconnectPolicy`]; the
//! consumer only reacts to the events.
//!
//! - **WebSocket** - tokio-tungstenite client (feature `websocket`)
//! - **Memory** - scripted in-process transport for tests
//!
//! ```rust,ignore
//! use wayfarer_transport::{Transport, TransportEvent};
//!
//! async fn pump(mut transport: impl Transport) {
//!     while let Some(event) = transport.next_event().await {
//!         // Process event
//!     }
//! }
//! ```

pub mod memory;
pub mod reconnect;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryHub, MemoryTransport};
pub use reconnect::ReconnectPolicy;
pub use traits::{
    ChannelSink, CloseInfo, FrameSink, Outgoing, Transport, TransportError, TransportEvent,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
