//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client transport using tokio-tungstenite.
//! A background task owns the socket; lifecycle events flow out through a
//! channel and outgoing frames flow in through a [`ChannelSink`].
//!
//! Frames queued while disconnected are held after each open until the
//! consumer's [`Outgoing::Handshake`] has gone out, so the hub always sees
//! the join handshake first.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::reconnect::ReconnectPolicy;
use crate::traits::{ChannelSink, CloseInfo, Outgoing, Transport, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSender = SplitSink<WsStream, Message>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Full connection URL.
    pub url: String,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
    /// Reconnect behavior after abnormal closes.
    pub reconnect: ReconnectPolicy,
    /// Hold frames queued while disconnected until a handshake is sent.
    pub await_handshake: bool,
}

impl WebSocketConfig {
    /// Create a config for `url` with default limits.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_message_size: 64 * 1024, // 64 KB
            reconnect: ReconnectPolicy::default(),
            await_handshake: true,
        }
    }
}

/// How a single socket session ended.
struct SessionEnd {
    close: CloseInfo,
    by_owner: bool,
}

/// WebSocket client transport.
pub struct WebSocketTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sink: ChannelSink,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Start connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: WebSocketConfig) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (sink, outgoing) = ChannelSink::channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(url = %config.url, "Starting WebSocket transport");
        let task = tokio::spawn(run_socket(config, events_tx, outgoing, shutdown_rx));

        Self {
            events,
            sink,
            shutdown,
            task: Some(task),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sink = ChannelSink;

    fn sink(&self) -> ChannelSink {
        self.sink.clone()
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(task) = self.task.take() else {
            return Ok(()); // Already closed
        };

        // The task may already have exited on its own.
        let _ = self.shutdown.send(true);
        task.await
            .map_err(|e| TransportError::Other(format!("Socket task failed: {}", e)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Connect, pump, and reconnect until a normal close, owner shutdown, or
/// the policy gives up.
async fn run_socket(
    config: WebSocketConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt = 0u32;
    let mut failures = 0u32;
    // Frames waiting for the next handshake; survives reconnects.
    let mut held = VecDeque::new();

    loop {
        attempt += 1;
        let _ = events.send(TransportEvent::Connecting { attempt });

        let connected = tokio::select! {
            result = connect_async(config.url.as_str()) => result,
            _ = shutdown.changed() => {
                debug!("Shutdown requested while connecting");
                let _ = events.send(TransportEvent::Close(CloseInfo::normal()));
                return;
            }
        };

        let end = match connected {
            Ok((stream, _response)) => {
                info!(url = %config.url, "WebSocket connected");
                attempt = 0;
                failures = 0;
                if config.await_handshake {
                    hold_backlog(&mut outgoing, &mut held);
                }
                let _ = events.send(TransportEvent::Open);
                pump(
                    stream,
                    &events,
                    &mut outgoing,
                    &mut held,
                    &mut shutdown,
                    config.max_message_size,
                    !config.await_handshake,
                )
                .await
            }
            Err(e) => {
                warn!(url = %config.url, error = %e, "WebSocket connect failed");
                let _ = events.send(TransportEvent::Error(TransportError::Connect(
                    e.to_string(),
                )));
                SessionEnd {
                    close: CloseInfo::abnormal("connect failed"),
                    by_owner: false,
                }
            }
        };

        debug!(close = %end.close, by_owner = end.by_owner, "WebSocket session ended");
        let normal = end.close.is_normal();
        let _ = events.send(TransportEvent::Close(end.close));

        if end.by_owner || normal {
            break;
        }

        failures += 1;
        let Some(delay) = config.reconnect.next_delay(failures) else {
            info!(failures, "Not reconnecting");
            break;
        };

        debug!(delay_ms = delay.as_millis() as u64, failures, "Reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!("WebSocket transport stopped");
}

/// Move everything queued before the open into `held`.
///
/// A handshake still queued was meant for an earlier connection and is
/// dropped; the consumer sends a fresh one for this open.
fn hold_backlog(outgoing: &mut mpsc::UnboundedReceiver<Outgoing>, held: &mut VecDeque<String>) {
    while let Ok(frame) = outgoing.try_recv() {
        match frame {
            Outgoing::Text(text) => held.push_back(text),
            Outgoing::Handshake(_) => debug!("Dropping stale handshake"),
        }
    }
    if !held.is_empty() {
        debug!(frames = held.len(), "Holding frames until handshake");
    }
}

/// Send one text frame, reporting a failure as the end of the session.
async fn send_frame(
    sender: &mut WsSender,
    events: &mpsc::UnboundedSender<TransportEvent>,
    text: String,
) -> Result<(), SessionEnd> {
    if let Err(e) = sender.send(Message::Text(text)).await {
        error!("WebSocket send failed: {}", e);
        let _ = events.send(TransportEvent::Error(TransportError::SendFailed(
            e.to_string(),
        )));
        return Err(SessionEnd {
            close: CloseInfo::abnormal("send failed"),
            by_owner: false,
        });
    }
    Ok(())
}

/// Move frames in both directions until the socket ends.
async fn pump(
    stream: WsStream,
    events: &mpsc::UnboundedSender<TransportEvent>,
    outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    held: &mut VecDeque<String>,
    shutdown: &mut watch::Receiver<bool>,
    max_message_size: usize,
    mut handshaken: bool,
) -> SessionEnd {
    let (mut sender, mut receiver) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                if let Err(e) = sender.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                return SessionEnd { close: CloseInfo::normal(), by_owner: true };
            }

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            text.len(),
                            max_message_size
                        );
                        continue;
                    }
                    let _ = events.send(TransportEvent::Message(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    // The protocol is text; accept binary frames that hold UTF-8.
                    match String::from_utf8(data) {
                        Ok(text) if text.len() <= max_message_size => {
                            let _ = events.send(TransportEvent::Message(text));
                        }
                        Ok(text) => warn!("Message too large: {} bytes", text.len()),
                        Err(_) => warn!("Dropping non-UTF-8 binary message"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sender.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let close = frame
                        .map(|f| CloseInfo::new(u16::from(f.code), f.reason.to_string()))
                        .unwrap_or_else(|| CloseInfo::new(CloseInfo::NO_STATUS, ""));
                    debug!(close = %close, "Received close frame");
                    return SessionEnd { close, by_owner: false };
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return SessionEnd {
                        close: CloseInfo::abnormal("stream ended"),
                        by_owner: false,
                    };
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    let _ = events.send(TransportEvent::Error(TransportError::ReceiveFailed(
                        e.to_string(),
                    )));
                    return SessionEnd {
                        close: CloseInfo::abnormal(e.to_string()),
                        by_owner: false,
                    };
                }
            },

            Some(frame) = outgoing.recv() => match frame {
                Outgoing::Text(text) if !handshaken => held.push_back(text),
                Outgoing::Handshake(text) if !handshaken => {
                    if let Err(end) = send_frame(&mut sender, events, text).await {
                        return end;
                    }
                    handshaken = true;
                    while let Some(text) = held.pop_front() {
                        if let Err(end) = send_frame(&mut sender, events, text).await {
                            return end;
                        }
                    }
                }
                frame => {
                    if let Err(end) = send_frame(&mut sender, events, frame.into_text()).await {
                        return end;
                    }
                }
            }
        }
    }
}
