//! Client error types.

use thiserror::Error;
use wayfarer_protocol::ProtocolError;
use wayfarer_transport::TransportError;

/// Errors from client operations.
///
/// None of these are fatal; the caller logs and carries on.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Frame could not be handed to the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection was shut down by its owner.
    #[error("connection is shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ClientError::from(TransportError::ConnectionClosed);
        assert_eq!(err.to_string(), "transport error: Connection closed");
        assert_eq!(ClientError::ShutDown.to_string(), "connection is shut down");
    }
}
