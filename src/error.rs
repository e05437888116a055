//! Error types for the Crowdplay client.

use thiserror::Error;

/// Errors that can occur when using the Crowdplay client.
#[derive(Debug, Error)]
pub enum CrowdplayError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The room was reported invalid or expired; this session is over and no
    /// further messages may be sent for it.
    #[error("session ended: room invalid or expired")]
    SessionEnded,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Crowdplay client operations.
pub type Result<T> = std::result::Result<T, CrowdplayError>;
