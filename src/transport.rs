//! Transport abstraction for the Crowdplay lobby protocol.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and the lobby server. The protocol uses JSON text
//! messages, so every transport implementation must handle message framing
//! internally (e.g., WebSocket frames, length-prefixed TCP, QUIC streams).
//!
//! # Connection Setup
//!
//! Connection setup is intentionally NOT part of this trait — different
//! transports have fundamentally different connection parameters (URLs for
//! WebSocket, host:port for TCP, QUIC endpoints, etc.). Construct a connected
//! transport externally, then pass it to `CrowdplayClient::start`.
//!
//! # Reconnection
//!
//! Transports are expected to retry low-level drops on their own and to
//! surface the outcome as inbound `disconnect`/`reconnect` protocol messages.
//! [`reconnect`](Transport::reconnect) exists for the one case the client
//! must drive itself: a disconnect the server initiated on purpose, which the
//! transport's auto-retry would wait out passively.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use crowdplay_client::error::CrowdplayError;
//! use crowdplay_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), CrowdplayError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, CrowdplayError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn reconnect(&mut self) -> Result<(), CrowdplayError> {
//!         // Re-establish the connection to the same endpoint
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), CrowdplayError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::CrowdplayError;

/// A bidirectional text message transport for the Crowdplay lobby protocol.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete JSON
/// message. Each call to [`recv`](Transport::recv) returns one complete JSON
/// message.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. However, `CrowdplayClient::start` accepts `impl Transport`
/// (monomorphized) for the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations (e.g.,
/// wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`CrowdplayError::TransportSend`] if the message could not be
    /// sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), CrowdplayError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred (e.g., [`CrowdplayError::TransportReceive`])
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, CrowdplayError>>;

    /// Re-establish the connection to the same endpoint.
    ///
    /// Called when the server itself initiated a disconnect; the client then
    /// replays `join-lobby` over the fresh connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be re-established. The
    /// transport is left in an unspecified-but-safe state; subsequent `recv`
    /// calls may return `None` or errors.
    async fn reconnect(&mut self) -> Result<(), CrowdplayError>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send) and
    /// [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), CrowdplayError>;
}
