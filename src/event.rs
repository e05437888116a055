//! Typed events emitted by the Crowdplay client.
//!
//! The phase renderer (and any other consumer) receives these on the bounded
//! channel returned by `CrowdplayClient::start`. Apart from the synthetic
//! [`Connected`](CrowdplayEvent::Connected) and terminal
//! [`Disconnected`](CrowdplayEvent::Disconnected), each event corresponds to
//! a session-level reaction to an inbound server message — never to a local
//! user intent.

use crate::protocol::DisconnectReason;
use crate::session::LobbyView;

/// Events emitted by the client to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum CrowdplayEvent {
    /// Synthetic: the transport loop is running and `join-lobby` has been
    /// queued. Emitted exactly once, first.
    Connected,
    /// A fresh snapshot was applied; carries the full renderer-facing view
    /// (boxed to reduce enum size).
    Update(Box<LobbyView>),
    /// The requested display name is already claimed in this room. Blocking
    /// notice; the rendered phase stays `AwaitingName`.
    NameRejected,
    /// The room code is unknown or expired. Terminal for this flow — the
    /// embedding app should navigate away; no further messages will be sent.
    LobbyInvalid {
        /// The room code that was rejected.
        room_code: String,
    },
    /// The connection went down. Non-blocking: the last view remains valid
    /// for display until the next [`Update`](CrowdplayEvent::Update).
    Reconnecting { reason: DisconnectReason },
    /// The transport loop terminated. Always the final event on the channel.
    Disconnected { reason: Option<String> },
}
