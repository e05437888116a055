//! Wire-compatible protocol types for the Crowdplay lobby protocol.
//!
//! Every type in this module produces identical JSON to the lobby server's
//! message layer: messages are adjacently tagged as
//! `{"type": "<kebab-case name>", "data": <payload>}` and payload fields use
//! camelCase. The snapshot's `self` field keeps its wire name via an explicit
//! rename because `self` is reserved in Rust.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for participants, allocated by the server on first join.
pub type ParticipantId = u32;

// ── Enums ───────────────────────────────────────────────────────────

/// Room phase as reported inside a [`LobbySnapshot`].
///
/// This is the server's view of the room, not the rendered UI phase — the
/// rendered phase additionally gates on whether `self` has claimed a name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotPhase {
    /// Room exists but has not settled yet.
    #[default]
    Loading,
    /// Pre-game: participants gather and an activity may be selected.
    Lobby,
    /// An activity is running.
    InGame,
}

/// Cause of a `disconnect` notice, tagged by the transport layer.
///
/// The reconnect policy is a pure function of this tag: a server-initiated
/// disconnect must be answered with an immediate redial, while a transport
/// drop is retried by the transport layer itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectReason {
    /// The server closed the connection on purpose.
    ServerInitiated,
    /// The connection was lost at the network level.
    TransportDrop,
}

impl DisconnectReason {
    /// Returns `true` if the server itself closed the connection.
    pub fn is_server_initiated(self) -> bool {
        matches!(self, Self::ServerInitiated)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// One entry of the snapshot's participant roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub is_host: bool,
}

/// The receiving client's own seat, as the server sees it.
///
/// `id` and `name` are absent until the server has allocated a participant
/// record and acknowledged a name claim, respectively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelfInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ParticipantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_host: bool,
}

/// The authoritative room state pushed by the server on every change.
///
/// A snapshot is a **total replacement**, never a delta: on receipt the
/// client discards all previously derived state except its session identity.
/// While the room is in [`Lobby`](SnapshotPhase::Lobby) or
/// [`InGame`](SnapshotPhase::InGame) phase, exactly one roster entry has
/// `is_host == true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub phase: SnapshotPhase,
    pub participant_list: Vec<Participant>,
    /// The wire field is named `self`; renamed because `self` is reserved.
    #[serde(rename = "self")]
    pub me: SelfInfo,
    /// Id of the activity currently selected by the host; empty when none.
    #[serde(default)]
    pub selected_activity_id: String,
    /// Activity-defined payload, opaque to the lobby layer.
    #[serde(default)]
    pub activity_state: serde_json::Value,
}

impl LobbySnapshot {
    /// Returns the host's roster entry, if one is present.
    pub fn host(&self) -> Option<&Participant> {
        self.participant_list.iter().find(|p| p.is_host)
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
///
/// All client messages are fire-and-forget: the server never acknowledges
/// them directly, it only pushes fresh snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Attach or re-attach to a room (MUST be first message per connection).
    ///
    /// `participant_id` is only carried on a resume, so the server can
    /// re-seat the same participant record; `name` is carried whenever a
    /// previous visit saved one.
    #[serde(rename_all = "camelCase")]
    JoinLobby {
        room_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Claim a display name within the room.
    Name { name: String },
    /// Host-only intent to choose the next activity.
    #[serde(rename_all = "camelCase")]
    GameSelect { activity_id: String },
    /// Host-only intent to begin the selected activity.
    GameStart,
    /// Host-only intent to return the room to lobby phase.
    GameExit,
    /// Host-only readiness signal, sent after a grace delay post-start.
    HostGameLoaded,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full state replacement — the only state-bearing message
    /// (boxed to reduce enum size).
    Update(Box<LobbySnapshot>),
    /// The requested name is already claimed in this room.
    InvalidName,
    /// The room code is unknown or expired; the client must leave this flow.
    InvalidLobby,
    /// Transport-level notice that the connection went down.
    Disconnect { reason: DisconnectReason },
    /// The transport has re-established; the client must replay `join-lobby`.
    Reconnect,
}
