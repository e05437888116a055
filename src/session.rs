//! Client-local session state machine for the Crowdplay lobby protocol.
//!
//! [`LobbySession`] is a synchronous, I/O-free reducer: the transport loop
//! feeds it one inbound [`ServerMessage`] at a time and executes the
//! [`SessionEffect`]s it returns (persist identity, replay join, redial,
//! surface notices). All state transitions are driven by server snapshots —
//! the machine never advances on local optimism, which is what makes the
//! rendered phase a pure function of (last snapshot, self-name presence).

use crate::identity::SessionIdentity;
use crate::protocol::{
    ClientMessage, DisconnectReason, LobbySnapshot, Participant, SelfInfo, ServerMessage,
    SnapshotPhase,
};

// ── Phase ───────────────────────────────────────────────────────────

/// The rendered UI phase — exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No snapshot received yet.
    #[default]
    Loading,
    /// A snapshot arrived but `self` has no acknowledged name.
    AwaitingName,
    /// Named participant in a pre-game room.
    Lobby,
    /// The room is running an activity.
    InGame,
}

// ── LobbyView ───────────────────────────────────────────────────────

/// What the phase renderer receives: the rendered phase plus the data that
/// goes with it. The renderer owns no state and cannot mutate the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LobbyView {
    pub phase: Phase,
    pub participant_list: Vec<Participant>,
    pub me: SelfInfo,
    pub selected_activity_id: String,
    pub activity_state: serde_json::Value,
    /// Non-blocking indicator; derived state stays displayed while true.
    pub reconnecting: bool,
}

// ── SessionEffect ───────────────────────────────────────────────────

/// Side effects requested by the reducer, executed by the connection layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Write the server-confirmed identity to the durable store.
    PersistIdentity(SessionIdentity),
    /// Re-send `join-lobby` with the current identity (same seat, not a
    /// fresh join).
    ReplayJoin,
    /// The server itself closed the connection: re-initiate it now instead
    /// of waiting for the transport's auto-retry.
    Redial,
    /// Surface the updated view to the renderer.
    EmitUpdate,
    /// Surface the blocking name-collision notice.
    EmitNameRejected,
    /// The room is gone; the embedding app must leave this flow.
    EmitLobbyInvalid,
    /// Show the non-blocking reconnecting indicator.
    EmitReconnecting(DisconnectReason),
}

// ── LobbySession ────────────────────────────────────────────────────

/// The client-side session reducer.
///
/// Owns the one shared mutable state object (the last snapshot plus the
/// transient connection flags) and is written only from the message-handling
/// path. Outbound intents never touch it.
#[derive(Debug, Clone)]
pub struct LobbySession {
    identity: SessionIdentity,
    snapshot: Option<LobbySnapshot>,
    reconnecting: bool,
    ended: bool,
}

impl LobbySession {
    /// Start a session with the identity seeded from the durable store.
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            snapshot: None,
            reconnecting: false,
            ended: false,
        }
    }

    /// The identity this session would present on a (re)join.
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// The last snapshot received, if any.
    pub fn snapshot(&self) -> Option<&LobbySnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the connection is currently known to be down.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Whether the room was reported invalid; no further messages may be
    /// sent for this session.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// The rendered phase, computed from the last snapshot and nothing else.
    pub fn phase(&self) -> Phase {
        let Some(snapshot) = &self.snapshot else {
            return Phase::Loading;
        };
        if snapshot.me.name.is_none() {
            return Phase::AwaitingName;
        }
        match snapshot.phase {
            SnapshotPhase::Loading => Phase::Loading,
            SnapshotPhase::Lobby => Phase::Lobby,
            SnapshotPhase::InGame => Phase::InGame,
        }
    }

    /// The renderer-facing projection of the current state.
    pub fn view(&self) -> LobbyView {
        match &self.snapshot {
            Some(snapshot) => LobbyView {
                phase: self.phase(),
                participant_list: snapshot.participant_list.clone(),
                me: snapshot.me.clone(),
                selected_activity_id: snapshot.selected_activity_id.clone(),
                activity_state: snapshot.activity_state.clone(),
                reconnecting: self.reconnecting,
            },
            None => LobbyView {
                reconnecting: self.reconnecting,
                ..LobbyView::default()
            },
        }
    }

    /// The `join-lobby` message for this session's identity. Sent once per
    /// connection open and replayed verbatim on every reconnect.
    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::JoinLobby {
            room_code: self.identity.room_code.clone(),
            participant_id: self.identity.participant_id,
            name: self.identity.display_name.clone(),
        }
    }

    /// Record an optimistically submitted name so future join replays carry
    /// it. Returns the identity to persist. Does not change the rendered
    /// phase — only a server snapshot can do that.
    pub fn note_submitted_name(&mut self, name: &str) -> SessionIdentity {
        self.identity.display_name = Some(name.to_string());
        self.identity.clone()
    }

    /// Apply one inbound message and return the effects to execute.
    ///
    /// Messages are applied strictly in arrival order. After the session has
    /// ended (`invalid-lobby`), everything is ignored.
    pub fn apply(&mut self, msg: ServerMessage) -> Vec<SessionEffect> {
        if self.ended {
            return Vec::new();
        }
        match msg {
            ServerMessage::Update(snapshot) => self.apply_snapshot(*snapshot),
            ServerMessage::InvalidName => vec![SessionEffect::EmitNameRejected],
            ServerMessage::InvalidLobby => {
                self.ended = true;
                vec![SessionEffect::EmitLobbyInvalid]
            }
            ServerMessage::Disconnect { reason } => {
                // Derived state is deliberately kept: stale-but-displayed.
                self.reconnecting = true;
                let mut effects = vec![SessionEffect::EmitReconnecting(reason)];
                if reason.is_server_initiated() {
                    effects.push(SessionEffect::Redial);
                }
                effects
            }
            ServerMessage::Reconnect => vec![SessionEffect::ReplayJoin],
        }
    }

    /// Total replacement: the new snapshot displaces everything previously
    /// derived. Only the session identity survives, and it is updated (and
    /// persisted) when the server confirms a seat or a name.
    fn apply_snapshot(&mut self, snapshot: LobbySnapshot) -> Vec<SessionEffect> {
        let mut identity_changed = false;

        if let Some(id) = snapshot.me.id {
            if self.identity.participant_id != Some(id) {
                self.identity.participant_id = Some(id);
                identity_changed = true;
            }
        }
        if let Some(name) = &snapshot.me.name {
            if self.identity.display_name.as_ref() != Some(name) {
                self.identity.display_name = Some(name.clone());
                identity_changed = true;
            }
        }

        self.snapshot = Some(snapshot);
        // A fresh snapshot is the confirmation that the seat is live again.
        self.reconnecting = false;

        let mut effects = Vec::with_capacity(2);
        if identity_changed {
            effects.push(SessionEffect::PersistIdentity(self.identity.clone()));
        }
        effects.push(SessionEffect::EmitUpdate);
        effects
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn named_snapshot(phase: SnapshotPhase) -> LobbySnapshot {
        LobbySnapshot {
            phase,
            participant_list: vec![
                Participant {
                    id: 7,
                    name: "Ana".into(),
                    is_host: false,
                },
                Participant {
                    id: 8,
                    name: "Bo".into(),
                    is_host: true,
                },
            ],
            me: SelfInfo {
                id: Some(7),
                name: Some("Ana".into()),
                is_host: false,
            },
            selected_activity_id: "trivia".into(),
            activity_state: serde_json::Value::Null,
        }
    }

    fn unnamed_snapshot() -> LobbySnapshot {
        LobbySnapshot {
            phase: SnapshotPhase::Lobby,
            participant_list: vec![],
            me: SelfInfo {
                id: Some(12),
                name: None,
                is_host: false,
            },
            selected_activity_id: String::new(),
            activity_state: serde_json::Value::Null,
        }
    }

    fn update(snapshot: LobbySnapshot) -> ServerMessage {
        ServerMessage::Update(Box::new(snapshot))
    }

    #[test]
    fn starts_in_loading() {
        let session = LobbySession::new(SessionIdentity::fresh("ABCD"));
        assert_eq!(session.phase(), Phase::Loading);
        assert!(session.view().participant_list.is_empty());
    }

    #[test]
    fn snapshot_without_name_renders_awaiting_name() {
        let mut session = LobbySession::new(SessionIdentity::fresh("WXYZ"));
        session.apply(update(unnamed_snapshot()));
        assert_eq!(session.phase(), Phase::AwaitingName);
    }

    #[test]
    fn named_snapshot_renders_room_phase() {
        let mut session = LobbySession::new(SessionIdentity::fresh("ABCD"));

        session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert_eq!(session.phase(), Phase::Lobby);

        session.apply(update(named_snapshot(SnapshotPhase::InGame)));
        assert_eq!(session.phase(), Phase::InGame);
    }

    #[test]
    fn snapshot_is_total_replacement() {
        let mut session = LobbySession::new(SessionIdentity::fresh("ABCD"));
        session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert_eq!(session.view().participant_list.len(), 2);

        let mut second = named_snapshot(SnapshotPhase::Lobby);
        second.participant_list.truncate(1);
        second.selected_activity_id = String::new();
        second.activity_state = serde_json::json!({"round": 1});
        session.apply(update(second.clone()));

        let view = session.view();
        assert_eq!(view.participant_list, second.participant_list);
        assert_eq!(view.selected_activity_id, "");
        assert_eq!(view.activity_state, serde_json::json!({"round": 1}));
    }

    #[test]
    fn replaying_the_same_sequence_yields_identical_views() {
        let inbound = vec![
            update(unnamed_snapshot()),
            ServerMessage::InvalidName,
            update(named_snapshot(SnapshotPhase::Lobby)),
            ServerMessage::Disconnect {
                reason: DisconnectReason::TransportDrop,
            },
            ServerMessage::Reconnect,
            update(named_snapshot(SnapshotPhase::InGame)),
        ];

        let mut first = LobbySession::new(SessionIdentity::fresh("ABCD"));
        let mut second = LobbySession::new(SessionIdentity::fresh("ABCD"));

        let views_first: Vec<LobbyView> = inbound
            .iter()
            .map(|msg| {
                first.apply(msg.clone());
                first.view()
            })
            .collect();
        let views_second: Vec<LobbyView> = inbound
            .iter()
            .map(|msg| {
                second.apply(msg.clone());
                second.view()
            })
            .collect();

        assert_eq!(views_first, views_second);
    }

    #[test]
    fn confirmed_seat_is_persisted_once() {
        let mut session = LobbySession::new(SessionIdentity::fresh("ABCD"));

        let effects = session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert!(effects
            .iter()
            .any(|e| matches!(e, SessionEffect::PersistIdentity(id)
                if id.participant_id == Some(7) && id.display_name.as_deref() == Some("Ana"))));

        // Identical identity in the next snapshot: nothing to persist.
        let effects = session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert!(!effects
            .iter()
            .any(|e| matches!(e, SessionEffect::PersistIdentity(_))));
    }

    #[test]
    fn invalid_name_leaves_state_untouched() {
        let mut session = LobbySession::new(SessionIdentity::fresh("WXYZ"));
        session.apply(update(unnamed_snapshot()));
        let identity_before = session.identity().clone();

        let effects = session.apply(ServerMessage::InvalidName);

        assert_eq!(effects, vec![SessionEffect::EmitNameRejected]);
        assert_eq!(session.phase(), Phase::AwaitingName);
        assert_eq!(session.identity(), &identity_before);
    }

    #[test]
    fn disconnect_keeps_stale_view_and_sets_reconnecting() {
        let mut session = LobbySession::new(SessionIdentity::fresh("ABCD"));
        session.apply(update(named_snapshot(SnapshotPhase::Lobby)));

        let effects = session.apply(ServerMessage::Disconnect {
            reason: DisconnectReason::TransportDrop,
        });

        assert_eq!(
            effects,
            vec![SessionEffect::EmitReconnecting(
                DisconnectReason::TransportDrop
            )]
        );
        let view = session.view();
        assert!(view.reconnecting);
        // Stale-but-displayed: the roster is still the last known one.
        assert_eq!(view.participant_list.len(), 2);
        assert_eq!(view.phase, Phase::Lobby);
    }

    #[test]
    fn server_initiated_disconnect_requests_redial() {
        let mut session = LobbySession::new(SessionIdentity::fresh("ABCD"));
        let effects = session.apply(ServerMessage::Disconnect {
            reason: DisconnectReason::ServerInitiated,
        });
        assert!(effects.contains(&SessionEffect::Redial));
    }

    #[test]
    fn reconnect_replays_join_and_indicator_clears_on_next_update() {
        let mut session = LobbySession::new(SessionIdentity {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            display_name: Some("Ana".into()),
        });
        session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        session.apply(ServerMessage::Disconnect {
            reason: DisconnectReason::TransportDrop,
        });

        let effects = session.apply(ServerMessage::Reconnect);
        assert_eq!(effects, vec![SessionEffect::ReplayJoin]);
        // Still reconnecting: only a fresh snapshot clears the indicator.
        assert!(session.is_reconnecting());

        session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert!(!session.is_reconnecting());
    }

    #[test]
    fn join_message_carries_the_stored_identity() {
        let session = LobbySession::new(SessionIdentity {
            room_code: "ABCD".into(),
            participant_id: Some(7),
            display_name: Some("Ana".into()),
        });
        assert_eq!(
            session.join_message(),
            ClientMessage::JoinLobby {
                room_code: "ABCD".into(),
                participant_id: Some(7),
                name: Some("Ana".into()),
            }
        );
    }

    #[test]
    fn invalid_lobby_ends_the_session() {
        let mut session = LobbySession::new(SessionIdentity::fresh("GONE"));
        let effects = session.apply(ServerMessage::InvalidLobby);
        assert_eq!(effects, vec![SessionEffect::EmitLobbyInvalid]);
        assert!(session.is_ended());

        // Everything after the end is ignored.
        let effects = session.apply(update(named_snapshot(SnapshotPhase::Lobby)));
        assert!(effects.is_empty());
        assert_eq!(session.phase(), Phase::Loading);
    }

    #[test]
    fn submitted_name_is_recorded_but_does_not_advance_phase() {
        let mut session = LobbySession::new(SessionIdentity::fresh("WXYZ"));
        session.apply(update(unnamed_snapshot()));

        let identity = session.note_submitted_name("Ana");
        assert_eq!(identity.display_name.as_deref(), Some("Ana"));
        // No local optimism: phase changes only when the server echoes it.
        assert_eq!(session.phase(), Phase::AwaitingName);

        // The next replayed join carries the submitted name.
        assert!(matches!(
            session.join_message(),
            ClientMessage::JoinLobby { name: Some(name), .. } if name == "Ana"
        ));
    }
}
